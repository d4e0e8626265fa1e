use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::remote::TERMINATOR;

/// Client side of the remote protocol.
///
/// Bytes received past a terminator are kept for the next response.
pub struct RemoteClient<S = TcpStream> {
    stream: S,
    buffered: Vec<u8>,
}

impl RemoteClient<TcpStream> {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected to server");
        Ok(Self::from_stream(stream))
    }
}

impl<S: Read + Write> RemoteClient<S> {
    pub fn from_stream(stream: S) -> Self {
        RemoteClient {
            stream,
            buffered: Vec::new(),
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Sends one command, adding the `\n` delimiter when missing.
    pub fn send_command(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.stream.write_all(b"\n")?;
        }
        self.stream.flush()
    }

    /// Reads up to the next terminator and returns the bytes before it.
    pub fn read_response(&mut self) -> io::Result<Vec<u8>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(pos) = self.buffered.iter().position(|&b| b == TERMINATOR) {
                let mut response: Vec<u8> = self.buffered.drain(..=pos).collect();
                response.pop();
                return Ok(response);
            }
            let n = match self.stream.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection mid-response",
                ));
            }
            self.buffered.extend_from_slice(&chunk[..n]);
        }
    }

    pub fn request(&mut self, line: &str) -> io::Result<String> {
        self.send_command(line)?;
        let response = self.read_response()?;
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    /// Reads until the server closes the connection and returns every byte
    /// not yet consumed by [`read_response`](Self::read_response).
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        self.stream.read_to_end(&mut self.buffered)?;
        Ok(self.buffered)
    }
}
