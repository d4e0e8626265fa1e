use std::io::{self, Read, Write};
use std::os::fd::AsFd;

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::executor::{
    Context, EngineState, ExecOutcome, Executor, StdioOverrides, EXIT_COMMAND, STOP_SERVER_COMMAND,
};
use crate::parser::LineParser;
use crate::remote::{SessionError, EXIT_MESSAGE, STOP_MESSAGE, TERMINATOR};

const COMMAND_TOO_LONG: &str = "error: command too long\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    ClientExited,
    ServerShouldStop,
    CommunicationError,
}

enum Step {
    Continue,
    Finish(SessionOutcome),
}

fn is_delimiter(b: &u8) -> bool {
    *b == b'\n' || *b == 0
}

/// One connected peer, served until it exits, disconnects or stops the server.
///
/// The stream stands in for the terminal: children read the first stage's
/// stdin from it and the last stage writes stdout and stderr into it.
pub struct Session<S> {
    stream: S,
    parser: LineParser,
    capacity: usize,
    pending: Vec<u8>,
    /// Dropping the rest of an oversized line up to its delimiter.
    discarding: bool,
    /// The last delimiter consumed was `\n`; a `\0` right after it ends
    /// the same command.
    after_newline: bool,
    executor: Executor,
    state: EngineState,
}

impl<S: Read + Write + AsFd> Session<S> {
    pub fn new(stream: S, config: &ServerConfig) -> Self {
        Session {
            stream,
            parser: LineParser::new(config.limits.clone()),
            capacity: config.recv_buffer,
            pending: Vec::with_capacity(config.recv_buffer),
            discarding: false,
            after_newline: false,
            executor: Executor::new(Context::Remote),
            state: EngineState::new(Context::Remote),
        }
    }

    /// Serves requests until the session ends; the stream closes on return.
    pub fn run(mut self) -> SessionOutcome {
        match self.serve_requests() {
            Ok(outcome) => {
                info!(?outcome, "session finished");
                outcome
            }
            Err(e) => {
                warn!(error = %e, "session aborted");
                SessionOutcome::CommunicationError
            }
        }
    }

    fn serve_requests(&mut self) -> Result<SessionOutcome, SessionError> {
        let mut chunk = vec![0u8; self.capacity];
        loop {
            while let Some(line) = self.next_line() {
                if let Step::Finish(outcome) = self.handle_line(&line)? {
                    return Ok(outcome);
                }
            }

            let n = match self.stream.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Err(SessionError::Timeout);
                }
                Err(e) => return Err(SessionError::Receive(e)),
            };
            if n == 0 {
                debug!(discarded = self.pending.len(), "peer closed the connection");
                return Ok(SessionOutcome::ClientExited);
            }
            self.accept_bytes(&chunk[..n])?;
        }
    }

    fn accept_bytes(&mut self, mut bytes: &[u8]) -> Result<(), SessionError> {
        if self.discarding {
            match bytes.iter().position(is_delimiter) {
                Some(pos) => {
                    self.after_newline = bytes[pos] == b'\n';
                    bytes = &bytes[pos + 1..];
                    self.discarding = false;
                }
                None => return Ok(()),
            }
        }
        self.pending.extend_from_slice(bytes);

        if self.pending.len() > self.capacity && !self.pending.iter().any(is_delimiter) {
            warn!(capacity = self.capacity, "command exceeds receive buffer");
            self.pending.clear();
            self.discarding = true;
            self.reply(COMMAND_TOO_LONG.as_bytes())?;
        }
        Ok(())
    }

    /// Next complete command, possibly empty. Only the `\0` of a `\n\0`
    /// ending is dropped.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.pending.iter().position(is_delimiter)?;
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            let delimiter = line.pop();
            let trailing_nul = line.is_empty() && delimiter == Some(0) && self.after_newline;
            self.after_newline = delimiter == Some(b'\n');
            if !trailing_nul {
                return Some(line);
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) -> Result<Step, SessionError> {
        if line.len() > self.capacity {
            self.reply(COMMAND_TOO_LONG.as_bytes())?;
            return Ok(Step::Continue);
        }
        let text = String::from_utf8_lossy(line);
        debug!(command = %text.trim(), "received command");

        let pipeline = match self.parser.parse(&text) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.reply(format!("{}\n", e.report()).as_bytes())?;
                return Ok(Step::Continue);
            }
        };

        match pipeline.first().program() {
            EXIT_COMMAND => return self.finish(SessionOutcome::ClientExited),
            STOP_SERVER_COMMAND => return self.finish(SessionOutcome::ServerShouldStop),
            _ => {}
        }

        let result = {
            let io = StdioOverrides::all(&self.stream);
            self.executor.exec(&pipeline, &io, &mut self.state)
        };
        match result {
            Ok(ExecOutcome::Code(code)) => debug!(code, "command completed"),
            Ok(ExecOutcome::Exit) => return self.finish(SessionOutcome::ClientExited),
            Ok(ExecOutcome::StopServer) => return self.finish(SessionOutcome::ServerShouldStop),
            Err(e) => {
                debug!(error = %e, "command failed");
                self.send(format!("error: {}\n", e).as_bytes())?;
            }
        }
        self.send(&[TERMINATOR])?;
        Ok(Step::Continue)
    }

    fn finish(&mut self, outcome: SessionOutcome) -> Result<Step, SessionError> {
        let message = match outcome {
            SessionOutcome::ServerShouldStop => STOP_MESSAGE,
            _ => EXIT_MESSAGE,
        };
        self.reply(message.as_bytes())?;
        Ok(Step::Finish(outcome))
    }

    /// Sends `message` followed by the terminator.
    fn reply(&mut self, message: &[u8]) -> Result<(), SessionError> {
        self.send(message)?;
        self.send(&[TERMINATOR])
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.stream
            .write_all(bytes)
            .and_then(|_| self.stream.flush())
            .map_err(SessionError::Send)
    }
}
