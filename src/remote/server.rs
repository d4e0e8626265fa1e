use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::remote::{ServerError, Session, SessionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One session at a time; the next client waits in the backlog.
    Sequential,
    /// One worker thread per session.
    Concurrent,
}

impl ConcurrencyMode {
    fn from_threaded(threaded: bool) -> Self {
        if threaded {
            ConcurrencyMode::Concurrent
        } else {
            ConcurrencyMode::Sequential
        }
    }
}

/// Returned once a session has stopped the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOutcome {
    pub sessions_served: usize,
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let address = format!("{}:{}", config.interface, config.port);
        let listener =
            TcpListener::bind((config.interface.as_str(), config.port)).map_err(|source| {
                ServerError::Bind {
                    address: address.clone(),
                    source,
                }
            })?;
        info!(address = %listener.local_addr().map(|a| a.to_string()).unwrap_or(address), "listening");
        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn mode(&self) -> ConcurrencyMode {
        ConcurrencyMode::from_threaded(self.config.threaded)
    }

    /// Accepts clients until one of them sends `stop-server`.
    ///
    /// The listener is closed before returning. In concurrent mode sessions
    /// still running at that point are waited for.
    pub fn serve(self) -> Result<ServerOutcome, ServerError> {
        match self.mode() {
            ConcurrencyMode::Sequential => self.serve_sequential(),
            ConcurrencyMode::Concurrent => self.serve_concurrent(),
        }
    }

    fn serve_sequential(self) -> Result<ServerOutcome, ServerError> {
        let mut sessions_served = 0;
        loop {
            let Some(stream) = self.accept()? else {
                continue;
            };
            sessions_served += 1;
            if Session::new(stream, &self.config).run() == SessionOutcome::ServerShouldStop {
                info!("stop requested, shutting down");
                return Ok(ServerOutcome { sessions_served });
            }
        }
    }

    fn serve_concurrent(self) -> Result<ServerOutcome, ServerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let wake_addr = self.local_addr().map(loopback).map_err(ServerError::Accept)?;
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut sessions_served = 0;

        loop {
            let accepted = self.accept()?;
            if stop.load(Ordering::SeqCst) {
                info!("stop requested, shutting down");
                break;
            }
            let Some(stream) = accepted else {
                continue;
            };
            sessions_served += 1;
            workers.retain(|worker| !worker.is_finished());

            let config = self.config.clone();
            let stop = Arc::clone(&stop);
            let worker = thread::Builder::new()
                .name(format!("rsh-session-{}", sessions_served))
                .spawn(move || {
                    if Session::new(stream, &config).run() == SessionOutcome::ServerShouldStop {
                        stop.store(true, Ordering::SeqCst);
                        // Unblocks the acceptor so it sees the flag.
                        if let Err(e) = TcpStream::connect(wake_addr) {
                            warn!(error = %e, "cannot wake acceptor");
                        }
                    }
                })
                .map_err(ServerError::Worker)?;
            workers.push(worker);
        }

        let Server { listener, .. } = self;
        drop(listener);
        debug!(remaining = workers.len(), "waiting for sessions");
        for worker in workers {
            if worker.join().is_err() {
                warn!("session worker panicked");
            }
        }
        Ok(ServerOutcome { sessions_served })
    }

    /// `None` when the connection was lost before it could be served.
    fn accept(&self) -> Result<Option<TcpStream>, ServerError> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!(error = %e, "transient accept failure");
                return Ok(None);
            }
            Err(e) => return Err(ServerError::Accept(e)),
        };
        if let Err(e) = stream.set_read_timeout(self.config.read_timeout) {
            warn!(%peer, error = %e, "cannot set read timeout, dropping client");
            return Ok(None);
        }
        info!(%peer, "client connected");
        Ok(Some(stream))
    }
}

fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

/// Binds `interface:port` and serves until a client stops the server.
pub fn serve(interface: &str, port: u16, mode: ConcurrencyMode) -> Result<ServerOutcome, ServerError> {
    let config = ServerConfig {
        interface: interface.to_string(),
        port,
        threaded: mode == ConcurrencyMode::Concurrent,
        ..ServerConfig::default()
    };
    Server::bind(config)?.serve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteClient, STOP_MESSAGE};

    fn local_config(threaded: bool) -> ServerConfig {
        ServerConfig {
            interface: "127.0.0.1".into(),
            port: 0,
            threaded,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_loopback_rewrites_unspecified() {
        let any: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(loopback(any), "127.0.0.1:4000".parse().unwrap());
        let fixed: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        assert_eq!(loopback(fixed), fixed);
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = Server::bind(local_config(false)).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = Server::bind(ServerConfig { port, ..local_config(false) }).err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[test]
    fn test_sequential_stop() {
        let server = Server::bind(local_config(false)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.serve());

        let mut client = RemoteClient::connect(addr).unwrap();
        assert_eq!(client.request("echo hi").unwrap(), "hi\n");
        assert_eq!(client.request("stop-server").unwrap(), STOP_MESSAGE);

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.sessions_served, 1);
    }

    #[test]
    fn test_concurrent_stop() {
        let server = Server::bind(local_config(true)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.serve());

        let mut first = RemoteClient::connect(addr).unwrap();
        let mut second = RemoteClient::connect(addr).unwrap();
        assert_eq!(second.request("echo two").unwrap(), "two\n");
        assert_eq!(first.request("echo one").unwrap(), "one\n");
        assert_eq!(second.request("stop-server").unwrap(), STOP_MESSAGE);
        drop(first);

        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.sessions_served, 2);
    }
}
