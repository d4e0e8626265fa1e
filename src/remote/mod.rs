//! Remote execution over TCP.
//!
//! A client sends one command line per request, ended by `\n` or `\0`. The
//! server streams the command's output straight from the child processes
//! into the socket and closes every response with a single [`TERMINATOR`]
//! byte. This is a trusted-network protocol: commands run unsandboxed.

mod client;
mod server;
mod session;

use std::io;

use thiserror::Error;

pub use client::RemoteClient;
pub use server::{serve, ConcurrencyMode, Server, ServerOutcome};
pub use session::{Session, SessionOutcome};

/// End-of-response marker (ASCII EOT).
pub const TERMINATOR: u8 = 0x04;

pub const EXIT_MESSAGE: &str = "Exiting client session.\n";
pub const STOP_MESSAGE: &str = "Server stopping.\n";

/// Transport failure; ends the session it happened in, never the server.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("peer stalled for longer than the read timeout")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {address}: {source}")]
    Bind { address: String, source: io::Error },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("cannot start session worker: {0}")]
    Worker(#[source] io::Error),
}
