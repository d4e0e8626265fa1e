mod commands;
mod manager;

pub use manager::{BuiltinCommand, BuiltinContext, BuiltinError, BuiltinManager, BuiltinOutcome};

pub const EXIT_COMMAND: &str = "exit";
/// Registered only for remote sessions.
pub const STOP_SERVER_COMMAND: &str = "stop-server";
