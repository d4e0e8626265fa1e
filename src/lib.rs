//! A small shell that runs pipelines locally or for remote TCP clients.

pub mod ast;
pub mod config;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod remote;
pub mod repl;

pub use ast::{Command, Pipeline};
pub use config::{ConfigLoader, Limits, ServerConfig};
pub use error::{Error, Result};
pub use executor::{execute, EngineState, ExecError, ExecOutcome, Executor, StdioOverrides};
pub use parser::{parse, LineParser, ParseError};
