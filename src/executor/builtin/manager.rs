use std::collections::HashMap;
use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

use crate::ast::Command;
use crate::executor::stdio::{Fallback, StreamWriter};
use crate::executor::{Context, EngineState, StdioOverrides};
use crate::executor::builtin::commands::{
    CdCommand,
    DragonCommand,
    ExitCommand,
    RcCommand,
    StopServerCommand,
};

/// What the caller should do after offering a command to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOutcome {
    NotBuiltin,
    Executed,
    RequestExit,
    RequestServerStop,
}

#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("{name}: missing directory argument")]
    MissingArgument { name: &'static str },
    #[error("cd: {path}: {source}")]
    ChangeDirectory { path: String, source: io::Error },
    #[error("{name}: cannot write output: {source}")]
    Output { name: &'static str, source: io::Error },
}

pub struct BuiltinContext<'a, 'io> {
    pub state: &'a mut EngineState,
    pub io: &'a StdioOverrides<'io>,
}

impl BuiltinContext<'_, '_> {
    pub(crate) fn stdout(&self) -> io::Result<StreamWriter> {
        StreamWriter::open(self.io.stdout, Fallback::Stdout)
    }

    pub(crate) fn stderr(&self) -> io::Result<StreamWriter> {
        StreamWriter::open(self.io.stderr, Fallback::Stderr)
    }
}

pub trait BuiltinCommand {
    fn name(&self) -> &'static str;
    fn run(&self, args: &[String], ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError>;
}

pub struct BuiltinManager {
    commands: HashMap<&'static str, Box<dyn BuiltinCommand>>,
}

impl BuiltinManager {
    /// `stop-server` is only recognized in a remote context.
    pub fn new(context: Context) -> Self {
        let mut mgr = BuiltinManager {
            commands: HashMap::new(),
        };
        mgr.register(Box::new(ExitCommand));
        mgr.register(Box::new(CdCommand));
        mgr.register(Box::new(RcCommand));
        mgr.register(Box::new(DragonCommand));
        if context == Context::Remote {
            mgr.register(Box::new(StopServerCommand));
        }
        mgr
    }

    pub fn register(&mut self, cmd: Box<dyn BuiltinCommand>) {
        self.commands.insert(cmd.name(), cmd);
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Runs `cmd` if it names a built-in.
    ///
    /// Built-in failures are reported on the error stream and leave
    /// `last_exit_code` at 1; they never end the caller's loop.
    pub fn dispatch(
        &self,
        cmd: &Command,
        state: &mut EngineState,
        io: &StdioOverrides<'_>,
    ) -> BuiltinOutcome {
        let Some(builtin) = self.commands.get(cmd.program()) else {
            return BuiltinOutcome::NotBuiltin;
        };
        debug!(builtin = builtin.name(), "dispatching built-in");

        let mut ctx = BuiltinContext { state, io };
        match builtin.run(cmd.args(), &mut ctx) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Ok(mut err) = ctx.stderr() {
                    let _ = writeln!(err, "{}", e);
                }
                ctx.state.last_exit_code = 1;
                BuiltinOutcome::Executed
            }
        }
    }
}
