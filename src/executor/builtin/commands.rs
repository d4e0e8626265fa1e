use std::io::Write;

use crate::executor::builtin::{EXIT_COMMAND, STOP_SERVER_COMMAND};
use crate::executor::builtin::manager::{BuiltinCommand, BuiltinContext, BuiltinError, BuiltinOutcome};

pub struct ExitCommand;

impl BuiltinCommand for ExitCommand {
    fn name(&self) -> &'static str {
        EXIT_COMMAND
    }
    fn run(&self, _args: &[String], _ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError> {
        Ok(BuiltinOutcome::RequestExit)
    }
}

pub struct StopServerCommand;

impl BuiltinCommand for StopServerCommand {
    fn name(&self) -> &'static str {
        STOP_SERVER_COMMAND
    }
    fn run(&self, _args: &[String], _ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError> {
        Ok(BuiltinOutcome::RequestServerStop)
    }
}

/// Changes the working directory of the whole process.
pub struct CdCommand;

impl BuiltinCommand for CdCommand {
    fn name(&self) -> &'static str {
        "cd"
    }
    fn run(&self, args: &[String], ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError> {
        let target = args.first().ok_or(BuiltinError::MissingArgument { name: "cd" })?;
        std::env::set_current_dir(target).map_err(|source| BuiltinError::ChangeDirectory {
            path: target.clone(),
            source,
        })?;
        ctx.state.last_exit_code = 0;
        Ok(BuiltinOutcome::Executed)
    }
}

pub struct RcCommand;

impl BuiltinCommand for RcCommand {
    fn name(&self) -> &'static str {
        "rc"
    }
    fn run(&self, _args: &[String], ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError> {
        let output = |source| BuiltinError::Output { name: "rc", source };
        let mut out = ctx.stdout().map_err(output)?;
        writeln!(out, "{}", ctx.state.last_exit_code).map_err(output)?;
        Ok(BuiltinOutcome::Executed)
    }
}

const DRAGON: &str = r#"
                 __        _
      _/|    _  /  \     /' `\
     /  |___/ \/ ^^ \___/  /\ \
    (  o       \         _/  \_)
     \___/\___  \__/\___/
              \_/
"#;

pub struct DragonCommand;

impl BuiltinCommand for DragonCommand {
    fn name(&self) -> &'static str {
        "dragon"
    }
    fn run(&self, _args: &[String], ctx: &mut BuiltinContext<'_, '_>) -> Result<BuiltinOutcome, BuiltinError> {
        let output = |source| BuiltinError::Output { name: "dragon", source };
        let mut out = ctx.stdout().map_err(output)?;
        out.write_all(DRAGON.trim_start_matches('\n').as_bytes()).map_err(output)?;
        ctx.state.last_exit_code = 0;
        Ok(BuiltinOutcome::Executed)
    }
}
