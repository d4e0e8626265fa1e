//! Pipeline execution: built-in dispatch, stage spawning and exit status.

mod builtin;
mod pipeline;
mod stdio;

use std::io;

use thiserror::Error;
use tracing::debug;

use crate::ast::Pipeline;

pub use builtin::{
    BuiltinCommand, BuiltinContext, BuiltinError, BuiltinManager, BuiltinOutcome, EXIT_COMMAND,
    STOP_SERVER_COMMAND,
};
pub use pipeline::StageStatus;
pub use stdio::StdioOverrides;

/// Result of a pipeline that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Code(i32),
    /// `exit` ran as the sole stage.
    Exit,
    /// `stop-server` ran as the sole stage of a remote request.
    StopServer,
}

pub type ExecStatus = Result<ExecOutcome, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("built-in commands cannot be used in pipelines: `{name}` in stage {}", .stage + 1)]
    BuiltinInPipeline { name: String, stage: usize },
    #[error("cannot open {path}: {source}")]
    Redirect { path: String, source: io::Error },
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed { command: String, source: io::Error },
    #[error("stage {} (`{program}`) {status}", .stage + 1)]
    StageFailed {
        stage: usize,
        program: String,
        status: StageStatus,
        /// Exit code of the last stage.
        exit_code: i32,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ExecError {
    /// The value recorded as the last exit code after this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::StageFailed { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Context {
    #[default]
    Local,
    Remote,
}

/// Per-caller engine state; one per local loop or remote session.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub last_exit_code: i32,
    pub context: Context,
}

impl EngineState {
    pub fn new(context: Context) -> Self {
        EngineState {
            last_exit_code: 0,
            context,
        }
    }
}

/// Runs pipelines for one caller, holding its built-in registry.
pub struct Executor {
    builtin_registry: BuiltinManager,
}

impl Executor {
    pub fn new(context: Context) -> Self {
        Executor {
            builtin_registry: BuiltinManager::new(context),
        }
    }

    /// Executes `pipeline` with `io` standing in for the standard streams.
    ///
    /// A lone built-in runs in-process. In a multi-stage pipeline any built-in
    /// rejects the whole pipeline before a pipe is created or a process spawned.
    /// `state.last_exit_code` is updated on every path except `exit`/`stop-server`
    /// and `rc`.
    pub fn exec(&self, pipeline: &Pipeline, io: &StdioOverrides<'_>, state: &mut EngineState) -> ExecStatus {
        let builtins = &self.builtin_registry;

        if pipeline.is_single() {
            match builtins.dispatch(pipeline.first(), state, io) {
                BuiltinOutcome::NotBuiltin => {}
                BuiltinOutcome::Executed => return Ok(ExecOutcome::Code(state.last_exit_code)),
                BuiltinOutcome::RequestExit => return Ok(ExecOutcome::Exit),
                BuiltinOutcome::RequestServerStop => return Ok(ExecOutcome::StopServer),
            }
        } else if let Some((stage, cmd)) = pipeline
            .stages()
            .iter()
            .enumerate()
            .find(|(_, cmd)| builtins.is_builtin(cmd.program()))
        {
            state.last_exit_code = 1;
            return Err(ExecError::BuiltinInPipeline {
                name: cmd.program().to_string(),
                stage,
            });
        }

        let result = pipeline::run(pipeline, io);
        state.last_exit_code = match &result {
            Ok(code) => *code,
            Err(e) => e.exit_code(),
        };
        debug!(exit_code = state.last_exit_code, "pipeline finished");
        result.map(ExecOutcome::Code)
    }
}

/// Runs a single pipeline with a fresh [`Executor`] for `state.context`.
pub fn execute(pipeline: &Pipeline, io: &StdioOverrides<'_>, state: &mut EngineState) -> ExecStatus {
    Executor::new(state.context).exec(pipeline, io, state)
}
