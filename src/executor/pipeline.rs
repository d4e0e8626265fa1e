use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::process::{self, Child, ExitStatus, Stdio};

use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use tracing::{debug, warn};

use crate::ast::{Command, Pipeline};
use crate::executor::stdio::{stdio_for, Fallback, StreamWriter};
use crate::executor::{ExecError, StdioOverrides};

/// How one stage terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    Signaled(i32),
}

impl StageStatus {
    pub fn success(self) -> bool {
        self == StageStatus::Exited(0)
    }

    /// Shell-style code: the exit status, or 128 + signal number.
    pub fn code(self) -> i32 {
        match self {
            StageStatus::Exited(code) => code,
            StageStatus::Signaled(sig) => 128 + sig,
        }
    }
}

impl From<ExitStatus> for StageStatus {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => StageStatus::Exited(code),
            (None, Some(sig)) => StageStatus::Signaled(sig),
            (None, None) => StageStatus::Exited(1),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Exited(code) => write!(f, "exited with status {}", code),
            StageStatus::Signaled(sig) => match Signal::try_from(*sig) {
                Ok(signal) => write!(f, "was killed by {}", signal.as_str()),
                Err(_) => write!(f, "was killed by signal {}", sig),
            },
        }
    }
}

enum StageProcess {
    Running(Child),
    /// The program could not be executed; the failure is already reported.
    Failed(StageStatus),
}

/// Redirection files opened for one stage before anything is spawned.
struct StageFiles {
    input: Option<File>,
    output: Option<File>,
}

impl StageFiles {
    fn open(cmd: &Command) -> Result<Self, ExecError> {
        let redirect_err = |path: &str| {
            let path = path.to_string();
            move |source: io::Error| ExecError::Redirect { path, source }
        };
        let input = match &cmd.input_source {
            Some(path) => Some(File::open(path).map_err(redirect_err(path))?),
            None => None,
        };
        let output = match &cmd.output_target {
            Some(path) => {
                let mut opts = OpenOptions::new();
                opts.write(true).create(true).mode(0o644);
                if cmd.append_output {
                    opts.append(true);
                } else {
                    opts.truncate(true);
                }
                Some(opts.open(path).map_err(redirect_err(path))?)
            }
            None => None,
        };
        Ok(StageFiles { input, output })
    }
}

struct PipeEnds {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

fn create_pipes(count: usize) -> Result<Vec<PipeEnds>, ExecError> {
    let mut pipes = Vec::with_capacity(count);
    for _ in 0..count {
        // Close-on-exec keeps every end out of unrelated children; the ends a
        // stage needs are dup'ed onto its standard streams at spawn.
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| ExecError::Pipe(io::Error::from(e)))?;
        pipes.push(PipeEnds {
            read: Some(read),
            write: Some(write),
        });
    }
    Ok(pipes)
}

/// Runs every stage of `pipeline` as its own process and waits for all of them.
///
/// Returns the last stage's exit code when every stage succeeded.
pub(crate) fn run(pipeline: &Pipeline, io: &StdioOverrides<'_>) -> Result<i32, ExecError> {
    let stages = pipeline.stages();
    debug!(stages = stages.len(), %pipeline, "running pipeline");

    let mut files = stages.iter().map(StageFiles::open).collect::<Result<Vec<_>, _>>()?;
    let mut pipes = create_pipes(stages.len() - 1)?;
    let mut processes = Vec::with_capacity(stages.len());

    let spawned = spawn_all(stages, io, &mut files, &mut pipes, &mut processes);
    // The parent keeps no pipe ends, otherwise readers never see EOF.
    drop(pipes);
    drop(files);

    let statuses = wait_all(processes);
    spawned?;
    let statuses = statuses?;

    let exit_code = statuses.last().map(|s| s.code()).unwrap_or(0);
    if let Some((stage, status)) = statuses.iter().enumerate().find(|(_, s)| !s.success()) {
        return Err(ExecError::StageFailed {
            stage,
            program: stages[stage].program().to_string(),
            status: *status,
            exit_code,
        });
    }
    Ok(exit_code)
}

fn spawn_all(
    stages: &[Command],
    io: &StdioOverrides<'_>,
    files: &mut [StageFiles],
    pipes: &mut [PipeEnds],
    processes: &mut Vec<StageProcess>,
) -> Result<(), ExecError> {
    let last = stages.len() - 1;

    for (i, stage) in stages.iter().enumerate() {
        let stdin = match files[i].input.take() {
            Some(file) => Stdio::from(file),
            None if i == 0 => stdio_for(io.stdin)?,
            None => pipe_end(pipes[i - 1].read.take()),
        };
        let stdout = match files[i].output.take() {
            Some(file) => Stdio::from(file),
            None if i == last => stdio_for(io.stdout)?,
            None => pipe_end(pipes[i].write.take()),
        };
        let stderr = stdio_for(io.stderr)?;

        processes.push(spawn_stage(stage, stdin, stdout, stderr, io)?);
    }
    Ok(())
}

fn pipe_end(fd: Option<OwnedFd>) -> Stdio {
    fd.map(Stdio::from).unwrap_or_else(Stdio::null)
}

fn spawn_stage(
    stage: &Command,
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
    io: &StdioOverrides<'_>,
) -> Result<StageProcess, ExecError> {
    let mut command = process::Command::new(stage.program());
    command.args(stage.args()).stdin(stdin).stdout(stdout).stderr(stderr);

    // `command` owns the stage's descriptors and closes them when it drops here.
    match command.spawn() {
        Ok(child) => {
            debug!(pid = child.id(), program = stage.program(), "spawned stage");
            Ok(StageProcess::Running(child))
        }
        Err(e) => match exec_failure_code(&e) {
            Some(code) => {
                report_exec_failure(stage.program(), &e, io);
                Ok(StageProcess::Failed(StageStatus::Exited(code)))
            }
            None => Err(ExecError::SpawnFailed {
                command: stage.program().to_string(),
                source: e,
            }),
        },
    }
}

/// Exit code for a program that could not be executed, or `None` when the
/// failure is resource exhaustion and the pipeline must be aborted.
fn exec_failure_code(err: &io::Error) -> Option<i32> {
    match err.kind() {
        io::ErrorKind::NotFound => Some(127),
        io::ErrorKind::PermissionDenied => Some(126),
        _ => match err.raw_os_error() {
            Some(libc::EAGAIN | libc::ENOMEM | libc::EMFILE | libc::ENFILE) | None => None,
            Some(code) => Some(code),
        },
    }
}

fn report_exec_failure(program: &str, err: &io::Error, io: &StdioOverrides<'_>) {
    let reason = match err.kind() {
        io::ErrorKind::NotFound => "command not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => err.to_string(),
    };
    warn!(program, %reason, "cannot execute stage");
    if let Ok(mut out) = StreamWriter::open(io.stderr, Fallback::Stderr) {
        let _ = writeln!(out, "rsh: {}: {}", program, reason);
    }
}

/// Waits for every spawned stage in spawn order, even after a failed wait.
fn wait_all(processes: Vec<StageProcess>) -> Result<Vec<StageStatus>, ExecError> {
    let mut statuses = Vec::with_capacity(processes.len());
    let mut wait_error = None;

    for process in processes {
        let status = match process {
            StageProcess::Failed(status) => status,
            StageProcess::Running(mut child) => match child.wait() {
                Ok(status) => StageStatus::from(status),
                Err(e) => {
                    wait_error.get_or_insert(e);
                    StageStatus::Exited(1)
                }
            },
        };
        debug!(%status, "stage finished");
        statuses.push(status);
    }

    match wait_error {
        Some(e) => Err(ExecError::Io(e)),
        None => Ok(statuses),
    }
}
