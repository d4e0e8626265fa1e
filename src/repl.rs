use std::io::{self, BufRead, Read, Write};

use tracing::{debug, info};

use crate::config::Limits;
use crate::executor::{
    Context, EngineState, ExecOutcome, Executor, StdioOverrides, EXIT_COMMAND, STOP_SERVER_COMMAND,
};
use crate::parser::{first_program, LineParser};
use crate::remote::{RemoteClient, EXIT_MESSAGE, STOP_MESSAGE};

pub const PROMPT: &str = "rsh> ";

pub struct ShellPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ShellPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ShellPrompt { input, output }
    }

    pub fn show_prompt(&mut self) -> io::Result<()> {
        self.output.write_all(PROMPT.as_bytes())?;
        self.output.flush()
    }

    /// `None` at end of input.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\n', '\r']).to_string()))
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }
}

/// Interactive loop on the local machine.
///
/// Children inherit the process's standard streams; messages from the shell
/// itself go to `output`. Returns the last exit code.
pub fn run_local_loop<R: BufRead, W: Write>(input: R, output: W, limits: Limits) -> io::Result<i32> {
    let parser = LineParser::new(limits);
    let executor = Executor::new(Context::Local);
    let mut state = EngineState::new(Context::Local);
    let mut prompt = ShellPrompt::new(input, output);

    loop {
        prompt.show_prompt()?;
        let Some(line) = prompt.read_line()? else {
            break;
        };
        if line.is_empty() {
            continue;
        }

        let pipeline = match parser.parse(&line) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                writeln!(prompt.output(), "{}", e.report())?;
                continue;
            }
        };

        match executor.exec(&pipeline, &StdioOverrides::inherit(), &mut state) {
            Ok(ExecOutcome::Exit) => {
                info!("exit requested");
                break;
            }
            Ok(ExecOutcome::Code(code)) => debug!(code, "command completed"),
            // Not registered locally.
            Ok(ExecOutcome::StopServer) => {}
            Err(e) => writeln!(prompt.output(), "error: {}", e)?,
        }
    }
    Ok(state.last_exit_code)
}

/// Interactive client: forwards each line to the server and prints the
/// response, until the server confirms `exit` or `stop-server`.
pub fn run_remote_loop<R, W, S>(input: R, output: W, client: &mut RemoteClient<S>) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    S: Read + Write,
{
    let mut prompt = ShellPrompt::new(input, output);

    loop {
        prompt.show_prompt()?;
        let Some(line) = prompt.read_line()? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        let ends_session = matches!(
            first_program(&line).as_deref(),
            Some(EXIT_COMMAND | STOP_SERVER_COMMAND)
        );

        client.send_command(&line)?;
        let response = client.read_response()?;
        let out = prompt.output();
        out.write_all(&response)?;
        out.flush()?;

        if ends_session && (response == EXIT_MESSAGE.as_bytes() || response == STOP_MESSAGE.as_bytes()) {
            break;
        }
    }
    Ok(())
}
