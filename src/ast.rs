use std::fmt;

use crate::config::Limits;
use crate::parser::{ParseError, SizeLimit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    In,
    Out,
    Append,
}

impl RedirectKind {
    pub fn operator(self) -> &'static str {
        match self {
            RedirectKind::In => "<",
            RedirectKind::Out => ">",
            RedirectKind::Append => ">>",
        }
    }
}

/// One pipeline stage: the program, its arguments, and optional file redirection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// `arguments[0]` is the executable name.
    pub arguments: Vec<String>,
    pub input_source: Option<String>,
    pub output_target: Option<String>,
    pub append_output: bool,
}

impl Command {
    pub fn new<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command {
            arguments: arguments.into_iter().map(Into::into).collect(),
            ..Command::default()
        }
    }

    pub fn program(&self) -> &str {
        self.arguments.first().map(String::as_str).unwrap_or("")
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        self.arguments.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Later redirections of the same direction replace earlier ones.
    pub fn redirect(&mut self, kind: RedirectKind, file: String) {
        match kind {
            RedirectKind::In => self.input_source = Some(file),
            RedirectKind::Out => {
                self.output_target = Some(file);
                self.append_output = false;
            }
            RedirectKind::Append => {
                self.output_target = Some(file);
                self.append_output = true;
            }
        }
    }

    /// Checks size limits and self-clobbering redirection for the stage at `stage`.
    pub fn validate(&self, stage: usize, limits: &Limits) -> Result<(), ParseError> {
        let program = self.program();
        if program.len() > limits.max_exe_len {
            return Err(ParseError::CommandTooLarge {
                stage,
                limit: SizeLimit::Executable(limits.max_exe_len),
            });
        }
        if self.arguments.len() > limits.max_args {
            return Err(ParseError::CommandTooLarge {
                stage,
                limit: SizeLimit::ArgumentCount(limits.max_args),
            });
        }
        // Arguments are measured as they would sit in a single space-joined buffer.
        let arg_bytes = self.args().iter().map(String::len).sum::<usize>()
            + self.args().len().saturating_sub(1);
        if arg_bytes > limits.max_arg_bytes {
            return Err(ParseError::CommandTooLarge {
                stage,
                limit: SizeLimit::ArgumentBytes(limits.max_arg_bytes),
            });
        }
        if let (Some(input), Some(output)) = (&self.input_source, &self.output_target) {
            if input == output {
                return Err(ParseError::SelfRedirection { path: input.clone() });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arguments.join(" "))?;
        if let Some(input) = &self.input_source {
            write!(f, " < {}", input)?;
        }
        if let Some(output) = &self.output_target {
            let op = if self.append_output { ">>" } else { ">" };
            write!(f, " {} {}", op, output)?;
        }
        Ok(())
    }
}

/// An ordered, non-empty list of stages; stage `i` feeds stage `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Command>,
}

impl Pipeline {
    /// Builds a pipeline, enforcing the stage bound and every per-stage invariant.
    pub fn new(stages: Vec<Command>, limits: &Limits) -> Result<Self, ParseError> {
        if stages.is_empty() {
            return Err(ParseError::EmptyCommand);
        }
        if stages.len() > limits.max_stages {
            return Err(ParseError::TooManyStages { limit: limits.max_stages });
        }
        for (i, stage) in stages.iter().enumerate() {
            if stage.is_empty() {
                return Err(ParseError::EmptyCommand);
            }
            stage.validate(i, limits)?;
        }
        Ok(Pipeline { stages })
    }

    pub fn stages(&self) -> &[Command] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn first(&self) -> &Command {
        &self.stages[0]
    }

    pub fn is_single(&self) -> bool {
        self.stages.len() == 1
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_and_args() {
        let cmd = Command::new(["grep", "-n", "foo"]);
        assert_eq!(cmd.program(), "grep");
        assert_eq!(cmd.args(), &["-n".to_string(), "foo".to_string()]);
    }

    #[test]
    fn test_redirect_append_then_truncate() {
        let mut cmd = Command::new(["echo"]);
        cmd.redirect(RedirectKind::Append, "log".into());
        assert!(cmd.append_output);
        cmd.redirect(RedirectKind::Out, "out".into());
        assert_eq!(cmd.output_target.as_deref(), Some("out"));
        assert!(!cmd.append_output);
    }

    #[test]
    fn test_self_redirection_rejected() {
        let mut cmd = Command::new(["cat"]);
        cmd.redirect(RedirectKind::In, "same.txt".into());
        cmd.redirect(RedirectKind::Out, "same.txt".into());
        assert_eq!(
            cmd.validate(0, &Limits::default()),
            Err(ParseError::SelfRedirection { path: "same.txt".into() })
        );
    }

    #[test]
    fn test_executable_too_long() {
        let limits = Limits::default();
        let cmd = Command::new(["x".repeat(limits.max_exe_len + 1)]);
        assert!(matches!(
            cmd.validate(2, &limits),
            Err(ParseError::CommandTooLarge { stage: 2, limit: SizeLimit::Executable(_) })
        ));
    }

    #[test]
    fn test_argument_count_includes_program() {
        let limits = Limits::default();
        let full = Command::new(["echo", "1", "2", "3", "4", "5", "6", "7"]);
        assert!(full.validate(0, &limits).is_ok());
        let over = Command::new(["echo", "1", "2", "3", "4", "5", "6", "7", "8"]);
        assert_eq!(
            over.validate(0, &limits),
            Err(ParseError::CommandTooLarge { stage: 0, limit: SizeLimit::ArgumentCount(8) })
        );
    }

    #[test]
    fn test_argument_bytes_limit() {
        let limits = Limits { max_arg_bytes: 10, ..Limits::default() };
        assert!(Command::new(["echo", "12345", "1234"]).validate(0, &limits).is_ok());
        assert!(matches!(
            Command::new(["echo", "12345", "12345"]).validate(0, &limits),
            Err(ParseError::CommandTooLarge { limit: SizeLimit::ArgumentBytes(10), .. })
        ));
    }

    #[test]
    fn test_pipeline_bounds() {
        let limits = Limits { max_stages: 2, ..Limits::default() };
        assert_eq!(Pipeline::new(vec![], &limits), Err(ParseError::EmptyCommand));
        let three = vec![Command::new(["a"]), Command::new(["b"]), Command::new(["c"])];
        assert_eq!(
            Pipeline::new(three, &limits),
            Err(ParseError::TooManyStages { limit: 2 })
        );
        let two = Pipeline::new(vec![Command::new(["a"]), Command::new(["b"])], &limits).unwrap();
        assert_eq!(two.len(), 2);
        assert!(!two.is_single());
    }

    #[test]
    fn test_display() {
        let mut last = Command::new(["wc", "-l"]);
        last.redirect(RedirectKind::Append, "count".into());
        let p = Pipeline::new(vec![Command::new(["ls"]), last], &Limits::default()).unwrap();
        assert_eq!(p.to_string(), "ls | wc -l >> count");
    }
}
