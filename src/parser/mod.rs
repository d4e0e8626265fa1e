use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::ast::{Command, Pipeline};
use crate::config::Limits;
use crate::lexer::{split_pipeline, Lexer, TokenKind};

/// Which fixed bound a command exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    Executable(usize),
    ArgumentCount(usize),
    ArgumentBytes(usize),
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLimit::Executable(n) => write!(f, "executable name longer than {} bytes", n),
            SizeLimit::ArgumentCount(n) => write!(f, "more than {} words including the executable", n),
            SizeLimit::ArgumentBytes(n) => write!(f, "arguments longer than {} bytes", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Nothing to do; reported as a warning rather than a failure.
    #[error("no commands provided")]
    EmptyCommand,
    #[error("piping limited to {limit} commands")]
    TooManyStages { limit: usize },
    #[error("command or arguments too big in stage {}: {limit}", .stage + 1)]
    CommandTooLarge { stage: usize, limit: SizeLimit },
    #[error("cannot redirect input and output to the same file: {path}")]
    SelfRedirection { path: String },
    #[error("missing file name after '{operator}'")]
    MissingRedirectTarget { operator: &'static str },
}

impl ParseError {
    pub fn is_warning(&self) -> bool {
        matches!(self, ParseError::EmptyCommand)
    }

    /// The line shown to a user or a remote peer.
    pub fn report(&self) -> String {
        let level = if self.is_warning() { "warning" } else { "error" };
        format!("{}: {}", level, self)
    }
}

/// Turns command lines into validated pipelines under a fixed set of limits.
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    limits: Limits,
}

impl LineParser {
    pub fn new(limits: Limits) -> Self {
        LineParser { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn parse(&self, line: &str) -> Result<Pipeline, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        let mut stages = Vec::new();
        for (i, raw) in split_pipeline(line).into_iter().enumerate() {
            match parse_stage(raw.trim())? {
                Some(cmd) => {
                    if stages.len() == self.limits.max_stages {
                        return Err(ParseError::TooManyStages { limit: self.limits.max_stages });
                    }
                    stages.push(cmd);
                }
                None => warn!(segment = i + 1, "skipping empty pipeline segment"),
            }
        }

        Pipeline::new(stages, &self.limits)
    }
}

/// Parses `line` with the default limits.
pub fn parse(line: &str) -> Result<Pipeline, ParseError> {
    LineParser::default().parse(line)
}

/// The program the first non-empty stage of `line` runs, without applying
/// limits. `None` when there is no command or a stage is malformed.
pub fn first_program(line: &str) -> Option<String> {
    for raw in split_pipeline(line.trim()) {
        match parse_stage(raw.trim()) {
            Ok(Some(cmd)) => return Some(cmd.program().to_string()),
            Ok(None) => continue,
            Err(_) => return None,
        }
    }
    None
}

/// Returns `None` for a segment with no words once redirections are removed.
fn parse_stage(stage: &str) -> Result<Option<Command>, ParseError> {
    let mut cmd = Command::default();
    let mut tokens = Lexer::new(stage).tokenize().into_iter();

    while let Some(token) = tokens.next() {
        match token.kind.redirect() {
            None => cmd.arguments.push(token.lexeme),
            Some(kind) => match tokens.next() {
                Some(file) if file.kind == TokenKind::Word => cmd.redirect(kind, file.lexeme),
                _ => {
                    return Err(ParseError::MissingRedirectTarget {
                        operator: kind.operator(),
                    })
                }
            },
        }
    }

    if cmd.is_empty() {
        return Ok(None);
    }
    Ok(Some(cmd))
}
