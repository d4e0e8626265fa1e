mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};

/// Splits a line into raw stage substrings on `|` outside of `"` quotes.
///
/// An unterminated quote hides every later `|`.
pub fn split_pipeline(line: &str) -> Vec<&str> {
    let mut stages = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (pos, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '|' if !in_quotes => {
                stages.push(&line[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    stages.push(&line[start..]);
    stages
}
