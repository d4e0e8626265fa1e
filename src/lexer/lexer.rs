use super::token::{Token, TokenKind};

/// Splits one pipeline stage into words and redirection operators.
///
/// Only `"` quotes; `'` is an ordinary character. The lexer is total: an
/// unterminated quote swallows the rest of the input and the partial word is
/// still emitted.
pub struct Lexer<'a> {
    input: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input }
    }

    pub fn tokenize(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut chars = self.input.chars().peekable();
        let mut buf = String::new();
        let mut in_word = false;
        let mut in_quotes = false;

        while let Some(ch) = chars.next() {
            if in_quotes {
                if ch == '"' {
                    in_quotes = false;
                } else {
                    buf.push(ch);
                }
                continue;
            }
            match ch {
                '"' => {
                    // An empty quoted span still produces a word.
                    in_word = true;
                    in_quotes = true;
                }
                c if c.is_whitespace() => push_word(&mut tokens, &mut buf, &mut in_word),
                '<' | '>' => {
                    push_word(&mut tokens, &mut buf, &mut in_word);
                    let (kind, lexeme) = match ch {
                        '<' => (TokenKind::RedirectIn, "<"),
                        _ if chars.peek() == Some(&'>') => {
                            chars.next();
                            (TokenKind::RedirectAppend, ">>")
                        }
                        _ => (TokenKind::RedirectOut, ">"),
                    };
                    tokens.push(Token {
                        kind,
                        lexeme: lexeme.to_string(),
                    });
                }
                _ => {
                    in_word = true;
                    buf.push(ch);
                }
            }
        }
        push_word(&mut tokens, &mut buf, &mut in_word);

        tokens
    }
}

fn push_word(tokens: &mut Vec<Token>, buf: &mut String, in_word: &mut bool) {
    if std::mem::take(in_word) {
        tokens.push(Token {
            kind: TokenKind::Word,
            lexeme: std::mem::take(buf),
        });
    }
}
