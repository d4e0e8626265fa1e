use crate::ast::RedirectKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word,           // Argument, possibly assembled from quoted spans
    RedirectIn,     // <
    RedirectOut,    // >
    RedirectAppend, // >>
}

impl TokenKind {
    pub fn redirect(&self) -> Option<RedirectKind> {
        match self {
            TokenKind::Word => None,
            TokenKind::RedirectIn => Some(RedirectKind::In),
            TokenKind::RedirectOut => Some(RedirectKind::Out),
            TokenKind::RedirectAppend => Some(RedirectKind::Append),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String, // Quotes already stripped for words
}
