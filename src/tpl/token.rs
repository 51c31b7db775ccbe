use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Eof,
    Text,
    BlockStart,
    BlockEnd,
    ValueStart,
    ValueEnd,
    Name,
    Number,
    String,
    Operator,
    Punctuation,
}

impl TokenKind {
    /// Human readable name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of template",
            TokenKind::Text => "text",
            TokenKind::BlockStart => "begin of statement block",
            TokenKind::BlockEnd => "end of statement block",
            TokenKind::ValueStart => "begin of print statement",
            TokenKind::ValueEnd => "end of print statement",
            TokenKind::Name => "name",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A lexical unit. `value` is the exact slice of the normalized source
/// starting at byte `offset`; `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub offset: usize,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, offset: usize, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            offset,
            line,
        }
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.value == punct
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.value == op
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.value == name
    }

    /// Short description for error messages, e.g. ``name `foo` ``.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => self.kind.describe().to_string(),
            TokenKind::Text => format!("{}", self.kind),
            kind => format!("{} `{}`", kind, self.value),
        }
    }

    /// Content of a string token without its quotes, escapes resolved.
    /// Other tokens return their value unchanged.
    pub fn unquote(&self) -> String {
        if self.kind != TokenKind::String || self.value.len() < 2 {
            return self.value.clone();
        }
        let inner = &self.value[1..self.value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})({})", self.kind, self.value, self.line)
    }
}
