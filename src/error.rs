use thiserror::Error;

use crate::source::{ContextLine, Source};

/// Failures while turning source text into tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unclosed tag, expected `{expected}`")]
    UnclosedTag { expected: &'static str, line: usize },
    #[error("unclosed bracket `{bracket}`")]
    UnclosedBracket { bracket: char, line: usize },
    #[error("mismatched bracket `{found}`{}", expected_suffix(.expected))]
    MismatchedBracket {
        found: char,
        expected: Option<char>,
        line: usize,
    },
    #[error("unexpected character `{ch}`")]
    UnexpectedCharacter { ch: char, line: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnclosedTag { line, .. }
            | LexError::UnclosedBracket { line, .. }
            | LexError::MismatchedBracket { line, .. }
            | LexError::UnexpectedCharacter { line, .. } => *line,
        }
    }
}

fn expected_suffix(expected: &Option<char>) -> String {
    match expected {
        Some(c) => format!(", expected `{}`", c),
        None => ", no bracket is open".to_string(),
    }
}

/// Failures inside the precedence parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("malformed expression, an operator is missing an operand")]
    EmptyStackUnderflow { line: usize },
    #[error("malformed expression, {count} operands are left without an operator")]
    ResidualOperands { count: usize, line: usize },
    #[error("unexpected {found} in expression")]
    UnexpectedToken { found: String, line: usize },
}

impl ExprError {
    pub fn line(&self) -> usize {
        match self {
            ExprError::EmptyStackUnderflow { line }
            | ExprError::ResidualOperands { line, .. }
            | ExprError::UnexpectedToken { line, .. } => *line,
        }
    }
}

/// Failures while building statements from the token stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {found}")]
    UnexpectedToken { found: String, line: usize },
    #[error("unexpected end of template{}", unclosed_suffix(.unclosed))]
    UnexpectedEndOfFile {
        line: usize,
        unclosed: Option<&'static str>,
    },
    #[error("invalid assignment, {reason}")]
    InvalidAssignment { reason: String, line: usize },
    #[error(transparent)]
    Expression(ExprError),
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { line, .. }
            | ParseError::UnexpectedEndOfFile { line, .. }
            | ParseError::InvalidAssignment { line, .. } => *line,
            ParseError::Expression(e) => e.line(),
        }
    }
}

impl From<ExprError> for ParseError {
    fn from(e: ExprError) -> Self {
        match e {
            ExprError::UnexpectedToken { found, line } => {
                ParseError::UnexpectedToken { found, line }
            }
            other => ParseError::Expression(other),
        }
    }
}

fn unclosed_suffix(unclosed: &Option<&'static str>) -> String {
    match unclosed {
        Some(tag) => format!(", `{}` is never closed", tag),
        None => String::new(),
    }
}

/// Either stage of compilation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        match self {
            SyntaxError::Lex(e) => e.line(),
            SyntaxError::Parse(e) => e.line(),
        }
    }
}

/// A syntax error pinned to its source: identity, line and a window of
/// surrounding lines with the failing one flagged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{identity}:{line}: {cause}")]
pub struct Diagnostic {
    pub identity: String,
    pub line: usize,
    #[source]
    pub cause: SyntaxError,
    pub context: Vec<ContextLine>,
}

impl Diagnostic {
    pub fn new(source: &Source, cause: SyntaxError, radius: usize) -> Self {
        let line = cause.line();
        Self {
            identity: source.identity().to_string(),
            line,
            context: source.context(line, radius),
            cause,
        }
    }

    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    /// Renders the headline followed by the numbered context window, marking
    /// the failing line with `>`.
    pub fn render(&self) -> String {
        let width = self
            .context
            .last()
            .map(|l| l.number.to_string().len())
            .unwrap_or(1);
        let mut out = format!("{}\n", self);
        for line in &self.context {
            let marker = if line.flagged { '>' } else { ' ' };
            out.push_str(&format!(
                "{} {:>width$} | {}\n",
                marker,
                line.number,
                line.text,
                width = width
            ));
        }
        out
    }
}

#[derive(Error, Debug)]
pub enum TplError {
    #[error("Template Syntax Error: {0}")]
    Syntax(Diagnostic),
    #[error("Template Load Error: {0}")]
    LoadError(String),
    #[error("Template Not Found: {0}")]
    NotFound(String),
    #[error("Duplicate Template: {0}")]
    DuplicateTemplate(String),
    #[error("Serialization Error: {0}")]
    SerializationError(String),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TplError {
    fn from(e: serde_json::Error) -> Self {
        TplError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TplError>;
