use std::fmt;

use crate::error::ParseError;
use crate::tpl::token::{Token, TokenKind};

/// Cursor over a token sequence that always ends with `Eof`.
///
/// The cursor never moves past the terminal `Eof`; asking for the next token
/// while sitting on it is an unexpected end of template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
    current: usize,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let (offset, line) = tokens
                .last()
                .map(|t| (t.offset + t.value.len(), t.line))
                .unwrap_or((0, 1));
            tokens.push(Token::new(TokenKind::Eof, "", offset, line));
        }
        Self { tokens, current: 0 }
    }

    /// Returns the token under the cursor and advances.
    pub fn next(&mut self) -> Result<&Token, ParseError> {
        let index = self.current;
        let token = &self.tokens[index];
        if token.kind == TokenKind::Eof {
            return Err(ParseError::UnexpectedEndOfFile {
                line: token.line,
                unclosed: None,
            });
        }
        self.current += 1;
        Ok(&self.tokens[index])
    }

    /// Looks `n` tokens ahead of the cursor, clamped to the terminal `Eof`.
    pub fn peek(&self, n: usize) -> &Token {
        let index = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.current]
    }

    /// The most recently consumed token, or the first one if nothing was consumed.
    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub fn is_eof(&self) -> bool {
        self.tokens[self.current].kind == TokenKind::Eof
    }

    /// Consumes tokens up to and including the first one of `kind`, returning
    /// the tokens before it.
    pub fn take_until(&mut self, kind: TokenKind) -> Result<&[Token], ParseError> {
        let start = self.current;
        while self.next()?.kind != kind {}
        Ok(&self.tokens[start..self.current - 1])
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(&token.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> TokenStream {
        TokenStream::new(vec![
            Token::new(TokenKind::ValueStart, "{{", 0, 1),
            Token::new(TokenKind::Name, "a", 3, 1),
            Token::new(TokenKind::ValueEnd, "}}", 5, 1),
        ])
    }

    #[test]
    fn eof_is_appended_and_never_passed() {
        let mut ts = stream();
        assert_eq!(ts.len(), 4);
        assert_eq!(ts.tokens()[3].kind, TokenKind::Eof);
        assert_eq!(ts.tokens()[3].offset, 7);

        for _ in 0..3 {
            ts.next().unwrap();
        }
        assert!(ts.is_eof());
        match ts.next() {
            Err(ParseError::UnexpectedEndOfFile { line: 1, .. }) => {}
            other => panic!("Expected UnexpectedEndOfFile, got {:?}", other),
        }
        assert!(ts.is_eof());
    }

    #[test]
    fn peek_clamps_to_eof() {
        let ts = stream();
        assert_eq!(ts.peek(1).value, "a");
        assert_eq!(ts.peek(10).kind, TokenKind::Eof);
    }

    #[test]
    fn take_until_excludes_the_terminator() {
        let mut ts = stream();
        ts.next().unwrap();
        let inner = ts.take_until(TokenKind::ValueEnd).unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].value, "a");
        assert!(ts.is_eof());
        assert_eq!(ts.previous().kind, TokenKind::ValueEnd);
    }

    #[test]
    fn take_until_without_terminator_hits_eof() {
        let mut ts = stream();
        assert!(matches!(
            ts.take_until(TokenKind::BlockEnd),
            Err(ParseError::UnexpectedEndOfFile { .. })
        ));
    }

    #[test]
    fn display_concatenates_values() {
        assert_eq!(stream().to_string(), "{{a}}");
    }
}
