use crate::error::LexError;
use crate::source::{Source, normalize_newlines};
use crate::tpl::token::{Token, TokenKind};
use crate::tpl::token_stream::TokenStream;

const VALUE_TAG: [&str; 2] = ["{{", "}}"];
const BLOCK_TAG: [&str; 2] = ["{%", "%}"];
const COMMENT_TAG: [&str; 2] = ["{#", "#}"];

/// Prefix that turns a tag into literal text, e.g. `@{{ name }}`.
const ESCAPE: u8 = b'@';

const VERBATIM: &str = "verbatim";
const END_VERBATIM: &str = "endverbatim";

/// Symbolic operators, longest first so the first prefix match is the longest.
const OPERATORS: [&str; 27] = [
    ">>=", "<<=", //
    "+=", "-=", "++", "--", ">=", "<=", "&&", "||", ">>", "<<", "&=", "|=", "==", "!=", //
    "+", "-", "*", "/", "%", ">", "<", "^", "&", "|", "=",
];

/// Names that lex as operators.
const WORD_OPERATORS: [&str; 3] = ["and", "or", "is"];

const PUNCTUATION: &str = "()[]{}?:;,";

/// Tokenizes a template source into a stream ending with `Eof`.
pub fn tokenize(source: &Source) -> Result<TokenStream, LexError> {
    let code = normalize_newlines(source.text());
    let mut lexer = Lexer::new(&code);
    lexer.lex()?;
    Ok(TokenStream::new(lexer.tokens))
}

/// Sub-lexes a bare expression, as if it were the interior of a tag.
///
/// No `Eof` token is appended, so the result can be handed straight to
/// [`parse_expr`](crate::tpl::expr::parse_expr).
pub fn tokenize_expression(text: &str) -> Result<Vec<Token>, LexError> {
    let code = normalize_newlines(text);
    let mut lexer = Lexer::new(&code);
    lexer.lex_expression(None)?;
    Ok(lexer.tokens)
}

/// Closing delimiter of the tag whose interior is being sub-lexed.
#[derive(Clone, Copy)]
struct Closer {
    kind: TokenKind,
    text: &'static str,
}

struct Lexer<'a> {
    code: &'a str,
    cursor: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(code: &'a str) -> Self {
        Self {
            code,
            cursor: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    fn lex(&mut self) -> Result<(), LexError> {
        for start in find_tag_starts(self.code) {
            // Openers swallowed by an earlier tag, e.g. the second `{` of `{{{`.
            if start < self.cursor {
                continue;
            }
            self.lex_tag(start)?;
        }
        self.push_text(self.code.len());
        self.push(TokenKind::Eof, self.code.len());
        Ok(())
    }

    fn lex_tag(&mut self, start: usize) -> Result<(), LexError> {
        let escaped = start > self.cursor && self.code.as_bytes()[start - 1] == ESCAPE;
        if escaped {
            self.push_text(start - 1);
            self.move_to(start);
            return self.lex_escaped(start);
        }

        self.push_text(start);
        let code = self.code;
        match &code[start..start + 2] {
            "{#" => self.lex_comment(start),
            "{%" => self.lex_block(start),
            _ => self.lex_value(start),
        }
    }

    /// `@{{ … }}` and friends: the whole tag becomes literal text.
    fn lex_escaped(&mut self, start: usize) -> Result<(), LexError> {
        let close = closer_of(&self.code[start..start + 2]);
        match self.code[start + 2..].find(close) {
            Some(idx) => {
                self.push(TokenKind::Text, start + 2 + idx + close.len());
                Ok(())
            }
            None => Err(LexError::UnclosedTag {
                expected: close,
                line: self.line,
            }),
        }
    }

    fn lex_comment(&mut self, start: usize) -> Result<(), LexError> {
        let body = start + COMMENT_TAG[0].len();
        match self.code[body..].find(COMMENT_TAG[1]) {
            Some(idx) => {
                self.move_to(body + idx + COMMENT_TAG[1].len());
                Ok(())
            }
            None => Err(LexError::UnclosedTag {
                expected: COMMENT_TAG[1],
                line: self.line,
            }),
        }
    }

    fn lex_block(&mut self, start: usize) -> Result<(), LexError> {
        let body = start + BLOCK_TAG[0].len();
        if let Some(content) = match_tag_word(self.code, body, VERBATIM) {
            return self.lex_verbatim(content);
        }

        self.push(TokenKind::BlockStart, body);
        self.lex_expression(Some(Closer {
            kind: TokenKind::BlockEnd,
            text: BLOCK_TAG[1],
        }))
    }

    fn lex_verbatim(&mut self, content: usize) -> Result<(), LexError> {
        let line = self.line;
        let mut search = content;
        while let Some(idx) = self.code[search..].find(BLOCK_TAG[0]) {
            let tag = search + idx;
            if let Some(end) = match_tag_word(self.code, tag + BLOCK_TAG[0].len(), END_VERBATIM) {
                self.move_to(content);
                self.push_text(tag);
                self.move_to(end);
                return Ok(());
            }
            search = tag + BLOCK_TAG[0].len();
        }
        Err(LexError::UnclosedTag {
            expected: END_VERBATIM,
            line,
        })
    }

    fn lex_value(&mut self, start: usize) -> Result<(), LexError> {
        self.push(TokenKind::ValueStart, start + VALUE_TAG[0].len());
        self.lex_expression(Some(Closer {
            kind: TokenKind::ValueEnd,
            text: VALUE_TAG[1],
        }))
    }

    /// Sub-lexes a tag interior up to `closer`, or to the end of input when
    /// there is none.
    fn lex_expression(&mut self, closer: Option<Closer>) -> Result<(), LexError> {
        let code = self.code;
        let opened_at = self.line;
        let mut brackets: Vec<(char, usize)> = Vec::new();

        loop {
            self.skip_whitespace();
            let rest = &code[self.cursor..];

            let Some(ch) = rest.chars().next() else {
                return match closer {
                    Some(closer) => Err(LexError::UnclosedTag {
                        expected: closer.text,
                        line: opened_at,
                    }),
                    None => check_brackets(&brackets),
                };
            };

            if let Some(closer) = closer
                && rest.starts_with(closer.text)
                && !closes_brace(closer.text, &brackets)
            {
                check_brackets(&brackets)?;
                self.push(closer.kind, self.cursor + closer.text.len());
                return Ok(());
            }

            if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                self.push(TokenKind::Operator, self.cursor + op.len());
            } else if is_name_start(ch) {
                let len = name_len(rest);
                let kind = if WORD_OPERATORS.contains(&&rest[..len]) {
                    TokenKind::Operator
                } else {
                    TokenKind::Name
                };
                self.push(kind, self.cursor + len);
            } else if ch.is_ascii_digit() {
                self.push(TokenKind::Number, self.cursor + number_len(rest));
            } else if ch == '"' || ch == '\'' {
                let len = string_len(rest).ok_or(LexError::UnexpectedCharacter {
                    ch,
                    line: self.line,
                })?;
                self.push(TokenKind::String, self.cursor + len);
            } else if PUNCTUATION.contains(ch) {
                self.track_bracket(ch, &mut brackets)?;
                self.push(TokenKind::Punctuation, self.cursor + 1);
            } else {
                return Err(LexError::UnexpectedCharacter {
                    ch,
                    line: self.line,
                });
            }
        }
    }

    fn track_bracket(&self, ch: char, brackets: &mut Vec<(char, usize)>) -> Result<(), LexError> {
        match ch {
            '(' | '[' | '{' => brackets.push((ch, self.line)),
            ')' | ']' | '}' => match brackets.pop() {
                Some((open, _)) if matching_close(open) == ch => {}
                Some((open, _)) => {
                    return Err(LexError::MismatchedBracket {
                        found: ch,
                        expected: Some(matching_close(open)),
                        line: self.line,
                    });
                }
                None => {
                    return Err(LexError::MismatchedBracket {
                        found: ch,
                        expected: None,
                        line: self.line,
                    });
                }
            },
            _ => {}
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.code[self.cursor..];
        let skipped = rest.len() - rest.trim_start().len();
        self.move_to(self.cursor + skipped);
    }

    /// Emits text from the cursor to `end`; empty spans are dropped.
    fn push_text(&mut self, end: usize) {
        if end > self.cursor {
            self.push(TokenKind::Text, end);
        }
    }

    /// Emits the span from the cursor to `end` as one token and moves past it.
    fn push(&mut self, kind: TokenKind, end: usize) {
        let value = &self.code[self.cursor..end];
        self.tokens
            .push(Token::new(kind, value, self.cursor, self.line));
        self.move_to(end);
    }

    fn move_to(&mut self, pos: usize) {
        self.line += self.code.as_bytes()[self.cursor..pos]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.cursor = pos;
    }
}

/// Byte offsets of every `{{`, `{%` and `{#`, in order.
fn find_tag_starts(code: &str) -> Vec<usize> {
    let bytes = code.as_bytes();
    code.match_indices('{')
        .map(|(i, _)| i)
        .filter(|&i| matches!(bytes.get(i + 1), Some(b'{' | b'%' | b'#')))
        .collect()
}

fn closer_of(opener: &str) -> &'static str {
    match opener {
        "{#" => COMMENT_TAG[1],
        "{%" => BLOCK_TAG[1],
        _ => VALUE_TAG[1],
    }
}

/// Matches `\s*word\s*%}` at `pos`, returning the offset just past `%}`.
fn match_tag_word(code: &str, pos: usize, word: &str) -> Option<usize> {
    let rest = &code[pos..];
    let after_ws = rest.trim_start();
    let after_word = after_ws.strip_prefix(word)?;
    let tail = after_word.trim_start().strip_prefix(BLOCK_TAG[1])?;
    Some(code.len() - tail.len())
}

/// A `}` that closes an open `{` is punctuation, not the start of `}}`.
fn closes_brace(closer: &str, brackets: &[(char, usize)]) -> bool {
    closer.starts_with('}') && matches!(brackets.last(), Some(('{', _)))
}

fn check_brackets(brackets: &[(char, usize)]) -> Result<(), LexError> {
    match brackets.last() {
        Some(&(bracket, line)) => Err(LexError::UnclosedBracket { bracket, line }),
        None => Ok(()),
    }
}

fn matching_close(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Length of a dotted name such as `user.profile.name`.
fn name_len(rest: &str) -> usize {
    let mut len = segment_len(rest);
    while rest[len..].starts_with('.') {
        let next = segment_len(&rest[len + 1..]);
        if next == 0 {
            break;
        }
        len += 1 + next;
    }
    len
}

fn segment_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if is_name_start(c) => {}
        _ => return 0,
    }
    s.char_indices()
        .skip(1)
        .find(|(_, c)| !is_name_char(*c))
        .map_or(s.len(), |(i, _)| i)
}

/// Length of `digits[.digits][(e|E)[+-]digits]`.
fn number_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        bytes
            .get(from..)
            .map_or(0, |b| b.iter().take_while(|c| c.is_ascii_digit()).count())
    };

    let mut len = digits(0);
    if bytes.get(len) == Some(&b'.') {
        let frac = digits(len + 1);
        if frac > 0 {
            len += 1 + frac;
        }
    }
    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let mut exp = len + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let n = digits(exp);
        if n > 0 {
            len = exp + n;
        }
    }
    len
}

/// Length of a quoted string including both quotes, or `None` if unterminated.
fn string_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let quote = bytes[0];
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
