//! RFC 5228 tokenizer.
//!
//! Produces position-annotated tokens from script text. Strings come out
//! fully unescaped; multi-line `text:` literals are collapsed into ordinary
//! string tokens with dot-stuffing undone.

use crate::diag::Location;

/// A lexical token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Command or test name.
    Identifier(String),
    /// `:tag` (stored without the colon).
    Tag(String),
    /// Number, K/M/G multipliers already applied.
    Number(u64),
    /// Quoted or multi-line string, unescaped.
    Str(String),
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    Semicolon,
    Comma,
    Eof,
}

impl Token {
    /// Short description for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => format!("identifier '{name}'"),
            Self::Tag(name) => format!("tag ':{name}'"),
            Self::Number(n) => format!("number {n}"),
            Self::Str(_) => "string".to_string(),
            Self::LeftBracket => "'['".to_string(),
            Self::RightBracket => "']'".to_string(),
            Self::LeftBrace => "'{'".to_string(),
            Self::RightBrace => "'}'".to_string(),
            Self::LeftParen => "'('".to_string(),
            Self::RightParen => "')'".to_string(),
            Self::Semicolon => "';'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Eof => "end of script".to_string(),
        }
    }
}

/// Fatal lexical error. The lexer does not recover; the parser reports the
/// diagnostic and aborts the statement.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub location: Location,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn error(&self, location: Location, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            location,
        }
    }

    /// Skip whitespace and comments. Bracket comments nest.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    let mut depth = 1usize;
                    loop {
                        match self.peek() {
                            None => {
                                return Err(
                                    self.error(start, "unterminated bracket comment")
                                );
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(b'/') if self.peek_at(1) == Some(b'*') => {
                                self.bump();
                                self.bump();
                                depth += 1;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<(Token, Location), LexError> {
        self.skip_trivia()?;
        let location = self.location();

        let Some(b) = self.peek() else {
            return Ok((Token::Eof, location));
        };

        let token = match b {
            b'[' => {
                self.bump();
                Token::LeftBracket
            }
            b']' => {
                self.bump();
                Token::RightBracket
            }
            b'{' => {
                self.bump();
                Token::LeftBrace
            }
            b'}' => {
                self.bump();
                Token::RightBrace
            }
            b'(' => {
                self.bump();
                Token::LeftParen
            }
            b')' => {
                self.bump();
                Token::RightParen
            }
            b';' => {
                self.bump();
                Token::Semicolon
            }
            b',' => {
                self.bump();
                Token::Comma
            }
            b'"' => Token::Str(self.lex_quoted(location)?),
            b':' => {
                self.bump();
                let name = self.lex_identifier_body();
                if name.is_empty() {
                    return Err(self.error(location, "':' must be followed by a tag name"));
                }
                Token::Tag(name)
            }
            b'0'..=b'9' => Token::Number(self.lex_number(location)?),
            _ if is_identifier_start(b) => {
                let name = self.lex_identifier_body();
                // `text:` introduces a multi-line string literal.
                if name.eq_ignore_ascii_case("text") && self.peek() == Some(b':') {
                    self.bump();
                    Token::Str(self.lex_multiline(location)?)
                } else {
                    Token::Identifier(name)
                }
            }
            _ => {
                self.bump();
                return Err(self.error(
                    location,
                    format!("unexpected character '{}'", b as char),
                ));
            }
        };

        Ok((token, location))
    }

    fn lex_identifier_body(&mut self) -> String {
        let mut name = String::new();
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
                name.push(b as char);
            } else {
                break;
            }
        }
        name
    }

    fn lex_number(&mut self, start: Location) -> Result<u64, LexError> {
        let mut value: u64 = 0;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.bump();
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u64::from(b - b'0')))
                    .ok_or_else(|| self.error(start, "number too large"))?;
            } else {
                break;
            }
        }
        let multiplier = match self.peek() {
            Some(b'k' | b'K') => Some(1u64 << 10),
            Some(b'm' | b'M') => Some(1u64 << 20),
            Some(b'g' | b'G') => Some(1u64 << 30),
            _ => None,
        };
        if let Some(mult) = multiplier {
            self.bump();
            value = value
                .checked_mul(mult)
                .ok_or_else(|| self.error(start, "number too large"))?;
        }
        Ok(value)
    }

    fn lex_quoted(&mut self, start: Location) -> Result<String, LexError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(start, "unterminated string")),
                Some(b'"') => return Ok(value),
                Some(b'\\') => match self.bump() {
                    None => return Err(self.error(start, "unterminated string")),
                    // RFC 5228: a backslash yields the escaped character,
                    // whatever it is.
                    Some(escaped) => value.push(escaped as char),
                },
                Some(b) => value.push(b as char),
            }
        }
    }

    /// `text:` literal: everything up to a line holding a single `.`,
    /// with leading `..` collapsed to `.`.
    fn lex_multiline(&mut self, start: Location) -> Result<String, LexError> {
        // Rest of the `text:` line is whitespace or a hash comment.
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'\n') => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    return Err(self.error(start, "invalid character after 'text:'"));
                }
                None => return Err(self.error(start, "unterminated multi-line string")),
            }
        }

        let mut value = String::new();
        loop {
            // Examine one full line.
            let mut line = String::new();
            let mut saw_newline = false;
            while let Some(b) = self.peek() {
                self.bump();
                if b == b'\n' {
                    saw_newline = true;
                    break;
                }
                if b != b'\r' {
                    line.push(b as char);
                }
            }
            if line == "." {
                return Ok(value);
            }
            if !saw_newline {
                return Err(self.error(start, "unterminated multi-line string"));
            }
            if let Some(stripped) = line.strip_prefix("..") {
                value.push('.');
                value.push_str(stripped);
            } else {
                value.push_str(&line);
            }
            value.push('\n');
        }
    }
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}
