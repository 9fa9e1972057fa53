pub mod token;

use crate::keywords::keyword;
use crate::scanner::token::{Token, TokenType};
use crate::span::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {}] {message}", .span.line)]
pub struct ScanError {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub tokens: Vec<Token>,
    pub errors: Vec<ScanError>,
}

impl ScanResult {
    pub fn tokens_without_comments(&self) -> Vec<Token> {
        self.tokens
            .iter()
            .filter(|t| !matches!(t.token_type, TokenType::Comment))
            .cloned()
            .collect()
    }
}

/// Turns source text into tokens on demand.
///
/// The scanner is an [`Iterator`] over `Result<Token, ScanError>`: a lexical
/// error is yielded in place and scanning carries on with the next character,
/// so one pass surfaces every bad character. The sequence always finishes
/// with a single `Eof` token. [`Scanner::reset`] rewinds to the first
/// character.
#[derive(Debug, Clone)]
pub struct Scanner {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: usize,
    line_start: usize,
    finished: bool,
}

impl Scanner {
    pub fn new(source: impl Into<String>) -> Self {
        Scanner {
            source: source.into().chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            finished: false,
        }
    }

    pub fn reset(&mut self) {
        self.start = 0;
        self.current = 0;
        self.line = 1;
        self.line_start = 0;
        self.finished = false;
    }

    /// Drains the scanner, keeping tokens and errors apart.
    pub fn scan_tokens(self) -> ScanResult {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        for item in self {
            match item {
                Ok(token) => tokens.push(token),
                Err(error) => errors.push(error),
            }
        }
        ScanResult { tokens, errors }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn scan_token(&mut self) -> Option<Result<Token, ScanError>> {
        let c = self.advance()?;
        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            ',' => TokenType::Comma,
            '.' => TokenType::Dot,
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            ';' => TokenType::Semicolon,
            '*' => TokenType::Star,

            // One or two character tokens
            '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.either('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.either('=', TokenType::GreaterEqual, TokenType::Greater),

            '/' => {
                if self.match_char('/') {
                    // Comment goes until end of line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.current += 1;
                    }
                    TokenType::Comment
                } else if self.match_char('*') {
                    return Some(self.block_comment());
                } else {
                    TokenType::Slash
                }
            }

            ' ' | '\r' | '\t' => return None,

            '\n' => {
                self.newline();
                return None;
            }

            '"' => return Some(self.string()),

            c if c.is_ascii_digit() => return Some(Ok(self.number())),

            c if is_alpha(c) => return Some(Ok(self.identifier())),

            _ => return Some(Err(self.error(format!("Unexpected character '{}'.", c)))),
        };

        Some(Ok(self.make_token(token_type)))
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.current).copied()?;
        self.current += 1;
        Some(ch)
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == expected && !self.is_at_end() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn either(&mut self, next: char, matched: TokenType, otherwise: TokenType) -> TokenType {
        if self.match_char(next) {
            matched
        } else {
            otherwise
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.current;
    }

    // Block comments nest: `/* a /* b */ c */` is one comment.
    fn block_comment(&mut self) -> Result<Token, ScanError> {
        let opening = self.span();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                None => {
                    return Err(ScanError {
                        span: opening,
                        message: "Unterminated block comment.".to_string(),
                    });
                }
                Some('\n') => self.newline(),
                Some('*') if self.match_char('/') => depth -= 1,
                Some('/') if self.match_char('*') => depth += 1,
                Some(_) => {}
            }
        }

        Ok(Token::new(TokenType::Comment, self.lexeme(), opening))
    }

    fn string(&mut self) -> Result<Token, ScanError> {
        // the string may span lines, but the token is reported where it opens
        let opening = self.span();

        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.current += 1;
                self.newline();
            } else {
                self.current += 1;
            }
        }

        if self.is_at_end() {
            return Err(ScanError {
                span: opening,
                message: "Unterminated string.".to_string(),
            });
        }

        // closing quote
        self.current += 1;

        // the literal value excludes the surrounding quotes
        let value: String = self.source[self.start + 1..self.current - 1]
            .iter()
            .collect();
        Ok(Token::new(TokenType::String(value), self.lexeme(), opening))
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }

        // A trailing '.' with no digit after it is left for the Dot token.
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.current += 1;
            while self.peek().is_ascii_digit() {
                self.current += 1;
            }
        }

        let text = self.lexeme();
        // digits with at most one interior '.' always parse
        let value = text.parse::<f64>().unwrap_or_default();
        self.make_token(TokenType::Number(value))
    }

    fn identifier(&mut self) -> Token {
        while is_alpha_numeric(self.peek()) {
            self.current += 1;
        }

        let token_type = keyword(&self.lexeme()).unwrap_or(TokenType::Identifier);
        self.make_token(token_type)
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.start.saturating_sub(self.line_start) + 1,
            length: (self.current - self.start).max(1),
        }
    }

    fn make_token(&self, token_type: TokenType) -> Token {
        Token::new(token_type, self.lexeme(), self.span())
    }

    fn error(&self, message: impl Into<String>) -> ScanError {
        ScanError {
            span: self.span(),
            message: message.into(),
        }
    }
}

impl Iterator for Scanner {
    type Item = Result<Token, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.is_at_end() {
            self.start = self.current;
            if let Some(item) = self.scan_token() {
                return Some(item);
            }
        }

        if self.finished {
            return None;
        }
        self.finished = true;
        self.start = self.current;
        let eof_span = Span {
            line: self.line,
            col: self.current - self.line_start + 1,
            length: 0,
        };
        Some(Ok(Token::new(TokenType::Eof, "", eof_span)))
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}
