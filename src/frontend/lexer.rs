//! Lexer for the C-family host language.
//!
//! Preprocessor lines other than `#pragma` are skipped whole. A `#pragma`
//! line is delivered as `Hash`, the words of the line, then `Eod` at the
//! terminating newline. A backslash-newline continues the line.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{LexerError, LexerErrorKind};
use crate::utils::location::{SourceLocation, Span};
use std::iter::Peekable;
use std::str::Chars;
use unicode_xid::UnicodeXID;

/// A lexer for tokenizing source code.
pub struct Lexer<'a> {
    /// The source text
    source: &'a str,
    /// Character iterator
    chars: Peekable<Chars<'a>>,
    /// Current byte offset
    offset: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start of current token
    token_start: SourceLocation,
    /// Only whitespace seen since the last newline
    at_line_start: bool,
    /// Inside a `#pragma` line
    in_directive: bool,
    /// Whether we've hit EOF
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            at_line_start: true,
            in_directive: false,
            at_eof: false,
        }
    }

    /// Get the current location.
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    /// Mark the start of a new token.
    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
    }

    /// Create a span from token start to current location.
    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    /// Peek at the current character without consuming it.
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Peek at the next character (one ahead).
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    /// Consume and return the current character.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the current character if it matches.
    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a backslash-newline pair if one starts here.
    fn skip_line_continuation(&mut self) -> bool {
        let rest = &self.source[self.offset..];
        if rest.starts_with("\\\n") {
            self.advance();
            self.advance();
            true
        } else if rest.starts_with("\\\r\n") {
            self.advance();
            self.advance();
            self.advance();
            true
        } else {
            false
        }
    }

    /// Whether the `#` at the current position introduces a `#pragma`.
    fn directive_is_pragma(&self) -> bool {
        let rest = self.source[self.offset + 1..].trim_start_matches([' ', '\t']);
        match rest.strip_prefix("pragma") {
            Some(after) => !after.starts_with(|c: char| c.is_xid_continue()),
            None => false,
        }
    }

    /// Skip a non-pragma preprocessor line, including continuations.
    fn skip_directive_line(&mut self) {
        loop {
            if self.skip_line_continuation() {
                continue;
            }
            match self.advance() {
                Some('\n') | None => break,
                Some(_) => {}
            }
        }
        self.at_line_start = true;
    }

    /// Skip whitespace, comments and non-pragma preprocessor lines.
    fn skip_whitespace(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    if self.in_directive {
                        break;
                    }
                    self.advance();
                    self.at_line_start = true;
                }
                Some('\\') => {
                    if !self.skip_line_continuation() {
                        break;
                    }
                }
                Some('#') if self.at_line_start && !self.in_directive => {
                    if self.directive_is_pragma() {
                        break;
                    }
                    self.skip_directive_line();
                }
                Some('/') => {
                    if self.peek_next() == Some('/') {
                        // Line comment
                        while self.peek().is_some() && self.peek() != Some('\n') {
                            self.advance();
                        }
                    } else if self.peek_next() == Some('*') {
                        self.mark_token_start();
                        self.advance(); // /
                        self.advance(); // *
                        loop {
                            match self.advance() {
                                Some('*') if self.peek() == Some('/') => {
                                    self.advance();
                                    break;
                                }
                                Some(_) => {}
                                None => {
                                    return Err(self.make_error(
                                        "Unterminated block comment",
                                        LexerErrorKind::UnterminatedComment,
                                    ));
                                }
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Create a token with the given kind.
    fn make_token(&self, kind: TokenKind) -> Token {
        let span = self.make_span();
        let lexeme = self.source[span.start_offset..span.end_offset].to_string();
        Token::new(kind, span, lexeme)
    }

    /// Create an error.
    fn make_error(&self, message: &str, kind: LexerErrorKind) -> LexerError {
        LexerError {
            message: message.to_string(),
            span: self.make_span(),
            kind,
        }
    }

    fn eat_digits(&mut self, radix: u32) {
        while self.peek().map(|c| c.is_digit(radix)).unwrap_or(false) {
            self.advance();
        }
    }

    /// Scan a number literal. The first character has been consumed.
    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let mut is_float = first == '.';

        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            if !self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                return Err(self.make_error("Invalid hexadecimal literal", LexerErrorKind::InvalidNumber));
            }
            self.eat_digits(16);
        } else {
            self.eat_digits(10);

            // Check for decimal point
            if !is_float && self.peek() == Some('.') {
                is_float = true;
                self.advance();
                self.eat_digits(10);
            }

            // Check for exponent (can appear with or without decimal point)
            if self.peek() == Some('e') || self.peek() == Some('E') {
                is_float = true;
                self.advance();
                if self.peek() == Some('+') || self.peek() == Some('-') {
                    self.advance();
                }
                if !self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    return Err(self.make_error(
                        "Invalid floating-point exponent",
                        LexerErrorKind::InvalidNumber,
                    ));
                }
                self.eat_digits(10);
            }
        }

        // Suffixes
        while let Some(c) = self.peek() {
            match c {
                'u' | 'U' | 'l' | 'L' => {
                    self.advance();
                }
                'f' | 'F' if is_float => {
                    self.advance();
                }
                _ => break,
            }
        }

        if self.peek().map(|c| c.is_xid_continue()).unwrap_or(false) {
            self.advance();
            return Err(self.make_error("Invalid suffix on number literal", LexerErrorKind::InvalidNumber));
        }

        if is_float {
            Ok(self.make_token(TokenKind::Float))
        } else {
            Ok(self.make_token(TokenKind::Integer))
        }
    }

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self) -> Token {
        while self.peek().map(|c| c.is_xid_continue() || c == '_').unwrap_or(false) {
            self.advance();
        }

        let span = self.make_span();
        let lexeme = &self.source[span.start_offset..span.end_offset];

        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, span, lexeme.to_string())
    }

    /// Scan a string or character literal; the opening quote is consumed.
    fn scan_quoted(&mut self, quote: char) -> Result<Token, LexerError> {
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n' | 't' | 'r' | '\\' | '"' | '\'' | '0' | 'a' | 'b' | 'f' | 'v' | '?') => {}
                    Some(c) => {
                        return Err(self.make_error(
                            &format!("Invalid escape sequence: \\{}", c),
                            LexerErrorKind::InvalidEscape,
                        ));
                    }
                    None => {
                        return Err(self.make_error(
                            "Unterminated literal",
                            LexerErrorKind::UnterminatedString,
                        ));
                    }
                },
                Some('\n') | None => {
                    return Err(self.make_error(
                        "Unterminated literal",
                        LexerErrorKind::UnterminatedString,
                    ));
                }
                Some(_) => {}
            }
        }

        if quote == '"' {
            Ok(self.make_token(TokenKind::String))
        } else {
            Ok(self.make_token(TokenKind::Char))
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace()?;
        self.mark_token_start();

        if self.in_directive && self.peek() == Some('\n') {
            self.advance();
            self.in_directive = false;
            self.at_line_start = true;
            return Ok(self.make_token(TokenKind::Eod));
        }

        let line_start = self.at_line_start;
        self.at_line_start = false;

        let c = match self.advance() {
            Some(c) => c,
            None => {
                if self.in_directive {
                    self.in_directive = false;
                    return Ok(self.make_token(TokenKind::Eod));
                }
                self.at_eof = true;
                return Ok(self.make_token(TokenKind::Eof));
            }
        };

        match c {
            '#' if line_start && !self.in_directive => {
                self.in_directive = true;
                Ok(self.make_token(TokenKind::Hash))
            }

            // Single-character tokens
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '[' => Ok(self.make_token(TokenKind::LeftBracket)),
            ']' => Ok(self.make_token(TokenKind::RightBracket)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            ':' => Ok(self.make_token(TokenKind::Colon)),
            '?' => Ok(self.make_token(TokenKind::Question)),
            '~' => Ok(self.make_token(TokenKind::Tilde)),
            '^' => Ok(self.make_token(TokenKind::Caret)),
            '.' => {
                if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.scan_number('.')
                } else {
                    Ok(self.make_token(TokenKind::Dot))
                }
            }

            // Operators (potentially multi-character)
            '+' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::PlusEqual))
                } else if self.match_char('+') {
                    Ok(self.make_token(TokenKind::PlusPlus))
                } else {
                    Ok(self.make_token(TokenKind::Plus))
                }
            }
            '-' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::MinusEqual))
                } else if self.match_char('-') {
                    Ok(self.make_token(TokenKind::MinusMinus))
                } else if self.match_char('>') {
                    Ok(self.make_token(TokenKind::Arrow))
                } else {
                    Ok(self.make_token(TokenKind::Minus))
                }
            }
            '*' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::StarEqual))
                } else {
                    Ok(self.make_token(TokenKind::Star))
                }
            }
            '/' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::SlashEqual))
                } else {
                    Ok(self.make_token(TokenKind::Slash))
                }
            }
            '%' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::PercentEqual))
                } else {
                    Ok(self.make_token(TokenKind::Percent))
                }
            }
            '=' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::EqualEqual))
                } else {
                    Ok(self.make_token(TokenKind::Equal))
                }
            }
            '!' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::BangEqual))
                } else {
                    Ok(self.make_token(TokenKind::Bang))
                }
            }
            '<' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::LessEqual))
                } else if self.match_char('<') {
                    Ok(self.make_token(TokenKind::LessLess))
                } else {
                    Ok(self.make_token(TokenKind::Less))
                }
            }
            '>' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::GreaterEqual))
                } else if self.match_char('>') {
                    Ok(self.make_token(TokenKind::GreaterGreater))
                } else {
                    Ok(self.make_token(TokenKind::Greater))
                }
            }
            '&' => {
                if self.match_char('&') {
                    Ok(self.make_token(TokenKind::AmpAmp))
                } else {
                    Ok(self.make_token(TokenKind::Amp))
                }
            }
            '|' => {
                if self.match_char('|') {
                    Ok(self.make_token(TokenKind::PipePipe))
                } else {
                    Ok(self.make_token(TokenKind::Pipe))
                }
            }

            // String and character literals
            '"' | '\'' => self.scan_quoted(c),

            // Numbers
            c if c.is_ascii_digit() => self.scan_number(c),

            // Identifiers and keywords
            c if c.is_xid_start() || c == '_' => Ok(self.scan_identifier()),

            // Unknown character
            _ => Err(self.make_error(
                &format!("Unexpected character: '{}'", c),
                LexerErrorKind::UnexpectedChar,
            )),
        }
    }

    /// Check if we've reached EOF.
    pub fn is_at_end(&self) -> bool {
        self.at_eof
    }

    /// Collect all tokens into a vector.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_eof {
            None
        } else {
            let result = self.next_token();
            if result.as_ref().map(|t| t.is_eof()).unwrap_or(true) {
                self.at_eof = true;
            }
            Some(result)
        }
    }
}
