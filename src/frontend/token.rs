//! Token types for the C-family host language.
//!
//! Besides ordinary C tokens the lexer produces two directive markers:
//! [`TokenKind::Hash`] opens a `#pragma` line and [`TokenKind::Eod`] closes it.

use crate::utils::location::Span;
use std::fmt;

/// A token in the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text)
    pub lexeme: String,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Check if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }

    /// Identifiers and keywords both spell words; pragma syntax treats them alike.
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Identifier || self.kind.is_keyword()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.lexeme)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer,
    /// Floating-point literal
    Float,
    /// String literal
    String,
    /// Character literal
    Char,

    // Identifiers
    /// Identifier (variable, function name, etc.)
    Identifier,

    // Statement keywords
    For,
    While,
    Do,
    If,
    Else,
    Return,
    Break,
    Continue,

    // Declaration keywords
    Const,
    Static,
    Unsigned,
    Signed,
    Struct,
    Class,
    True,
    False,

    // Type keywords
    Void,
    Bool,
    CharType,
    Short,
    Int,
    Long,
    FloatType,
    Double,

    // Arithmetic operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,

    // Comparison operators
    /// `==`
    EqualEqual,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,

    // Assignment operators
    /// `=`
    Equal,
    /// `+=`
    PlusEqual,
    /// `-=`
    MinusEqual,
    /// `*=`
    StarEqual,
    /// `/=`
    SlashEqual,
    /// `%=`
    PercentEqual,

    // Logical and bitwise operators
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `!`
    Bang,
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `~`
    Tilde,
    /// `<<`
    LessLess,
    /// `>>`
    GreaterGreater,

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `.`
    Dot,
    /// `->`
    Arrow,

    // Directives
    /// `#` starting a pragma line
    Hash,
    /// End of a directive line
    Eod,

    // Special
    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if this is a keyword.
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            For | While | Do | If | Else | Return | Break | Continue |
            Const | Static | Unsigned | Signed | Struct | Class | True | False |
            Void | Bool | CharType | Short | Int | Long | FloatType | Double
        )
    }

    /// Check if this keyword can start a type specifier.
    pub fn is_type_specifier(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Const | Static | Unsigned | Signed | Struct | Class |
            Void | Bool | CharType | Short | Int | Long | FloatType | Double
        )
    }

    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        use TokenKind::*;
        matches!(self, Equal | PlusEqual | MinusEqual | StarEqual | SlashEqual | PercentEqual)
    }

    /// Get the keyword for a string, if it is a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "for" => Some(TokenKind::For),
            "while" => Some(TokenKind::While),
            "do" => Some(TokenKind::Do),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "return" => Some(TokenKind::Return),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "const" => Some(TokenKind::Const),
            "static" => Some(TokenKind::Static),
            "unsigned" => Some(TokenKind::Unsigned),
            "signed" => Some(TokenKind::Signed),
            "struct" => Some(TokenKind::Struct),
            "class" => Some(TokenKind::Class),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "void" => Some(TokenKind::Void),
            "bool" | "_Bool" => Some(TokenKind::Bool),
            "char" => Some(TokenKind::CharType),
            "short" => Some(TokenKind::Short),
            "int" => Some(TokenKind::Int),
            "long" => Some(TokenKind::Long),
            "float" => Some(TokenKind::FloatType),
            "double" => Some(TokenKind::Double),
            _ => None,
        }
    }

    /// Get a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Integer => "integer",
            Float => "float",
            String => "string",
            Char => "character",
            Identifier => "identifier",
            For => "for",
            While => "while",
            Do => "do",
            If => "if",
            Else => "else",
            Return => "return",
            Break => "break",
            Continue => "continue",
            Const => "const",
            Static => "static",
            Unsigned => "unsigned",
            Signed => "signed",
            Struct => "struct",
            Class => "class",
            True => "true",
            False => "false",
            Void => "void",
            Bool => "bool",
            CharType => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            FloatType => "float",
            Double => "double",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            PlusPlus => "++",
            MinusMinus => "--",
            EqualEqual => "==",
            BangEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Equal => "=",
            PlusEqual => "+=",
            MinusEqual => "-=",
            StarEqual => "*=",
            SlashEqual => "/=",
            PercentEqual => "%=",
            AmpAmp => "&&",
            PipePipe => "||",
            Bang => "!",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            LessLess => "<<",
            GreaterGreater => ">>",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftBrace => "{",
            RightBrace => "}",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Question => "?",
            Dot => ".",
            Arrow => "->",
            Hash => "#",
            Eod => "end of directive",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("for"), Some(TokenKind::For));
        assert_eq!(TokenKind::keyword("_Bool"), Some(TokenKind::Bool));
        assert_eq!(TokenKind::keyword("unroll"), None);
    }

    #[test]
    fn test_is_keyword() {
        assert!(TokenKind::Do.is_keyword());
        assert!(!TokenKind::Hash.is_keyword());
        assert!(TokenKind::Unsigned.is_type_specifier());
        assert!(!TokenKind::Return.is_type_specifier());
    }

    #[test]
    fn test_is_word() {
        let span = Span::dummy();
        assert!(Token::new(TokenKind::Identifier, span, "full".into()).is_word());
        assert!(Token::new(TokenKind::For, span, "for".into()).is_word());
        assert!(!Token::new(TokenKind::LeftParen, span, "(".into()).is_word());
    }
}
