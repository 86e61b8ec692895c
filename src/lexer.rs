//! Hand-written DFA lexer for C0.
//!
//! The lexer reads one character per step from a [`SourceBuffer`] and
//! switches on its current state; every accepting state peeks one character
//! past its token and pushes it back before returning.
//!
//! Two quirks are deliberate: a literal that runs straight into a letter its
//! radix can't hold becomes an identifier (`123abc`, `0xFFg`), and decimal
//! literals never start with `0` unless they are exactly `0`.
use core::fmt;
use std::{collections::HashMap, sync::LazyLock};

use crate::error::{CompileError, ErrorKind, Position};

pub mod source;
pub mod stream;

use source::SourceBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    UnsignedInteger,
    Identifier,

    // keywords
    Int,
    Void,
    Char,
    Double,
    Const,
    If,
    Else,
    While,
    Return,
    Print,
    Scan,
    Struct,
    Do,
    For,
    Break,
    Continue,
    /// `switch`, `case` and `default`
    Labeled,

    PlusSign,
    MinusSign,
    MultiplicationSign,
    DivisionSign,
    EqualSign,
    EqualEqual,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Exclamation,
    Semicolon,
    Comma,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    LeftSquareBracket,
    RightSquareBracket,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::UnsignedInteger => "UnsignedInteger",
            Self::Identifier => "Identifier",
            Self::Int => "Int",
            Self::Void => "Void",
            Self::Char => "Char",
            Self::Double => "Double",
            Self::Const => "Const",
            Self::If => "If",
            Self::Else => "Else",
            Self::While => "While",
            Self::Return => "Return",
            Self::Print => "Print",
            Self::Scan => "Scan",
            Self::Struct => "Struct",
            Self::Do => "Do",
            Self::For => "For",
            Self::Break => "Break",
            Self::Continue => "Continue",
            Self::Labeled => "Labeled",
            Self::PlusSign => "PlusSign",
            Self::MinusSign => "MinusSign",
            Self::MultiplicationSign => "MultiplicationSign",
            Self::DivisionSign => "DivisionSign",
            Self::EqualSign => "EqualSign",
            Self::EqualEqual => "EqualEqual",
            Self::NotEqual => "NotEqual",
            Self::LessThan => "LessThan",
            Self::LessOrEqual => "LessOrEqual",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::Exclamation => "Exclamation",
            Self::Semicolon => "Semicolon",
            Self::Comma => "Comma",
            Self::LeftBracket => "LeftBracket",
            Self::RightBracket => "RightBracket",
            Self::LeftBrace => "LeftBrace",
            Self::RightBrace => "RightBrace",
            Self::LeftSquareBracket => "LeftSquareBracket",
            Self::RightSquareBracket => "RightSquareBracket",
        }
    }

    /// `int`, `void`, `char` or `double`
    pub fn is_type_specifier(self) -> bool {
        matches!(self, Self::Int | Self::Void | Self::Char | Self::Double)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenValue {
    Integer(i32),
    Text(Box<str>),
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Tokens own their text, so the token list outlives the source buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub start: Position,
    pub end: Position,
}

impl Token {
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Text(text) => Some(text),
            TokenValue::Integer(_) => None,
        }
    }

    pub fn integer(&self) -> Option<i32> {
        match self.value {
            TokenValue::Integer(value) => Some(value),
            TokenValue::Text(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Type: {} Value: {}",
            self.start, self.kind, self.value
        )
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    static KEYWORDS: LazyLock<HashMap<&str, TokenKind>> = LazyLock::new(|| {
        let mut keywords = HashMap::new();
        keywords.insert("int", TokenKind::Int);
        keywords.insert("void", TokenKind::Void);
        keywords.insert("char", TokenKind::Char);
        keywords.insert("double", TokenKind::Double);
        keywords.insert("const", TokenKind::Const);
        keywords.insert("if", TokenKind::If);
        keywords.insert("else", TokenKind::Else);
        keywords.insert("while", TokenKind::While);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("print", TokenKind::Print);
        keywords.insert("scan", TokenKind::Scan);
        keywords.insert("struct", TokenKind::Struct);
        keywords.insert("do", TokenKind::Do);
        keywords.insert("for", TokenKind::For);
        keywords.insert("break", TokenKind::Break);
        keywords.insert("continue", TokenKind::Continue);
        keywords.insert("switch", TokenKind::Labeled);
        keywords.insert("case", TokenKind::Labeled);
        keywords.insert("default", TokenKind::Labeled);
        keywords
    });

    KEYWORDS.get(text).copied()
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, 9..=13 | 32)
}

fn is_printable(ch: u8) -> bool {
    matches!(ch, 32..=126)
}

fn is_hex_letter(ch: u8) -> bool {
    matches!(ch, b'a'..=b'f' | b'A'..=b'F')
}

// Values wrap to 32 bits rather than failing: `0xFFFFFFFF` lexes as -1.
fn fold_digits(digits: &str, radix: u32) -> i32 {
    digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0u32, |acc, digit| acc.wrapping_mul(radix).wrapping_add(digit)) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Zero,
    /// read `0x` or `0X`
    HexPrefix,
    HexDigits,
    Decimal,
    Identifier,
    Equal,
    Less,
    Greater,
    Exclamation,
    /// a complete one-character token, waiting to push back its lookahead
    Single(TokenKind),
}

pub struct Lexer {
    source: SourceBuffer,
    failed: bool,
}

impl Lexer {
    pub fn new(source: impl AsRef<[u8]>) -> Self {
        Self {
            source: SourceBuffer::new(source),
            failed: false,
        }
    }

    /// Lexes the next token. Running out of input is reported as
    /// [`ErrorKind::Eof`], which callers treat as "no more tokens".
    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        let mut buffer = String::new();
        let mut start = self.source.position();
        let mut state = State::Initial;

        loop {
            let current = self.source.next_char();
            state = match state {
                State::Initial => {
                    let Some(ch) = current else {
                        return Err(CompileError::new(self.source.position(), ErrorKind::Eof));
                    };
                    if is_whitespace(ch) {
                        continue;
                    }
                    start = self.source.previous_position();
                    let next = match ch {
                        _ if !is_printable(ch) => None,
                        b'0' => Some(State::Zero),
                        b'1'..=b'9' => Some(State::Decimal),
                        c if c.is_ascii_alphabetic() => Some(State::Identifier),
                        b'=' => Some(State::Equal),
                        b'<' => Some(State::Less),
                        b'>' => Some(State::Greater),
                        b'!' => Some(State::Exclamation),
                        b'+' => Some(State::Single(TokenKind::PlusSign)),
                        b'-' => Some(State::Single(TokenKind::MinusSign)),
                        b'*' => Some(State::Single(TokenKind::MultiplicationSign)),
                        b'/' => Some(State::Single(TokenKind::DivisionSign)),
                        b';' => Some(State::Single(TokenKind::Semicolon)),
                        b',' => Some(State::Single(TokenKind::Comma)),
                        b'(' => Some(State::Single(TokenKind::LeftBracket)),
                        b')' => Some(State::Single(TokenKind::RightBracket)),
                        b'{' => Some(State::Single(TokenKind::LeftBrace)),
                        b'}' => Some(State::Single(TokenKind::RightBrace)),
                        b'[' => Some(State::Single(TokenKind::LeftSquareBracket)),
                        b']' => Some(State::Single(TokenKind::RightSquareBracket)),
                        _ => None,
                    };
                    let Some(next) = next else {
                        self.source.unread();
                        return Err(CompileError::new(start, ErrorKind::InvalidInput));
                    };
                    buffer.push(char::from(ch));
                    next
                }
                State::Zero => match current {
                    Some(c @ (b'x' | b'X')) => {
                        buffer.push(char::from(c));
                        State::HexPrefix
                    }
                    Some(c) if c.is_ascii_digit() => {
                        return Err(CompileError::new(start, ErrorKind::FrontZero));
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        buffer.push(char::from(c));
                        State::Identifier
                    }
                    _ => {
                        let value = TokenValue::Integer(0);
                        return Ok(self.accept(current, TokenKind::UnsignedInteger, value, start));
                    }
                },
                State::HexPrefix => match current {
                    Some(c) if c.is_ascii_digit() || is_hex_letter(c) => {
                        buffer.push(char::from(c));
                        State::HexDigits
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        buffer.push(char::from(c));
                        State::Identifier
                    }
                    _ => return Err(CompileError::new(start, ErrorKind::InvalidHexInteger)),
                },
                State::HexDigits => match current {
                    Some(c) if c.is_ascii_digit() || is_hex_letter(c) => {
                        buffer.push(char::from(c));
                        State::HexDigits
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        buffer.push(char::from(c));
                        State::Identifier
                    }
                    _ => {
                        let value = TokenValue::Integer(fold_digits(&buffer[2..], 16));
                        return Ok(self.accept(current, TokenKind::UnsignedInteger, value, start));
                    }
                },
                State::Decimal => match current {
                    Some(c) if c.is_ascii_digit() => {
                        buffer.push(char::from(c));
                        State::Decimal
                    }
                    Some(c) if c.is_ascii_alphabetic() => {
                        buffer.push(char::from(c));
                        State::Identifier
                    }
                    _ => {
                        let value = TokenValue::Integer(fold_digits(&buffer, 10));
                        return Ok(self.accept(current, TokenKind::UnsignedInteger, value, start));
                    }
                },
                State::Identifier => match current {
                    Some(c) if c.is_ascii_alphanumeric() => {
                        buffer.push(char::from(c));
                        State::Identifier
                    }
                    _ => {
                        let kind = keyword(&buffer).unwrap_or(TokenKind::Identifier);
                        let value = TokenValue::Text(buffer.into_boxed_str());
                        return Ok(self.accept(current, kind, value, start));
                    }
                },
                State::Equal => {
                    return Ok(self.two_char(current, TokenKind::EqualSign, TokenKind::EqualEqual, buffer, start))
                }
                State::Less => {
                    return Ok(self.two_char(current, TokenKind::LessThan, TokenKind::LessOrEqual, buffer, start))
                }
                State::Greater => {
                    return Ok(self.two_char(
                        current,
                        TokenKind::GreaterThan,
                        TokenKind::GreaterOrEqual,
                        buffer,
                        start,
                    ))
                }
                State::Exclamation => {
                    return Ok(self.two_char(current, TokenKind::Exclamation, TokenKind::NotEqual, buffer, start))
                }
                State::Single(kind) => {
                    let value = TokenValue::Text(buffer.into_boxed_str());
                    return Ok(self.accept(current, kind, value, start));
                }
            };
        }
    }

    /// Pushes back the lookahead character (if any) and builds the token.
    fn accept(&mut self, lookahead: Option<u8>, kind: TokenKind, value: TokenValue, start: Position) -> Token {
        if lookahead.is_some() {
            self.source.unread();
        }
        Token {
            kind,
            value,
            start,
            end: self.source.position(),
        }
    }

    /// `=`, `<`, `>` and `!` become their two-character form when followed by `=`.
    fn two_char(
        &mut self,
        lookahead: Option<u8>,
        single: TokenKind,
        double: TokenKind,
        mut buffer: String,
        start: Position,
    ) -> Token {
        if lookahead == Some(b'=') {
            buffer.push('=');
            let value = TokenValue::Text(buffer.into_boxed_str());
            return self.accept(None, double, value, start);
        }
        let value = TokenValue::Text(buffer.into_boxed_str());
        self.accept(lookahead, single, value, start)
    }
}

/// Yields tokens until the input runs out; stops after the first real error.
impl Iterator for Lexer {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token() {
            Ok(token) => Some(Ok(token)),
            Err(err) if err.is_eof() => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexer, Token, TokenKind, TokenValue};
    use crate::error::{CompileError, ErrorKind, Position};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    fn lex(src: &str) -> Vec<Result<Token, CompileError>> {
        Lexer::new(src).collect()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src)
            .into_iter()
            .map(|token| token.map(|t| t.kind))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn single_token(src: &str) -> Result<Token, CompileError> {
        let mut tokens = lex(src);
        assert!(tokens.len() == 1, "`{src}` lexed into {tokens:?}");
        tokens.remove(0)
    }

    #[derive(Debug, arbitrary::Arbitrary)]
    enum Literal {
        Decimal(u32),
        LowerHex(u32),
        UpperHex(u32),
    }

    impl Literal {
        fn value(&self) -> i32 {
            match *self {
                Self::Decimal(n) | Self::LowerHex(n) | Self::UpperHex(n) => n as i32,
            }
        }

        fn source(&self) -> String {
            match self {
                Self::Decimal(n) => format!("{n}"),
                Self::LowerHex(n) => format!("0x{n:x}"),
                Self::UpperHex(n) => format!("0X{n:X}"),
            }
        }
    }

    #[test]
    fn keywords_and_identifiers() {
        check!(
            kinds("int void char double const if else while return print scan")
                == [
                    TokenKind::Int,
                    TokenKind::Void,
                    TokenKind::Char,
                    TokenKind::Double,
                    TokenKind::Const,
                    TokenKind::If,
                    TokenKind::Else,
                    TokenKind::While,
                    TokenKind::Return,
                    TokenKind::Print,
                    TokenKind::Scan,
                ]
        );
        check!(
            kinds("struct do for break continue switch case default")
                == [
                    TokenKind::Struct,
                    TokenKind::Do,
                    TokenKind::For,
                    TokenKind::Break,
                    TokenKind::Continue,
                    TokenKind::Labeled,
                    TokenKind::Labeled,
                    TokenKind::Labeled,
                ]
        );
        check!(kinds("integer Int x1") == [TokenKind::Identifier; 3]);
    }

    #[test]
    fn operators_use_one_character_of_lookahead() {
        check!(
            kinds("= == != < <= > >= ! ==")
                == [
                    TokenKind::EqualSign,
                    TokenKind::EqualEqual,
                    TokenKind::NotEqual,
                    TokenKind::LessThan,
                    TokenKind::LessOrEqual,
                    TokenKind::GreaterThan,
                    TokenKind::GreaterOrEqual,
                    TokenKind::Exclamation,
                    TokenKind::EqualEqual,
                ]
        );
        check!(
            kinds("a<=b") == [TokenKind::Identifier, TokenKind::LessOrEqual, TokenKind::Identifier]
        );
        check!(kinds("===") == [TokenKind::EqualEqual, TokenKind::EqualSign]);
        check!(
            kinds("+-*/;,(){}[]")
                == [
                    TokenKind::PlusSign,
                    TokenKind::MinusSign,
                    TokenKind::MultiplicationSign,
                    TokenKind::DivisionSign,
                    TokenKind::Semicolon,
                    TokenKind::Comma,
                    TokenKind::LeftBracket,
                    TokenKind::RightBracket,
                    TokenKind::LeftBrace,
                    TokenKind::RightBrace,
                    TokenKind::LeftSquareBracket,
                    TokenKind::RightSquareBracket,
                ]
        );
    }

    #[test]
    fn positions() {
        let tokens = lex("int x\n  = 0x1F;")
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let spans = tokens.iter().map(|t| (t.start, t.end)).collect::<Vec<_>>();
        check!(
            spans
                == [
                    (Position::new(0, 0), Position::new(0, 3)),
                    (Position::new(0, 4), Position::new(0, 5)),
                    (Position::new(1, 2), Position::new(1, 3)),
                    (Position::new(1, 4), Position::new(1, 8)),
                    (Position::new(1, 8), Position::new(1, 9)),
                ]
        );
        check!(tokens[3].value == TokenValue::Integer(31));
    }

    #[test]
    fn token_list_format() {
        let_assert!(Ok(token) = single_token("\n   counter"));
        check!(token.to_string() == "Line: 1 Column: 3 Type: Identifier Value: counter");
        let_assert!(Ok(token) = single_token("0x10"));
        check!(token.to_string() == "Line: 0 Column: 0 Type: UnsignedInteger Value: 16");
        let_assert!(Ok(token) = single_token("<="));
        check!(token.to_string() == "Line: 0 Column: 0 Type: LessOrEqual Value: <=");
    }

    #[test]
    fn zero_alone_is_a_literal() {
        let_assert!(Ok(token) = single_token("0"));
        check!(token.kind == TokenKind::UnsignedInteger);
        check!(token.integer() == Some(0));
        check!(kinds("0;") == [TokenKind::UnsignedInteger, TokenKind::Semicolon]);
    }

    #[test]
    fn hex_prefix_needs_digits() {
        for src in ["0x", "0X", "0x;", "0x ", "  0x+1"] {
            let_assert!(Some(Err(err)) = lex(src).into_iter().next());
            check!(err.kind == ErrorKind::InvalidHexInteger, "{src}");
        }
        let_assert!(Some(Err(err)) = lex("  0x+1").into_iter().next());
        check!(err.position == Position::new(0, 2));
    }

    #[test]
    fn quirky_identifiers() {
        for src in ["123abc", "0xFFg", "0abc", "0xg", "0Xz1", "9x", "0x1fx"] {
            let_assert!(Ok(token) = single_token(src));
            check!(token.kind == TokenKind::Identifier, "{src}");
            check!(token.text() == Some(src));
        }
    }

    #[test]
    fn wrapping_values() {
        let_assert!(Ok(token) = single_token("0xFFFFFFFF"));
        check!(token.integer() == Some(-1));
        let_assert!(Ok(token) = single_token("2147483648"));
        check!(token.integer() == Some(i32::MIN));
    }

    #[test]
    fn invalid_characters() {
        for src in ["int x = 1 # 2;", "a\u{7f}", "é", "a_b", "\"s\""] {
            let tokens = lex(src);
            let_assert!(Some(Err(err)) = tokens.last());
            check!(err.kind == ErrorKind::InvalidInput, "{src}");
        }
        let_assert!(Some(Err(err)) = lex("ab  $").pop());
        check!(err.position == Position::new(0, 4));
    }

    #[test]
    fn iterator_stops_after_error() {
        let tokens = lex("a $ b");
        check!(tokens.len() == 2);
        check!(tokens[0].is_ok());
        check!(tokens[1].is_err());
    }

    #[test]
    fn whitespace_only_is_empty() {
        check!(lex(" \t\r\n\x0b\x0c \n").is_empty());
        check!(lex("").is_empty());
    }

    #[test]
    fn eof_is_reported_by_next_token() {
        let mut lexer = Lexer::new("  ");
        let_assert!(Err(err) = lexer.next_token());
        check!(err.is_eof());
    }

    #[test]
    fn literal_roundtrip() {
        arbtest(|u| {
            let literal = u.arbitrary::<Literal>()?;
            let src = literal.source();
            let_assert!(Ok(token) = single_token(&src));
            check!(token.kind == TokenKind::UnsignedInteger, "`{src}`");
            check!(token.integer() == Some(literal.value()), "`{src}` does not roundtrip");
            Ok(())
        });
    }

    #[test]
    fn leading_zero_is_always_rejected() {
        arbtest(|u| {
            let tail = u.arbitrary::<u32>()?;
            let src = format!("0{tail}");
            let_assert!(Some(Err(err)) = lex(&src).into_iter().next());
            check!(err.kind == ErrorKind::FrontZero, "`{src}`");
            check!(err.position == Position::new(0, 0));
            Ok(())
        });
    }

    #[test]
    fn digit_letter_adjacency_is_one_identifier() {
        arbtest(|u| {
            let literal = u.arbitrary::<Literal>()?;
            let mut src = literal.source();
            // letters past 'f' are never digits in either radix, but a bare
            // `0x` would start a hex prefix
            let letter = match u.int_in_range(b'g'..=b'z')? {
                b'x' if src == "0" => b'g',
                letter => letter,
            };
            src.push(char::from(letter));
            for _ in 0..u.int_in_range(0..=4)? {
                src.push(char::from(*u.choose(b"0123456789abcXYZ")?));
            }
            let_assert!(Ok(token) = single_token(&src));
            check!(token.kind == TokenKind::Identifier, "`{src}`");
            check!(token.text() == Some(src.as_str()));
            Ok(())
        });
    }
}
