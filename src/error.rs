//! Errors shared by every stage of the front end.
//!
//! The front end stops at the first problem it finds, so a compilation
//! produces at most one [`CompileError`]: a [`Position`] and an [`ErrorKind`].

use core::fmt;

/// A 0-indexed `(line, column)` pair. Columns count bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line: {} Column: {}", self.line, self.column)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not a real failure: the lexer ran out of input.
    #[error("unexpected end of input")]
    Eof,
    #[error("the input contains an invalid character")]
    InvalidInput,
    #[error("identifiers must not start with a digit")]
    InvalidIdentifier,
    #[error("decimal integers must not have a leading zero")]
    FrontZero,
    #[error("a hex integer needs digits after '0x'")]
    InvalidHexInteger,

    #[error("need an identifier here")]
    NeedIdentifier,
    #[error("need a type specifier here")]
    NeedTypeSpecifier,
    #[error("missing ';'")]
    NoSemicolon,
    #[error("need '(' here")]
    NeedLeftBracket,
    #[error("need ')' here")]
    NeedRightBracket,
    #[error("need '{{' here")]
    NeedLeftBrace,
    #[error("need '}}' here")]
    NeedRightBrace,
    #[error("not a valid statement")]
    InvalidStatement,
    #[error("the expression is incomplete")]
    IncompleteExpression,

    #[error("the name has already been declared in this scope")]
    DuplicateDeclaration,
    #[error("a constant needs an initializer")]
    ConstantNeedValue,
    #[error("'void' cannot be used in a variable declaration")]
    VoidInVar,
    #[error("'const' cannot be applied to 'void'")]
    ConstVoid,
    #[error("'const' cannot be applied to a function")]
    ConstFunc,
    #[error("declarations must come before statements")]
    InvalidVariableDeclaration,
    #[error("unimplemented feature, e.g. 'char', 'double', 'for', 'do', 'switch', arrays or structs")]
    Unimplemented,

    #[error("the name must be declared before it is used")]
    NotDeclared,
    #[error("the name does not refer to a function")]
    NotAFunction,
    #[error("the name does not refer to a variable")]
    NotAVariable,
    #[error("cannot assign to a constant")]
    AssignToConstant,
    #[error("only variables can be assigned")]
    InvalidAssignment,
    #[error("the variable is used before being initialized")]
    NotInitialized,
    #[error("a 'void' function has no value to use in an expression")]
    ExpressionNeedValue,
    #[error("wrong number of arguments in the call")]
    ArgumentCountMismatch,
    #[error("the return statement does not match the function's return type")]
    InvalidReturn,
    #[error("not every path of a non-void function returns a value")]
    MissingReturn,
    #[error("the program has no 'main' function")]
    NeedMain,
    #[error("'main' must not take parameters")]
    MainWithParameters,
    #[error("the source nests too deeply")]
    NestingTooDeep,
}

/// The first error of a compilation and the position where it was detected.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("{position} Error: {kind}")]
pub struct CompileError {
    pub position: Position,
    pub kind: ErrorKind,
}

impl CompileError {
    pub const fn new(position: Position, kind: ErrorKind) -> Self {
        Self { position, kind }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == ErrorKind::Eof
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::{CompileError, ErrorKind, Position};
    use assert2::check;

    #[test]
    fn renders_in_the_error_text_format() {
        let err = CompileError::new(Position::new(3, 14), ErrorKind::NoSemicolon);
        check!(err.to_string() == "Line: 3 Column: 14 Error: missing ';'");
    }

    #[test]
    fn braces_are_escaped() {
        check!(ErrorKind::NeedLeftBrace.to_string() == "need '{' here");
        check!(ErrorKind::NeedRightBrace.to_string() == "need '}' here");
    }
}
