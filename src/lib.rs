pub mod compiler;
pub mod error;
pub mod lexer;
pub mod runtime;

pub use compiler::{
    bytecode::{Instruction, Opcode, Program},
    Analyser,
};
pub use error::{CompileError, CompileResult, ErrorKind, Position};
pub use lexer::{Lexer, Token, TokenKind, TokenValue};
pub use runtime::{fuel::Fuel, Machine, RuntimeError, Status};

/// Lexes the whole source up front.
pub fn tokenize(source: impl AsRef<[u8]>) -> CompileResult<Vec<Token>> {
    let tokens = Lexer::new(source).collect::<CompileResult<Vec<_>>>()?;
    log::debug!("tokenized {} tokens", tokens.len());
    Ok(tokens)
}

/// Compiles C0 source into a [`Program`], reporting the first error found.
pub fn compile(source: impl AsRef<[u8]>) -> CompileResult<Program> {
    Analyser::new(tokenize(source)?).analyse()
}
