//! Materialized token list with a cursor and one token of pushback.

use crate::error::{CompileError, ErrorKind, Position};

use super::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// Returns the token under the cursor and advances past it.
    pub fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token)
    }

    /// Steps the cursor back by one token.
    ///
    /// # Panics
    /// When the cursor is at the first token; the analyser never needs more
    /// than one token of lookahead, so this is a bug in the caller.
    pub fn unread(&mut self) {
        assert!(self.cursor > 0, "token stream unread at the beginning");
        self.cursor -= 1;
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    /// Consumes the next token only when it has the given kind.
    pub fn eat(&mut self, kind: TokenKind) -> Option<&Token> {
        if self.peek().is_some_and(|token| token.kind == kind) {
            self.next()
        } else {
            None
        }
    }

    /// Consumes a token of `kind` or fails with `error` at the offending token.
    pub fn expect(&mut self, kind: TokenKind, error: ErrorKind) -> Result<&Token, CompileError> {
        if self.peek().is_some_and(|token| token.kind == kind) {
            let index = self.take_index();
            Ok(&self.tokens[index])
        } else {
            Err(self.error_here(error))
        }
    }

    /// Where a problem with the upcoming token is reported: its start, or the
    /// end of the last token once the input is exhausted.
    pub fn position(&self) -> Position {
        match self.peek() {
            Some(token) => token.start,
            None => self.tokens.last().map(|token| token.end).unwrap_or_default(),
        }
    }

    pub fn error_here(&self, kind: ErrorKind) -> CompileError {
        CompileError::new(self.position(), kind)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn take_index(&mut self) -> usize {
        self.cursor += 1;
        self.cursor - 1
    }
}
