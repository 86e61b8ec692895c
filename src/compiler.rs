//! Compile C0 source into stack-machine bytecode.
//!
//! There is no syntax tree: the [`Analyser`] is a recursive-descent parser
//! that checks each production and emits its code as soon as it has been
//! read, so a single pass over the tokens yields the finished [`Program`].
//!
//! For example:
//!
//! ```c
//! int twice(int n) {
//!     return n * 2;
//! }
//! void main() {
//!     print(twice(21));
//! }
//! ```
//!
//! compiles to
//!
//! ```text
//! .constants:
//! 0 S "twice"
//! 1 S "main"
//! .start:
//! .functions:
//! 0 0 1 1
//! 1 1 0 1
//! .F0:
//! 0 loada 0, 0
//! 1 iload
//! 2 ipush 2
//! 3 imul
//! 4 iret
//! .F1:
//! 0 ipush 21
//! 1 call 0
//! 2 iprint
//! 3 printl
//! 4 ret
//! ```
//!
//! Control flow is compiled with backpatching: a conditional jump is emitted
//! with an unknown target and rewritten once the end of the guarded code is
//! known. Conditions jump on the *negated* relation, skipping the guarded
//! statement when the source relation is false.

pub mod bytecode;
pub mod environment;
pub mod returns;

use lasso::{Rodeo, Spur};

use crate::{
    error::{CompileError, CompileResult, ErrorKind, Position},
    lexer::{stream::TokenStream, Token, TokenKind},
};
use bytecode::{address, Chunk, Function, Instruction, Opcode, Program};
use environment::{Binding, ReturnType, SymbolTable, Variable};
use returns::ReturnTree;

/// An interned name and where it was written.
type Name = (Spur, Position);

/// How deeply statements and parenthesized expressions may nest.
pub const MAX_NESTING: usize = 200;

/// The compilation context: owns every piece of state for one compilation.
pub struct Analyser {
    tokens: TokenStream,
    names: Rodeo,
    symbols: SymbolTable,
    returns: ReturnTree,
    program: Program,
    /// return type of the function being compiled, `None` at the global level
    current: Option<ReturnType>,
    depth: usize,
}

impl Analyser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: TokenStream::new(tokens),
            names: Rodeo::new(),
            symbols: SymbolTable::new(),
            returns: ReturnTree::new(),
            program: Program::default(),
            current: None,
            depth: 0,
        }
    }

    /// Runs the analysis to completion, stopping at the first error.
    pub fn analyse(mut self) -> CompileResult<Program> {
        self.global_items()?;

        let has_main = self
            .names
            .get("main")
            .and_then(|main| self.symbols.lookup(main))
            .is_some_and(|binding| matches!(binding, Binding::Function(_)));
        if !has_main {
            return Err(self.tokens.error_here(ErrorKind::NeedMain));
        }

        log::debug!(
            "compiled {} functions, {} start instructions",
            self.symbols.functions().len(),
            self.program.start.len()
        );
        Ok(self.program)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.peek().map(|token| token.kind)
    }

    /// The buffer code goes to: the start section at the global level, the
    /// current function's body otherwise.
    fn code(&mut self) -> &mut Chunk {
        match self.program.functions.last_mut() {
            Some(function) if self.current.is_some() => &mut function.code,
            _ => &mut self.program.start,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code().emit(instruction)
    }

    fn emit_op(&mut self, op: Opcode) -> usize {
        self.emit(Instruction::new(op))
    }

    fn emit_address(&mut self, var: &Variable) {
        let (level_diff, offset) = self.symbols.address(var);
        self.emit(Instruction::with_xy(Opcode::LoadA, level_diff, offset));
    }

    /// Runs `body` inside a fresh scope level. The level is closed again on
    /// every path, including errors; returns the number of released slots.
    fn with_scope<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<(T, usize)> {
        self.symbols.enter_scope();
        let result = body(self);
        let released = self.symbols.leave_scope();
        result.map(|value| (value, released))
    }

    /// Runs a production that may recurse into itself.
    fn nested<T>(&mut self, body: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        if self.depth == MAX_NESTING {
            return Err(self.tokens.error_here(ErrorKind::NestingTooDeep));
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    // program ::= {var-decl} {func-def}
    fn global_items(&mut self) -> CompileResult<()> {
        let mut in_functions = false;
        while !self.tokens.is_exhausted() {
            let constant = self.tokens.eat(TokenKind::Const).is_some();
            let type_position = self.tokens.position();
            let ty = self.type_specifier()?;
            if constant && ty == ReturnType::Void {
                return Err(CompileError::new(type_position, ErrorKind::ConstVoid));
            }
            let name = self.identifier()?;

            if self.peek_kind() == Some(TokenKind::LeftBracket) {
                if constant {
                    return Err(self.tokens.error_here(ErrorKind::ConstFunc));
                }
                self.function_definition(ty, name)?;
                in_functions = true;
            } else if in_functions {
                return Err(self.tokens.error_here(ErrorKind::NeedLeftBracket));
            } else if ty == ReturnType::Void {
                return Err(CompileError::new(type_position, ErrorKind::VoidInVar));
            } else {
                self.declarators(constant, name)?;
            }
        }
        Ok(())
    }

    /// `int` or `void`; the other type names are recognized and refused.
    fn type_specifier(&mut self) -> CompileResult<ReturnType> {
        let ty = match self.peek_kind() {
            Some(TokenKind::Int) => ReturnType::Int,
            Some(TokenKind::Void) => ReturnType::Void,
            Some(TokenKind::Char | TokenKind::Double | TokenKind::Struct) => {
                return Err(self.tokens.error_here(ErrorKind::Unimplemented))
            }
            _ => return Err(self.tokens.error_here(ErrorKind::NeedTypeSpecifier)),
        };
        self.tokens.next();
        Ok(ty)
    }

    fn identifier(&mut self) -> CompileResult<Name> {
        let token = self
            .tokens
            .expect(TokenKind::Identifier, ErrorKind::NeedIdentifier)?;
        let position = token.start;
        let text = token.text().unwrap_or_default();
        // `123abc` lexes as an identifier but can't name anything
        if text.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(CompileError::new(position, ErrorKind::InvalidIdentifier));
        }
        Ok((self.names.get_or_intern(text), position))
    }

    fn starts_declaration(&self) -> bool {
        self.peek_kind()
            .is_some_and(|kind| kind == TokenKind::Const || kind.is_type_specifier())
    }

    // var-decl ::= ["const"] type ident ["=" expr] {"," ident ["=" expr]} ";"
    fn local_declaration(&mut self) -> CompileResult<()> {
        let constant = self.tokens.eat(TokenKind::Const).is_some();
        let type_position = self.tokens.position();
        match self.type_specifier()? {
            ReturnType::Void if constant => Err(CompileError::new(type_position, ErrorKind::ConstVoid)),
            ReturnType::Void => Err(CompileError::new(type_position, ErrorKind::VoidInVar)),
            ReturnType::Int => {
                let name = self.identifier()?;
                self.declarators(constant, name)
            }
        }
    }

    /// The declarator list of a declaration whose first name has been read.
    fn declarators(&mut self, constant: bool, first: Name) -> CompileResult<()> {
        let mut name = first;
        loop {
            let (spur, position) = name;
            if self.symbols.is_declared_at_current_level(spur) {
                return Err(CompileError::new(position, ErrorKind::DuplicateDeclaration));
            }

            // the initial value (or a fresh slot) becomes the variable's storage
            let initialized = if self.tokens.eat(TokenKind::EqualSign).is_some() {
                self.expression()?;
                true
            } else if constant {
                return Err(self.tokens.error_here(ErrorKind::ConstantNeedValue));
            } else {
                self.emit(Instruction::with_x(Opcode::SNew, 1));
                false
            };
            self.symbols
                .declare_variable(spur, constant, initialized)
                .map_err(|kind| CompileError::new(position, kind))?;

            if self.tokens.eat(TokenKind::Comma).is_none() {
                break;
            }
            name = self.identifier()?;
        }
        self.tokens.expect(TokenKind::Semicolon, ErrorKind::NoSemicolon)?;
        Ok(())
    }

    // func-def ::= type ident "(" [param-list] ")" "{" {var-decl} stmt-seq "}"
    fn function_definition(&mut self, returns: ReturnType, (name, position): Name) -> CompileResult<()> {
        let ordinal = self
            .symbols
            .declare_function(name, returns)
            .map_err(|kind| CompileError::new(position, kind))?;
        let name_index = self.program.add_constant(self.names.resolve(&name));
        self.program.functions.push(Function::new(name_index));

        self.current = Some(returns);
        self.returns.reset();
        let result = self.with_scope(|this| {
            this.parameters(ordinal)?;
            this.function_body(returns)
        });
        self.current = None;
        result?;

        // `main` is called with an empty argument list
        let params = self.program.functions[ordinal].param_count;
        if params > 0 && self.names.resolve(&name) == "main" {
            return Err(CompileError::new(position, ErrorKind::MainWithParameters));
        }

        log::debug!(
            "compiled `{}` as .F{ordinal} ({} instructions)",
            self.names.resolve(&name),
            self.program.functions[ordinal].code.len()
        );
        Ok(())
    }

    /// `()` and `(void)` declare no parameters.
    fn parameters(&mut self, ordinal: usize) -> CompileResult<()> {
        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        if self.tokens.eat(TokenKind::RightBracket).is_some() {
            return Ok(());
        }
        let void_position = self.tokens.position();
        if self.tokens.eat(TokenKind::Void).is_some() {
            if self.tokens.eat(TokenKind::RightBracket).is_some() {
                return Ok(());
            }
            return Err(CompileError::new(void_position, ErrorKind::VoidInVar));
        }

        loop {
            let constant = self.tokens.eat(TokenKind::Const).is_some();
            let type_position = self.tokens.position();
            match self.type_specifier()? {
                ReturnType::Void if constant => {
                    return Err(CompileError::new(type_position, ErrorKind::ConstVoid))
                }
                ReturnType::Void => return Err(CompileError::new(type_position, ErrorKind::VoidInVar)),
                ReturnType::Int => {}
            }
            let (name, position) = self.identifier()?;
            self.symbols
                .add_parameter(ordinal, name, constant)
                .map_err(|kind| CompileError::new(position, kind))?;
            self.program.functions[ordinal].param_count += 1;

            if self.tokens.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;
        Ok(())
    }

    /// The body shares the parameters' scope level.
    fn function_body(&mut self, returns: ReturnType) -> CompileResult<()> {
        self.tokens
            .expect(TokenKind::LeftBrace, ErrorKind::NeedLeftBrace)?;
        self.block_items()?;
        match returns {
            ReturnType::Int if !self.returns.is_complete() => {
                return Err(self.tokens.error_here(ErrorKind::MissingReturn));
            }
            ReturnType::Int => {}
            ReturnType::Void => {
                self.emit_op(Opcode::Ret);
            }
        }
        self.tokens
            .expect(TokenKind::RightBrace, ErrorKind::NeedRightBrace)?;
        Ok(())
    }

    /// `{var-decl} stmt-seq` up to (not including) the closing `}`.
    fn block_items(&mut self) -> CompileResult<()> {
        while self.starts_declaration() {
            self.local_declaration()?;
        }
        loop {
            match self.peek_kind() {
                None => return Err(self.tokens.error_here(ErrorKind::NeedRightBrace)),
                Some(TokenKind::RightBrace) => return Ok(()),
                Some(_) => self.statement()?,
            }
        }
    }

    fn block(&mut self) -> CompileResult<()> {
        self.tokens
            .expect(TokenKind::LeftBrace, ErrorKind::NeedLeftBrace)?;
        let ((), released) = self.with_scope(|this| {
            this.block_items()?;
            this.tokens
                .expect(TokenKind::RightBrace, ErrorKind::NeedRightBrace)?;
            Ok(())
        })?;
        if released > 0 {
            self.emit(Instruction::with_x(Opcode::PopN, address(released)));
        }
        Ok(())
    }

    fn statement(&mut self) -> CompileResult<()> {
        self.nested(Self::dispatch_statement)
    }

    fn dispatch_statement(&mut self) -> CompileResult<()> {
        match self.peek_kind() {
            Some(TokenKind::LeftBrace) => self.block(),
            Some(TokenKind::If) => self.if_statement(),
            Some(TokenKind::While) => self.while_statement(),
            Some(TokenKind::Return) => self.return_statement(),
            Some(TokenKind::Print) => self.print_statement(),
            Some(TokenKind::Scan) => self.scan_statement(),
            Some(TokenKind::Semicolon) => {
                self.tokens.next();
                self.emit_op(Opcode::Nop);
                Ok(())
            }
            Some(TokenKind::Identifier) => self.assignment_or_call(),
            Some(
                TokenKind::For
                | TokenKind::Do
                | TokenKind::Labeled
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Struct
                | TokenKind::LeftSquareBracket
                | TokenKind::RightSquareBracket,
            ) => Err(self.tokens.error_here(ErrorKind::Unimplemented)),
            _ if self.starts_declaration() => {
                Err(self.tokens.error_here(ErrorKind::InvalidVariableDeclaration))
            }
            _ => Err(self.tokens.error_here(ErrorKind::InvalidStatement)),
        }
    }

    fn if_statement(&mut self) -> CompileResult<()> {
        self.tokens.next();
        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        let skip_then = self.condition()?;
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;

        self.returns.enter_then();
        self.statement()?;

        if self.tokens.eat(TokenKind::Else).is_some() {
            // a `then` branch that always returns never reaches the `else`
            let skip_else = (!self.returns.always_returns()).then(|| self.code().emit_jump(Opcode::Jmp));
            self.code().patch_jump_here(skip_then);
            self.returns.move_to_else();
            self.statement()?;
            if let Some(skip_else) = skip_else {
                self.code().patch_jump_here(skip_else);
            }
        } else {
            self.code().patch_jump_here(skip_then);
        }
        self.returns.leave_if();
        Ok(())
    }

    fn while_statement(&mut self) -> CompileResult<()> {
        self.tokens.next();
        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        let start = self.code().len();
        let exit = self.condition()?;
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;

        self.returns.enter_loop();
        self.statement()?;
        self.returns.leave_loop();

        self.emit(Instruction::with_x(Opcode::Jmp, address(start)));
        self.code().patch_jump_here(exit);
        Ok(())
    }

    /// `expr [relop expr]`, compiled to a jump taken when the condition is
    /// false. Returns the jump's index for backpatching.
    fn condition(&mut self) -> CompileResult<usize> {
        self.expression()?;
        let jump = match self.peek_kind() {
            Some(TokenKind::LessThan) => Opcode::Jge,
            Some(TokenKind::LessOrEqual) => Opcode::Jg,
            Some(TokenKind::GreaterThan) => Opcode::Jle,
            Some(TokenKind::GreaterOrEqual) => Opcode::Jl,
            Some(TokenKind::EqualEqual) => Opcode::Jne,
            Some(TokenKind::NotEqual) => Opcode::Je,
            // a bare value is false when it is zero
            _ => return Ok(self.code().emit_jump(Opcode::Je)),
        };
        self.tokens.next();
        self.expression()?;
        self.emit_op(Opcode::ICmp);
        Ok(self.code().emit_jump(jump))
    }

    fn return_statement(&mut self) -> CompileResult<()> {
        self.tokens.next();
        let Some(returns) = self.current else {
            unreachable!("statements are only parsed inside functions");
        };
        let bare = self.peek_kind() == Some(TokenKind::Semicolon);
        match (returns, bare) {
            (ReturnType::Int, false) => {
                self.expression()?;
                self.tokens
                    .expect(TokenKind::Semicolon, ErrorKind::NoSemicolon)?;
                self.emit_op(Opcode::IRet);
            }
            (ReturnType::Void, true) => {
                self.tokens.next();
                self.emit_op(Opcode::Ret);
            }
            _ => return Err(self.tokens.error_here(ErrorKind::InvalidReturn)),
        }
        self.returns.mark_return();
        Ok(())
    }

    fn print_statement(&mut self) -> CompileResult<()> {
        self.tokens.next();
        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        if self.peek_kind() != Some(TokenKind::RightBracket) {
            loop {
                self.expression()?;
                self.emit_op(Opcode::IPrint);
                if self.tokens.eat(TokenKind::Comma).is_none() {
                    break;
                }
                // items are separated by a space
                self.emit(Instruction::with_x(Opcode::BiPush, 32));
                self.emit_op(Opcode::CPrint);
            }
        }
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;
        self.tokens
            .expect(TokenKind::Semicolon, ErrorKind::NoSemicolon)?;
        self.emit_op(Opcode::PrintL);
        Ok(())
    }

    fn scan_statement(&mut self) -> CompileResult<()> {
        self.tokens.next();
        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        let name = self.identifier()?;
        let target = self.assignable(name)?;
        self.emit_address(&target);
        self.emit_op(Opcode::IScan);
        self.emit_op(Opcode::IStore);
        self.symbols.mark_initialized(name.0);
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;
        self.tokens
            .expect(TokenKind::Semicolon, ErrorKind::NoSemicolon)?;
        Ok(())
    }

    fn assignment_or_call(&mut self) -> CompileResult<()> {
        let name = self.identifier()?;
        match self.peek_kind() {
            Some(TokenKind::EqualSign) => {
                let target = self.assignable(name)?;
                self.tokens.next();
                self.emit_address(&target);
                self.expression()?;
                self.emit_op(Opcode::IStore);
                self.symbols.mark_initialized(name.0);
            }
            Some(TokenKind::LeftBracket) => {
                // the statement discards whatever the call returns
                if self.call(name, false)? == ReturnType::Int {
                    self.emit_op(Opcode::Pop);
                }
            }
            _ => return Err(self.tokens.error_here(ErrorKind::InvalidStatement)),
        }
        self.tokens
            .expect(TokenKind::Semicolon, ErrorKind::NoSemicolon)?;
        Ok(())
    }

    /// Resolves the target of an assignment or `scan`.
    fn assignable(&self, (name, position): Name) -> CompileResult<Variable> {
        match self.symbols.lookup(name) {
            None => Err(CompileError::new(position, ErrorKind::NotDeclared)),
            Some(Binding::Function(_)) => Err(CompileError::new(position, ErrorKind::InvalidAssignment)),
            Some(Binding::Local(var) | Binding::Global(var)) if var.constant => {
                Err(CompileError::new(position, ErrorKind::AssignToConstant))
            }
            Some(Binding::Local(var) | Binding::Global(var)) => Ok(var),
        }
    }

    /// Compiles `name(args)` with the cursor on `(`. When the call's value is
    /// used, the callee must return one.
    fn call(&mut self, (name, position): Name, need_value: bool) -> CompileResult<ReturnType> {
        let ordinal = match self.symbols.lookup(name) {
            None => return Err(CompileError::new(position, ErrorKind::NotDeclared)),
            Some(Binding::Function(ordinal)) => ordinal,
            Some(_) => return Err(CompileError::new(position, ErrorKind::NotAFunction)),
        };
        let function = self.symbols.function(ordinal);
        let (returns, expected) = (function.returns, function.params.len());
        if need_value && returns == ReturnType::Void {
            return Err(CompileError::new(position, ErrorKind::ExpressionNeedValue));
        }

        self.tokens
            .expect(TokenKind::LeftBracket, ErrorKind::NeedLeftBracket)?;
        let mut count = 0;
        if self.peek_kind() != Some(TokenKind::RightBracket) {
            loop {
                self.nested(Self::expression)?;
                count += 1;
                if self.tokens.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        if count != expected {
            return Err(self.tokens.error_here(ErrorKind::ArgumentCountMismatch));
        }
        self.tokens
            .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;

        self.emit(Instruction::with_x(Opcode::Call, address(ordinal)));
        Ok(returns)
    }

    // expr ::= term {("+"|"-") term}
    fn expression(&mut self) -> CompileResult<()> {
        self.term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::PlusSign) => Opcode::IAdd,
                Some(TokenKind::MinusSign) => Opcode::ISub,
                _ => return Ok(()),
            };
            self.tokens.next();
            self.term()?;
            self.emit_op(op);
        }
    }

    // term ::= unary {("*"|"/") unary}
    fn term(&mut self) -> CompileResult<()> {
        self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::MultiplicationSign) => Opcode::IMul,
                Some(TokenKind::DivisionSign) => Opcode::IDiv,
                _ => return Ok(()),
            };
            self.tokens.next();
            self.unary()?;
            self.emit_op(op);
        }
    }

    // unary ::= ["+"|"-"] primary
    fn unary(&mut self) -> CompileResult<()> {
        match self.peek_kind() {
            Some(TokenKind::MinusSign) => {
                self.tokens.next();
                self.primary()?;
                self.emit_op(Opcode::INeg);
            }
            Some(TokenKind::PlusSign) => {
                self.tokens.next();
                self.primary()?;
            }
            _ => self.primary()?,
        }
        Ok(())
    }

    // primary ::= "(" expr ")" | ident | ident "(" [args] ")" | integer-literal
    fn primary(&mut self) -> CompileResult<()> {
        match self.peek_kind() {
            Some(TokenKind::LeftBracket) => {
                self.tokens.next();
                self.nested(Self::expression)?;
                self.tokens
                    .expect(TokenKind::RightBracket, ErrorKind::NeedRightBracket)?;
            }
            Some(TokenKind::UnsignedInteger) => {
                let value = self.tokens.next().and_then(Token::integer).unwrap_or_default();
                self.emit(Instruction::with_x(Opcode::IPush, value));
            }
            Some(TokenKind::Identifier) => {
                let name = self.identifier()?;
                if self.peek_kind() == Some(TokenKind::LeftBracket) {
                    self.call(name, true)?;
                } else {
                    self.load(name)?;
                }
            }
            _ => return Err(self.tokens.error_here(ErrorKind::IncompleteExpression)),
        }
        Ok(())
    }

    fn load(&mut self, (name, position): Name) -> CompileResult<()> {
        let var = match self.symbols.lookup(name) {
            None => return Err(CompileError::new(position, ErrorKind::NotDeclared)),
            Some(Binding::Function(_)) => return Err(CompileError::new(position, ErrorKind::NotAVariable)),
            Some(Binding::Local(var) | Binding::Global(var)) => var,
        };
        if !var.initialized {
            return Err(CompileError::new(position, ErrorKind::NotInitialized));
        }
        self.emit_address(&var);
        self.emit_op(Opcode::ILoad);
        Ok(())
    }
}
