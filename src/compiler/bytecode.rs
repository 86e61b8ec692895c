//! The instruction set and the program the analyser assembles.
//!
//! A [`Program`] keeps its three sections in separate buffers and only
//! concatenates them when rendered:
//!
//! ```text
//! .constants:
//! 0 S "main"
//! .start:
//! .functions:
//! 0 0 0 1
//! .F0:
//! 0 ipush 1
//! 1 loada 0, 0
//! 2 iload
//! 3 iprint
//! 4 printl
//! 5 ipush 0
//! 6 iret
//! ```
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Pop,
    ILoad,
    IStore,
    IAdd,
    ISub,
    IMul,
    IDiv,
    INeg,
    ICmp,
    Ret,
    IRet,
    IPrint,
    CPrint,
    PrintL,
    IScan,

    BiPush,
    IPush,
    PopN,
    SNew,
    Jmp,
    Je,
    Jne,
    Jl,
    Jge,
    Jg,
    Jle,
    Call,

    /// `loada <level-diff>, <offset>`
    LoadA,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::ILoad => "iload",
            Self::IStore => "istore",
            Self::IAdd => "iadd",
            Self::ISub => "isub",
            Self::IMul => "imul",
            Self::IDiv => "idiv",
            Self::INeg => "ineg",
            Self::ICmp => "icmp",
            Self::Ret => "ret",
            Self::IRet => "iret",
            Self::IPrint => "iprint",
            Self::CPrint => "cprint",
            Self::PrintL => "printl",
            Self::IScan => "iscan",
            Self::BiPush => "bipush",
            Self::IPush => "ipush",
            Self::PopN => "popn",
            Self::SNew => "snew",
            Self::Jmp => "jmp",
            Self::Je => "je",
            Self::Jne => "jne",
            Self::Jl => "jl",
            Self::Jge => "jge",
            Self::Jg => "jg",
            Self::Jle => "jle",
            Self::Call => "call",
            Self::LoadA => "loada",
        }
    }

    /// Number of operands the instruction carries.
    pub fn arity(self) -> usize {
        match self {
            Self::Nop
            | Self::Pop
            | Self::ILoad
            | Self::IStore
            | Self::IAdd
            | Self::ISub
            | Self::IMul
            | Self::IDiv
            | Self::INeg
            | Self::ICmp
            | Self::Ret
            | Self::IRet
            | Self::IPrint
            | Self::CPrint
            | Self::PrintL
            | Self::IScan => 0,
            Self::BiPush
            | Self::IPush
            | Self::PopN
            | Self::SNew
            | Self::Jmp
            | Self::Je
            | Self::Jne
            | Self::Jl
            | Self::Jge
            | Self::Jg
            | Self::Jle
            | Self::Call => 1,
            Self::LoadA => 2,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jmp | Self::Je | Self::Jne | Self::Jl | Self::Jge | Self::Jg | Self::Jle
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operands beyond the opcode's arity are ignored (and kept at 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub op: Opcode,
    pub x: i32,
    pub y: i32,
}

impl Instruction {
    pub const fn new(op: Opcode) -> Self {
        Self { op, x: 0, y: 0 }
    }

    pub const fn with_x(op: Opcode, x: i32) -> Self {
        Self { op, x, y: 0 }
    }

    pub const fn with_xy(op: Opcode, x: i32, y: i32) -> Self {
        Self { op, x, y }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op.arity() {
            0 => write!(f, "{}", self.op),
            1 => write!(f, "{} {}", self.op, self.x),
            _ => write!(f, "{} {}, {}", self.op, self.x, self.y),
        }
    }
}

/// Converts a buffer index into a jump operand.
///
/// # Panics
/// If the index does not fit an operand, which no real program reaches.
pub fn address(index: usize) -> i32 {
    i32::try_from(index).unwrap_or_else(|_| panic!("instruction index {index} exceeds the operand range"))
}

/// An instruction buffer with backpatching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    code: Vec<Instruction>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// Emits a jump whose target is patched later.
    pub fn emit_jump(&mut self, op: Opcode) -> usize {
        assert!(op.is_jump(), "`{op}` is not a jump");
        self.emit(Instruction::with_x(op, -1))
    }

    /// Points the jump at `at` to `target`.
    ///
    /// # Panics
    /// If the instruction at `at` is not a jump.
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        let instruction = &mut self.code[at];
        assert!(
            instruction.op.is_jump(),
            "cannot backpatch `{}` at {at}",
            instruction.op
        );
        instruction.x = address(target);
    }

    /// Points the jump at `at` to the next instruction to be emitted.
    pub fn patch_jump_here(&mut self, at: usize) {
        self.patch_jump(at, self.code.len());
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.code.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.code.iter().enumerate() {
            writeln!(f, "{index} {instruction}")?;
        }
        Ok(())
    }
}

/// A constant-pool entry. C0 only ever stores function names here, so the
/// type tag is always `S`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub text: Box<str>,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S \"{}\"", self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// index of the function's name in the constant pool
    pub name_index: usize,
    pub param_count: usize,
    pub code: Chunk,
}

impl Function {
    pub fn new(name_index: usize) -> Self {
        Self {
            name_index,
            param_count: 0,
            code: Chunk::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub constants: Vec<Constant>,
    /// global initialization code
    pub start: Chunk,
    /// in declaration order, so a function's ordinal is its index here
    pub functions: Vec<Function>,
}

impl Program {
    /// Adds a string constant and returns its index in the pool.
    pub fn add_constant(&mut self, text: &str) -> usize {
        self.constants.push(Constant { text: text.into() });
        self.constants.len() - 1
    }

    pub fn function_name(&self, ordinal: usize) -> Option<&str> {
        let function = self.functions.get(ordinal)?;
        self.constants
            .get(function.name_index)
            .map(|constant| &*constant.text)
    }

    pub fn find_function(&self, name: &str) -> Option<usize> {
        (0..self.functions.len()).find(|&ordinal| self.function_name(ordinal) == Some(name))
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".constants:")?;
        for (index, constant) in self.constants.iter().enumerate() {
            writeln!(f, "{index} {constant}")?;
        }
        writeln!(f, ".start:")?;
        write!(f, "{}", self.start)?;
        writeln!(f, ".functions:")?;
        for (index, function) in self.functions.iter().enumerate() {
            // every function body is one frame below the globals
            writeln!(f, "{index} {} {} 1", function.name_index, function.param_count)?;
        }
        for (index, function) in self.functions.iter().enumerate() {
            writeln!(f, ".F{index}:")?;
            write!(f, "{}", function.code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunk, Function, Instruction, Opcode, Program};
    use assert2::check;

    #[test]
    fn instructions_render_by_arity() {
        check!(Instruction::new(Opcode::IAdd).to_string() == "iadd");
        check!(Instruction::with_x(Opcode::IPush, -7).to_string() == "ipush -7");
        check!(Instruction::with_xy(Opcode::LoadA, 1, 3).to_string() == "loada 1, 3");
    }

    #[test]
    fn backpatching_rewrites_only_the_target() {
        let mut chunk = Chunk::new();
        chunk.emit(Instruction::new(Opcode::Nop));
        let jump = chunk.emit_jump(Opcode::Jge);
        chunk.emit(Instruction::new(Opcode::Nop));
        chunk.patch_jump_here(jump);
        check!(chunk.get(jump) == Some(&Instruction::with_x(Opcode::Jge, 3)));
        chunk.patch_jump(jump, 0);
        check!(chunk.get(jump) == Some(&Instruction::with_x(Opcode::Jge, 0)));
    }

    #[test]
    #[should_panic(expected = "cannot backpatch")]
    fn backpatching_a_non_jump_is_fatal() {
        let mut chunk = Chunk::new();
        let at = chunk.emit(Instruction::with_x(Opcode::IPush, 1));
        chunk.patch_jump(at, 0);
    }

    #[test]
    fn function_table_keeps_declaration_order() {
        let mut program = Program::default();
        for name in ["first", "second", "main"] {
            let index = program.add_constant(name);
            program.functions.push(Function::new(index));
        }
        program.functions[1].param_count = 2;
        program.functions[0]
            .code
            .emit(Instruction::new(Opcode::Ret));

        let listing = program.to_string();
        let headers = listing
            .lines()
            .skip_while(|line| *line != ".functions:")
            .skip(1)
            .take(3)
            .collect::<Vec<_>>();
        check!(headers == ["0 0 0 1", "1 1 2 1", "2 2 0 1"]);
        check!(program.find_function("main") == Some(2));
        check!(program.function_name(1) == Some("second"));
    }

    #[test]
    fn sections_render_in_order() {
        let mut program = Program::default();
        program.add_constant("main");
        program.start.emit(Instruction::with_x(Opcode::IPush, 5));
        let mut main = Function::new(0);
        main.code.emit(Instruction::new(Opcode::Ret));
        program.functions.push(main);

        check!(
            program.to_string()
                == ".constants:\n0 S \"main\"\n.start:\n0 ipush 5\n.functions:\n0 0 0 1\n.F0:\n0 ret\n"
        );
    }
}
