//! A reference stack machine that executes compiled programs.
//!
//! The start section runs first in the global frame, then `main` is called.
//! Frames only record where their slots begin on the shared value stack;
//! `loada 0, n` addresses the current frame and `loada 1, n` the global one.

use std::{collections::VecDeque, io::Write};

use crate::compiler::bytecode::{Chunk, Instruction, Opcode, Program};

pub mod fuel;

use fuel::Fuel;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("address {0} is outside of the stack")]
    BadAddress(i32),
    #[error("invalid operand {operand} for `{op}`")]
    BadOperand { op: Opcode, operand: i32 },
    #[error("division by zero")]
    DivisionByZero,
    #[error("jump target {0} is out of range")]
    JumpOutOfRange(i32),
    #[error("the program has no `main` function")]
    NoMain,
    #[error("function {0} ended without returning")]
    MissingReturn(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why [`Machine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `main` returned
    Finished,
    /// the fuel ran out; run again with more to continue
    OutOfFuel,
    /// `scan` found no input; provide some and run again
    NeedInput,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// `None` for the start section
    function: Option<usize>,
    pc: usize,
    base: usize,
}

pub struct Machine<'p> {
    program: &'p Program,
    stack: Vec<i32>,
    frames: Vec<Frame>,
    input: VecDeque<i32>,
    finished: bool,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            stack: Vec::new(),
            frames: vec![Frame {
                function: None,
                pc: 0,
                base: 0,
            }],
            input: VecDeque::new(),
            finished: false,
        }
    }

    /// Queues values for `scan` to read.
    pub fn provide_input(&mut self, values: impl IntoIterator<Item = i32>) {
        self.input.extend(values);
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Executes instructions until `main` returns, the fuel runs out, or
    /// `scan` needs input. Printed output goes to `out`.
    pub fn run(&mut self, fuel: &mut Fuel, out: &mut impl Write) -> Result<Status, RuntimeError> {
        while !self.finished {
            let frame = self.frame();
            let Some(&instruction) = self.chunk(frame.function).get(frame.pc) else {
                self.end_of_code(frame)?;
                continue;
            };
            // the pc stays on the `iscan`, so the next run retries it
            if instruction.op == Opcode::IScan && self.input.is_empty() {
                return Ok(Status::NeedInput);
            }
            if !fuel.burn() {
                return Ok(Status::OutOfFuel);
            }

            self.frame_mut().pc += 1;
            self.execute(instruction, out)?;
        }
        Ok(Status::Finished)
    }

    fn frame(&self) -> Frame {
        self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn chunk(&self, function: Option<usize>) -> &'p Chunk {
        match function {
            Some(ordinal) => &self.program.functions[ordinal].code,
            None => &self.program.start,
        }
    }

    /// Running past the end of the start section calls `main`; running past
    /// the end of a function is an error.
    fn end_of_code(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        match frame.function {
            None => {
                let main = self.program.find_function("main").ok_or(RuntimeError::NoMain)?;
                log::debug!("start section done with {} globals, calling main", self.stack.len());
                self.call(main)
            }
            Some(ordinal) => Err(RuntimeError::MissingReturn(ordinal)),
        }
    }

    fn pop(&mut self) -> Result<i32, RuntimeError> {
        let base = self.frame().base;
        if self.stack.len() <= base {
            return Err(RuntimeError::StackUnderflow);
        }
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn address(&self, level_diff: i32, offset: i32) -> Result<i32, RuntimeError> {
        let base = match level_diff {
            0 => self.frame().base,
            1 => self.frames[0].base,
            _ => {
                return Err(RuntimeError::BadOperand {
                    op: Opcode::LoadA,
                    operand: level_diff,
                })
            }
        };
        let base = i32::try_from(base).map_err(|_| RuntimeError::BadAddress(offset))?;
        Ok(base.wrapping_add(offset))
    }

    fn slot(&mut self, address: i32) -> Result<&mut i32, RuntimeError> {
        usize::try_from(address)
            .ok()
            .and_then(|index| self.stack.get_mut(index))
            .ok_or(RuntimeError::BadAddress(address))
    }

    fn count(op: Opcode, operand: i32) -> Result<usize, RuntimeError> {
        usize::try_from(operand).map_err(|_| RuntimeError::BadOperand { op, operand })
    }

    fn jump(&mut self, target: i32) -> Result<(), RuntimeError> {
        let len = self.chunk(self.frame().function).len();
        match usize::try_from(target) {
            Ok(pc) if pc <= len => {
                self.frame_mut().pc = pc;
                Ok(())
            }
            _ => Err(RuntimeError::JumpOutOfRange(target)),
        }
    }

    fn call(&mut self, ordinal: usize) -> Result<(), RuntimeError> {
        let params = self.program.functions[ordinal].param_count;
        let base = self
            .stack
            .len()
            .checked_sub(params)
            .filter(|&base| base >= self.frame().base)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.frames.push(Frame {
            function: Some(ordinal),
            pc: 0,
            base,
        });
        Ok(())
    }

    /// Discards the current frame and its slots, then pushes `value`.
    fn leave(&mut self, value: Option<i32>) {
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.base);
        }
        self.stack.extend(value);
        // only the global frame is left once main returns
        if self.frames.len() <= 1 {
            self.finished = true;
        }
    }

    fn execute(&mut self, instruction: Instruction, out: &mut impl Write) -> Result<(), RuntimeError> {
        let Instruction { op, x, y } = instruction;
        match op {
            Opcode::Nop => {}
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::PopN => {
                for _ in 0..Self::count(op, x)? {
                    self.pop()?;
                }
            }
            Opcode::SNew => {
                let count = Self::count(op, x)?;
                self.stack.resize(self.stack.len() + count, 0);
            }
            Opcode::BiPush | Opcode::IPush => self.stack.push(x),
            Opcode::LoadA => {
                let address = self.address(x, y)?;
                self.stack.push(address);
            }
            Opcode::ILoad => {
                let address = self.pop()?;
                let value = *self.slot(address)?;
                self.stack.push(value);
            }
            Opcode::IStore => {
                let value = self.pop()?;
                let address = self.pop()?;
                *self.slot(address)? = value;
            }
            Opcode::IAdd | Opcode::ISub | Opcode::IMul | Opcode::IDiv | Opcode::ICmp => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let value = match op {
                    Opcode::IAdd => lhs.wrapping_add(rhs),
                    Opcode::ISub => lhs.wrapping_sub(rhs),
                    Opcode::IMul => lhs.wrapping_mul(rhs),
                    Opcode::IDiv if rhs == 0 => return Err(RuntimeError::DivisionByZero),
                    Opcode::IDiv => lhs.wrapping_div(rhs),
                    _ => lhs.cmp(&rhs) as i32,
                };
                self.stack.push(value);
            }
            Opcode::INeg => {
                let value = self.pop()?;
                self.stack.push(value.wrapping_neg());
            }
            Opcode::Jmp => self.jump(x)?,
            Opcode::Je | Opcode::Jne | Opcode::Jl | Opcode::Jge | Opcode::Jg | Opcode::Jle => {
                let value = self.pop()?;
                let taken = match op {
                    Opcode::Je => value == 0,
                    Opcode::Jne => value != 0,
                    Opcode::Jl => value < 0,
                    Opcode::Jge => value >= 0,
                    Opcode::Jg => value > 0,
                    _ => value <= 0,
                };
                if taken {
                    self.jump(x)?;
                }
            }
            Opcode::Call => {
                let ordinal = Self::count(op, x)?;
                if ordinal >= self.program.functions.len() {
                    return Err(RuntimeError::BadOperand { op, operand: x });
                }
                self.call(ordinal)?;
            }
            Opcode::Ret => self.leave(None),
            Opcode::IRet => {
                let value = self.pop()?;
                self.leave(Some(value));
            }
            Opcode::IPrint => {
                let value = self.pop()?;
                write!(out, "{value}")?;
            }
            Opcode::CPrint => {
                let value = self.pop()?;
                out.write_all(&[value as u8])?;
            }
            Opcode::PrintL => writeln!(out)?,
            Opcode::IScan => match self.input.pop_front() {
                Some(value) => self.stack.push(value),
                None => unreachable!("`run` checks the input queue before `iscan`"),
            },
        }
        Ok(())
    }
}
