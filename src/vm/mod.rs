//! The virtual machine running assembled bytecode.
//!
//! The machine has a program counter, a file of 17 word registers and a flat,
//! zero-initialised word memory. Slot 0 of the register file is the stack
//! pointer, but the machine gives it no special meaning: the generated code
//! moves it with ordinary `add`/`sub` and addresses the stack through it.

use std::cmp::Ordering;

use thiserror::Error;

use crate::assembler::isa::{OperandKind, Opcode};
use crate::assembler::Bytecode;
use crate::codegen::registers::GENERAL_REGISTERS;

/// `sp` plus the general purpose registers.
pub const REGISTER_COUNT: usize = GENERAL_REGISTERS as usize + 1;

const STACK_POINTER: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Size of the machine memory, in words.
    pub memory_words: usize,
    /// Instructions the machine may execute before giving up. `None` runs
    /// until the program halts.
    pub step_budget: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_words: 65_536,
            step_budget: Some(10_000_000),
        }
    }
}

/// A fatal error during execution. `pc` is the offset of the failing instruction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeFailure {
    #[error("unknown opcode {opcode} at {pc}")]
    UnknownOpcode { pc: usize, opcode: i32 },
    #[error("instruction at {pc} runs past the end of the code")]
    TruncatedInstruction { pc: usize },
    #[error("invalid register {register} at {pc}")]
    InvalidRegister { pc: usize, register: i32 },
    #[error("address {address} is outside memory, at {pc}")]
    InvalidAddress { pc: usize, address: i32 },
    #[error("jump to {target} leaves the code, at {pc}")]
    InvalidJump { pc: usize, target: i32 },
    #[error("division by zero at {pc}")]
    DivisionByZero { pc: usize },
    #[error("conditional jump without a comparison at {pc}")]
    NoComparison { pc: usize },
    #[error("step budget of {budget} exhausted at {pc}")]
    StepBudgetExhausted { pc: usize, budget: u64 },
}

impl RuntimeFailure {
    pub const fn pc(&self) -> usize {
        match self {
            Self::UnknownOpcode { pc, .. }
            | Self::TruncatedInstruction { pc }
            | Self::InvalidRegister { pc, .. }
            | Self::InvalidAddress { pc, .. }
            | Self::InvalidJump { pc, .. }
            | Self::DivisionByZero { pc }
            | Self::NoComparison { pc }
            | Self::StepBudgetExhausted { pc, .. } => *pc,
        }
    }
}

/// Result of the last `cmp` or `fcmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flags {
    Unset,
    Ordered(Ordering),
    /// A float comparison involving NaN
    Unordered,
}

impl Flags {
    fn satisfies(self, opcode: Opcode) -> Option<bool> {
        use Ordering::*;
        let ordering = match self {
            Self::Unset => return None,
            Self::Unordered => return Some(opcode == Opcode::Jne),
            Self::Ordered(ordering) => ordering,
        };
        Some(match opcode {
            Opcode::Jeq => ordering == Equal,
            Opcode::Jne => ordering != Equal,
            Opcode::Jgt => ordering == Greater,
            Opcode::Jlt => ordering == Less,
            Opcode::Jge => ordering != Less,
            Opcode::Jle => ordering != Greater,
            _ => false,
        })
    }
}

/// Sees every instruction just before it runs.
pub trait ExecutionObserver {
    fn before_instruction(&mut self, pc: usize, opcode: Opcode, operands: &[i32], registers: &[i32]);
}

impl ExecutionObserver for () {
    fn before_instruction(&mut self, _: usize, _: Opcode, _: &[i32], _: &[i32]) {}
}

impl<F> ExecutionObserver for F
where
    F: FnMut(usize, Opcode, &[i32], &[i32]),
{
    fn before_instruction(&mut self, pc: usize, opcode: Opcode, operands: &[i32], registers: &[i32]) {
        self(pc, opcode, operands, registers)
    }
}

/// The machine state once the program stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    pub registers: [i32; REGISTER_COUNT],
    pub memory: Vec<i32>,
    /// Instructions executed, the final `halt` included.
    pub steps: u64,
}

impl Termination {
    pub const fn stack_pointer(&self) -> i32 {
        self.registers[STACK_POINTER]
    }

    /// The word just below the stack pointer, where a top-level `return`
    /// leaves a single-word value.
    pub fn top_of_stack(&self) -> Option<i32> {
        let below = usize::try_from(self.stack_pointer()).ok()?.checked_sub(1)?;
        self.memory.get(below).copied()
    }

    pub fn memory(&self) -> &[i32] {
        &self.memory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

pub struct Vm<O = ()> {
    code: Bytecode,
    config: VmConfig,
    registers: [i32; REGISTER_COUNT],
    memory: Vec<i32>,
    flags: Flags,
    pc: usize,
    steps: u64,
    observer: O,
}

impl Vm {
    pub fn new(code: Bytecode, config: VmConfig) -> Self {
        Self {
            memory: vec![0; config.memory_words],
            code,
            config,
            registers: [0; REGISTER_COUNT],
            flags: Flags::Unset,
            pc: 0,
            steps: 0,
            observer: (),
        }
    }
}

impl<O: ExecutionObserver> Vm<O> {
    pub fn with_observer<P: ExecutionObserver>(self, observer: P) -> Vm<P> {
        Vm {
            code: self.code,
            config: self.config,
            registers: self.registers,
            memory: self.memory,
            flags: self.flags,
            pc: self.pc,
            steps: self.steps,
            observer,
        }
    }

    pub const fn pc(&self) -> usize {
        self.pc
    }

    pub fn registers(&self) -> &[i32] {
        &self.registers
    }

    /// Runs until the program halts or fails.
    pub fn run(mut self) -> Result<Termination, RuntimeFailure> {
        tracing::debug!(target: "vm", "running {} words of code", self.code.len());
        while self.step()? == Status::Running {}
        tracing::debug!(
            target: "vm",
            "halted at {} after {} steps, sp = {}",
            self.pc,
            self.steps,
            self.registers[STACK_POINTER]
        );
        Ok(Termination {
            registers: self.registers,
            memory: self.memory,
            steps: self.steps,
        })
    }

    /// Executes a single instruction. Running off the end of the code halts.
    pub fn step(&mut self) -> Result<Status, RuntimeFailure> {
        let pc = self.pc;
        let code = self.code.words();
        let word = match code.get(pc) {
            Some(word) => *word,
            None => return Ok(Status::Halted),
        };
        let opcode = Opcode::try_from(word)
            .map_err(|opcode| RuntimeFailure::UnknownOpcode { pc, opcode })?;
        let mut operands = [0; 2];
        let arity = opcode.arity();
        operands[..arity].copy_from_slice(
            code.get(pc + 1..pc + opcode.width())
                .ok_or(RuntimeFailure::TruncatedInstruction { pc })?,
        );
        for (kind, operand) in opcode.operands().iter().zip(&operands) {
            if *kind == OperandKind::Register && !(0..REGISTER_COUNT as i32).contains(operand) {
                return Err(RuntimeFailure::InvalidRegister {
                    pc,
                    register: *operand,
                });
            }
        }
        if let Some(budget) = self.config.step_budget {
            if self.steps >= budget {
                return Err(RuntimeFailure::StepBudgetExhausted { pc, budget });
            }
        }
        self.observer
            .before_instruction(pc, opcode, &operands[..arity], &self.registers);
        tracing::trace!(target: "vm::step", pc, %opcode, operands = ?&operands[..arity]);
        self.steps += 1;
        self.pc = pc + opcode.width();
        self.exec(pc, opcode, operands)
    }

    fn exec(&mut self, pc: usize, opcode: Opcode, [a, b]: [i32; 2]) -> Result<Status, RuntimeFailure> {
        use Opcode::*;
        // register operands were checked when decoding
        let reg = |slot: i32| slot as usize;
        match opcode {
            Halt => return Ok(Status::Halted),
            MovReg => self.registers[reg(a)] = self.registers[reg(b)],
            MovImm => self.registers[reg(a)] = b,
            AddReg | SubReg | MulReg | DivReg | FAddReg | FSubReg | FMulReg | FDivReg => {
                let rhs = self.registers[reg(b)];
                self.arithmetic(pc, opcode, reg(a), rhs)?;
            }
            AddImm | SubImm | MulImm | DivImm | FAddImm | FSubImm | FMulImm | FDivImm => {
                self.arithmetic(pc, opcode, reg(a), b)?;
            }
            CmpReg => self.flags = Flags::Ordered(self.registers[reg(a)].cmp(&self.registers[reg(b)])),
            CmpImm => self.flags = Flags::Ordered(self.registers[reg(a)].cmp(&b)),
            FCmpReg | FCmpImm => {
                let rhs = if opcode == FCmpReg { self.registers[reg(b)] } else { b };
                self.flags = match float(self.registers[reg(a)]).partial_cmp(&float(rhs)) {
                    Some(ordering) => Flags::Ordered(ordering),
                    None => Flags::Unordered,
                };
            }
            JmpImm => self.jump(pc, a)?,
            JmpReg => self.jump(pc, self.registers[reg(a)])?,
            Jeq | Jne | Jgt | Jlt | Jge | Jle => {
                if self
                    .flags
                    .satisfies(opcode)
                    .ok_or(RuntimeFailure::NoComparison { pc })?
                {
                    self.jump(pc, a)?;
                }
            }
            MemRead => {
                let address = self.address(pc, self.registers[reg(b)])?;
                self.registers[reg(a)] = self.memory[address];
            }
            MemWriteReg | MemWriteImm => {
                let value = if opcode == MemWriteReg { self.registers[reg(b)] } else { b };
                let address = self.address(pc, self.registers[reg(a)])?;
                self.memory[address] = value;
            }
            MemCopy => {
                let source = self.address(pc, self.registers[reg(b)])?;
                let destination = self.address(pc, self.registers[reg(a)])?;
                self.memory[destination] = self.memory[source];
            }
        }
        Ok(Status::Running)
    }

    fn arithmetic(&mut self, pc: usize, opcode: Opcode, target: usize, rhs: i32) -> Result<(), RuntimeFailure> {
        use Opcode::*;
        let lhs = self.registers[target];
        self.registers[target] = match opcode {
            AddReg | AddImm => lhs.wrapping_add(rhs),
            SubReg | SubImm => lhs.wrapping_sub(rhs),
            MulReg | MulImm => lhs.wrapping_mul(rhs),
            DivReg | DivImm if rhs == 0 => return Err(RuntimeFailure::DivisionByZero { pc }),
            DivReg | DivImm => lhs.wrapping_div(rhs),
            FAddReg | FAddImm => word(float(lhs) + float(rhs)),
            FSubReg | FSubImm => word(float(lhs) - float(rhs)),
            FMulReg | FMulImm => word(float(lhs) * float(rhs)),
            FDivReg | FDivImm => word(float(lhs) / float(rhs)),
            _ => lhs,
        };
        Ok(())
    }

    fn jump(&mut self, pc: usize, target: i32) -> Result<(), RuntimeFailure> {
        match usize::try_from(target) {
            // jumping to the very end halts like falling off it
            Ok(offset) if offset <= self.code.len() => {
                self.pc = offset;
                Ok(())
            }
            _ => Err(RuntimeFailure::InvalidJump { pc, target }),
        }
    }

    fn address(&self, pc: usize, address: i32) -> Result<usize, RuntimeFailure> {
        usize::try_from(address)
            .ok()
            .filter(|address| *address < self.memory.len())
            .ok_or(RuntimeFailure::InvalidAddress { pc, address })
    }
}

fn float(word: i32) -> f32 {
    f32::from_bits(word as u32)
}

fn word(value: f32) -> i32 {
    value.to_bits() as i32
}

/// Runs `code` to completion on a fresh machine.
pub fn execute(code: &Bytecode, config: VmConfig) -> Result<Termination, RuntimeFailure> {
    Vm::new(code.clone(), config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn run(text: &str) -> anyhow::Result<Termination> {
        Ok(execute(&assemble(text)?, VmConfig::default())?)
    }

    fn failure(text: &str, config: VmConfig) -> Option<RuntimeFailure> {
        let code = assemble(text).ok()?;
        execute(&code, config).err()
    }

    #[test]
    fn stack_holds_the_result() -> anyhow::Result<()> {
        let end = run("mov sp, 100\nmemwrite sp, 42\nadd sp, 1\nhalt")?;
        assert_eq!(end.stack_pointer(), 101);
        assert_eq!(end.top_of_stack(), Some(42));
        assert_eq!(end.steps, 4);
        Ok(())
    }

    #[test]
    fn integer_arithmetic_wraps() -> anyhow::Result<()> {
        let end = run("mov r0, 2147483647\nadd r0, 1\nmov r1, -7\ndiv r1, 2\nmov r2, 6\nmul r2, r1")?;
        assert_eq!(end.registers[1], i32::MIN);
        assert_eq!(end.registers[2], -3);
        assert_eq!(end.registers[3], -18);
        Ok(())
    }

    #[test]
    fn floats_are_bit_patterns() -> anyhow::Result<()> {
        let text = format!(
            "mov r0, {}\nfmul r0, {}\nfsub r0, {}",
            word(1.5),
            word(4.0),
            word(0.5)
        );
        let end = run(&text)?;
        assert_eq!(float(end.registers[1]), 5.5);
        Ok(())
    }

    #[test]
    fn conditional_jumps_follow_the_comparison() -> anyhow::Result<()> {
        // counts r0 up to 5
        let text = "\
loop:
    cmp      r0, 5
    jge      done
    add      r0, 1
    jmp      loop
done:
    halt
";
        let end = run(text)?;
        assert_eq!(end.registers[1], 5);
        Ok(())
    }

    #[test]
    fn unordered_floats_only_differ() -> anyhow::Result<()> {
        let nan = word(f32::NAN);
        let text = format!(
            "mov r0, {nan}\nfcmp r0, r0\njeq out\njge out\njle out\njne ok\nout: halt\nok: mov r1, 1"
        );
        let end = run(&text)?;
        assert_eq!(end.registers[2], 1);
        Ok(())
    }

    #[test]
    fn memcopy_and_register_jumps() -> anyhow::Result<()> {
        let text = "\
    mov      r0, 10
    memwrite r0, 7
    mov      r1, 20
    memcopy  r1, r0
    memread  r2, r1
    mov      r3, back
    jmp      r3
    halt
back:
";
        let end = run(text)?;
        assert_eq!(end.memory()[20], 7);
        assert_eq!(end.registers[3], 7);
        Ok(())
    }

    #[test]
    fn observer_sees_each_instruction() -> anyhow::Result<()> {
        let code = assemble("mov r0, 3\nadd r0, r0\nhalt")?;
        let mut seen = Vec::new();
        let end = Vm::new(code, VmConfig::default())
            .with_observer(|pc: usize, opcode: Opcode, _: &[i32], _: &[i32]| seen.push((pc, opcode)))
            .run()?;
        assert_eq!(end.registers[1], 6);
        assert_eq!(
            seen,
            vec![(0, Opcode::MovImm), (3, Opcode::AddReg), (6, Opcode::Halt)]
        );
        Ok(())
    }

    #[test]
    fn fatal_failures() {
        let config = VmConfig::default();
        assert_eq!(
            failure("mov r0, 4\ndiv r0, 0", config.clone()),
            Some(RuntimeFailure::DivisionByZero { pc: 3 })
        );
        assert_eq!(
            failure("mov r0, -1\nmemread r1, r0", config.clone()),
            Some(RuntimeFailure::InvalidAddress { pc: 3, address: -1 })
        );
        assert_eq!(
            failure("jeq 0", config.clone()),
            Some(RuntimeFailure::NoComparison { pc: 0 })
        );
        assert_eq!(
            failure("jmp 99", config.clone()),
            Some(RuntimeFailure::InvalidJump { pc: 0, target: 99 })
        );
        let small = VmConfig {
            memory_words: 8,
            ..VmConfig::default()
        };
        assert_eq!(
            failure("mov r0, 8\nmemwrite r0, 1", small),
            Some(RuntimeFailure::InvalidAddress { pc: 3, address: 8 })
        );
    }

    #[test]
    fn malformed_bytecode() {
        let config = VmConfig::default();
        let run = |words: Vec<i32>| execute(&Bytecode::new(words), config.clone()).err();
        assert_eq!(run(vec![77]), Some(RuntimeFailure::UnknownOpcode { pc: 0, opcode: 77 }));
        assert_eq!(run(vec![2, 1]), Some(RuntimeFailure::TruncatedInstruction { pc: 0 }));
        assert_eq!(
            run(vec![2, 40, 1]),
            Some(RuntimeFailure::InvalidRegister { pc: 0, register: 40 })
        );
    }

    #[test]
    fn step_budget_stops_endless_loops() {
        let config = VmConfig {
            step_budget: Some(50),
            ..VmConfig::default()
        };
        let failed = failure("spin: jmp spin", config);
        assert_eq!(failed, Some(RuntimeFailure::StepBudgetExhausted { pc: 0, budget: 50 }));
        assert_eq!(failed.map(|failure| failure.pc()), Some(0));
    }
}
