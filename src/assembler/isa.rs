//! The machine's instruction set.
//!
//! Every instruction is one opcode word followed by a fixed number of operand
//! words. Register operands hold a register slot (`sp` is 0, `rN` is N + 1),
//! immediates hold the value itself. Mnemonics that take either a register or
//! an immediate as their last operand get one opcode per form.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// What an operand word holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Register,
    Immediate,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Register => f.write_str("register"),
            Self::Immediate => f.write_str("immediate"),
        }
    }
}

macro_rules! instruction_set {
    ($(
        $(#[$doc:meta])*
        $name:ident = $code:literal, $mnemonic:literal => [$($operand:ident),*];
    )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            pub const fn operands(self) -> &'static [OperandKind] {
                match self {
                    $(Opcode::$name => &[$(OperandKind::$operand),*],)*
                }
            }
        }

        impl TryFrom<i32> for Opcode {
            type Error = i32;

            fn try_from(value: i32) -> Result<Self, i32> {
                match value {
                    $($code => Ok(Opcode::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

instruction_set! {
    /// halt ; stop the machine
    Halt = 0, "halt" => [];
    /// mov rd, rs ; rd = rs
    MovReg = 1, "mov" => [Register, Register];
    /// mov rd, imm ; rd = imm
    MovImm = 2, "mov" => [Register, Immediate];
    /// add rd, rs ; rd += rs
    AddReg = 3, "add" => [Register, Register];
    AddImm = 4, "add" => [Register, Immediate];
    /// sub rd, rs ; rd -= rs
    SubReg = 5, "sub" => [Register, Register];
    SubImm = 6, "sub" => [Register, Immediate];
    /// mul rd, rs ; rd *= rs
    MulReg = 7, "mul" => [Register, Register];
    MulImm = 8, "mul" => [Register, Immediate];
    /// div rd, rs ; rd /= rs, traps on a zero divisor
    DivReg = 9, "div" => [Register, Register];
    DivImm = 10, "div" => [Register, Immediate];
    /// fadd rd, rs ; same as add, on f32 bit patterns
    FAddReg = 11, "fadd" => [Register, Register];
    FAddImm = 12, "fadd" => [Register, Immediate];
    FSubReg = 13, "fsub" => [Register, Register];
    FSubImm = 14, "fsub" => [Register, Immediate];
    FMulReg = 15, "fmul" => [Register, Register];
    FMulImm = 16, "fmul" => [Register, Immediate];
    FDivReg = 17, "fdiv" => [Register, Register];
    FDivImm = 18, "fdiv" => [Register, Immediate];
    /// cmp rs, rt ; set the flags for the next conditional jump
    CmpReg = 19, "cmp" => [Register, Register];
    CmpImm = 20, "cmp" => [Register, Immediate];
    FCmpReg = 21, "fcmp" => [Register, Register];
    FCmpImm = 22, "fcmp" => [Register, Immediate];
    /// jmp target ; absolute code offset
    JmpImm = 23, "jmp" => [Immediate];
    /// jmp rs ; code offset held in a register
    JmpReg = 24, "jmp" => [Register];
    Jeq = 25, "jeq" => [Immediate];
    Jne = 26, "jne" => [Immediate];
    Jgt = 27, "jgt" => [Immediate];
    Jlt = 28, "jlt" => [Immediate];
    Jge = 29, "jge" => [Immediate];
    Jle = 30, "jle" => [Immediate];
    /// memread rd, ra ; rd = mem[ra]
    MemRead = 31, "memread" => [Register, Register];
    /// memwrite ra, rs ; mem[ra] = rs
    MemWriteReg = 32, "memwrite" => [Register, Register];
    MemWriteImm = 33, "memwrite" => [Register, Immediate];
    /// memcopy rd, rs ; mem[rd] = mem[rs]
    MemCopy = 34, "memcopy" => [Register, Register];
}

impl Opcode {
    pub const fn arity(self) -> usize {
        self.operands().len()
    }

    /// Words taken by the instruction, opcode included.
    pub const fn width(self) -> usize {
        1 + self.arity()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

lazy_static! {
    /// Every form of each mnemonic, in opcode order.
    pub static ref MNEMONICS: HashMap<&'static str, Vec<Opcode>> = {
        let mut table: HashMap<&'static str, Vec<Opcode>> = HashMap::new();
        for &opcode in Opcode::ALL {
            table.entry(opcode.mnemonic()).or_default().push(opcode);
        }
        table
    };
}

/// Looks up the opcode of `mnemonic` whose operand kinds are exactly `kinds`.
pub fn select(mnemonic: &str, kinds: &[OperandKind]) -> Option<Opcode> {
    MNEMONICS
        .get(mnemonic)?
        .iter()
        .copied()
        .find(|opcode| opcode.operands() == kinds)
}
