//! Symbolic stack-machine assembly. The code generator produces it and the
//! assembler reads its textual form back.
use crate::write_instruction;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Directive(Directive),
    Label(Label),
    Instruction {
        instruction: Instruction,
        comment: Option<String>,
    },
    Comment(String),
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Directive(direct) => write!(f, "{}", direct),
            Self::Instruction {
                instruction,
                comment: None,
            } => write!(f, "\t{}", instruction),
            Self::Instruction {
                instruction,
                comment: Some(comment),
            } => write!(f, "\t{:24} # {}", instruction.to_string(), comment),
            Self::Label(name) => write!(f, "{}:", name),
            Self::Comment(comment) => write!(f, "# {}", comment),
        }
    }
}

impl From<Instruction> for Assembly {
    fn from(instruction: Instruction) -> Self {
        Self::Instruction {
            instruction,
            comment: None,
        }
    }
}

impl From<Directive> for Assembly {
    fn from(d: Directive) -> Self {
        Self::Directive(d)
    }
}

impl From<Label> for Assembly {
    fn from(val: Label) -> Self {
        Assembly::Label(val)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Reserve `words` words of static memory, addressed through `label`
    Static { label: Label, words: usize },
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Static { label, words } => write!(f, ".static {} {}", label, words),
        }
    }
}

/// A named position, either in the code or in static memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn function(name: &str) -> Self {
        Self(format!("fn.{}", name))
    }
    pub fn method(owner: &str, name: &str) -> Self {
        Self(format!("fn.{}.{}", owner, name))
    }
    pub fn static_variable(name: &str) -> Self {
        Self(format!("static.{}", name))
    }
    pub fn string(index: usize) -> Self {
        Self(format!("str.{}", index))
    }
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    StackPointer,
    General(u8),
}

impl Register {
    /// Index of the register in the machine's register file.
    pub const fn slot(self) -> i32 {
        match self {
            Self::StackPointer => 0,
            Self::General(n) => n as i32 + 1,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::StackPointer => f.write_str("sp"),
            Self::General(n) => write!(f, "r{}", n),
        }
    }
}

/// Data is something that isn't going to be modified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    Register(Register),
    Immediate(i32),
    /// Resolved by the assembler to a code offset or a static address
    Label(Label),
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Immediate(value) => write!(f, "{}", value),
            Self::Register(reg) => write!(f, "{}", reg),
            Self::Label(label) => write!(f, "{}", label),
        }
    }
}

impl From<Register> for Data {
    fn from(reg: Register) -> Self {
        Self::Register(reg)
    }
}

impl From<i32> for Data {
    fn from(value: i32) -> Self {
        Self::Immediate(value)
    }
}

impl From<Label> for Data {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

/// Whether arithmetic and comparisons treat words as integers or as `f32` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Previous comparison resulted in equal
    Equals,
    /// Previous comparison resulted in not equal
    NotEquals,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl Condition {
    pub const ALL: [Condition; 6] = [
        Self::Equals,
        Self::NotEquals,
        Self::Greater,
        Self::Less,
        Self::GreaterEqual,
        Self::LessEqual,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Equals => "jeq",
            Self::NotEquals => "jne",
            Self::Greater => "jgt",
            Self::Less => "jlt",
            Self::GreaterEqual => "jge",
            Self::LessEqual => "jle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Stop the machine
    Halt,
    /// Move data to a register
    Mov { target: Register, source: Data },
    /// `target = target + rhs`
    Add {
        target: Register,
        rhs: Data,
        kind: NumKind,
    },
    /// `target = target - rhs`
    Sub {
        target: Register,
        rhs: Data,
        kind: NumKind,
    },
    /// `target = target * rhs`
    Mul {
        target: Register,
        rhs: Data,
        kind: NumKind,
    },
    /// `target = target / rhs`
    Div {
        target: Register,
        rhs: Data,
        kind: NumKind,
    },
    /// Compare a register with some data, for the next conditional jump
    Cmp {
        lhs: Register,
        rhs: Data,
        kind: NumKind,
    },
    /// Unconditional jump to a label, an absolute offset or the offset held in a register
    Jmp { target: Data },
    /// Jump if the last comparison satisfied the condition
    Branch { condition: Condition, label: Label },
    /// Load the word at the address held in `address`
    MemRead { target: Register, address: Register },
    /// Store data at the address held in `address`
    MemWrite { address: Register, source: Data },
    /// Copy the word at the address held in `source` to the one held in `destination`
    MemCopy {
        destination: Register,
        source: Register,
    },
}

impl Instruction {
    /// Integer `target += rhs`, used all over for pointer and stack arithmetic.
    pub fn add(target: Register, rhs: impl Into<Data>) -> Self {
        Self::Add {
            target,
            rhs: rhs.into(),
            kind: NumKind::Integer,
        }
    }
    pub fn sub(target: Register, rhs: impl Into<Data>) -> Self {
        Self::Sub {
            target,
            rhs: rhs.into(),
            kind: NumKind::Integer,
        }
    }
    pub fn mov(target: Register, source: impl Into<Data>) -> Self {
        Self::Mov {
            target,
            source: source.into(),
        }
    }
    pub fn mem_write(address: Register, source: impl Into<Data>) -> Self {
        Self::MemWrite {
            address,
            source: source.into(),
        }
    }
    pub fn with_comment(self, comment: impl Into<String>) -> Assembly {
        Assembly::Instruction {
            instruction: self,
            comment: Some(comment.into()),
        }
    }

    pub const fn mnemonic(&self) -> &'static str {
        use NumKind::*;
        match self {
            Self::Halt => "halt",
            Self::Mov { .. } => "mov",
            Self::Add { kind: Integer, .. } => "add",
            Self::Add { kind: Float, .. } => "fadd",
            Self::Sub { kind: Integer, .. } => "sub",
            Self::Sub { kind: Float, .. } => "fsub",
            Self::Mul { kind: Integer, .. } => "mul",
            Self::Mul { kind: Float, .. } => "fmul",
            Self::Div { kind: Integer, .. } => "div",
            Self::Div { kind: Float, .. } => "fdiv",
            Self::Cmp { kind: Integer, .. } => "cmp",
            Self::Cmp { kind: Float, .. } => "fcmp",
            Self::Jmp { .. } => "jmp",
            Self::Branch { condition, .. } => condition.mnemonic(),
            Self::MemRead { .. } => "memread",
            Self::MemWrite { .. } => "memwrite",
            Self::MemCopy { .. } => "memcopy",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.mnemonic();
        match self {
            Self::Halt => write_instruction!(f, name),
            Self::Mov { target, source } => write_instruction!(f, name, target, source),
            Self::Add { target, rhs, .. }
            | Self::Sub { target, rhs, .. }
            | Self::Mul { target, rhs, .. }
            | Self::Div { target, rhs, .. } => write_instruction!(f, name, target, rhs),
            Self::Cmp { lhs, rhs, .. } => write_instruction!(f, name, lhs, rhs),
            Self::Jmp { target } => write_instruction!(f, name, target),
            Self::Branch { label, .. } => write_instruction!(f, name, label),
            Self::MemRead { target, address } => write_instruction!(f, name, target, address),
            Self::MemWrite { address, source } => write_instruction!(f, name, address, source),
            Self::MemCopy {
                destination,
                source,
            } => write_instruction!(f, name, destination, source),
        }
    }
}

#[macro_export]
macro_rules! format_instr_args {
    () => { "" };
    ($arg:expr) => { "{}" };
    ($first:expr, $($rest:expr),+) => {
        concat!("{}, ", $crate::format_instr_args!($($rest),+))
    }
}

#[macro_export]
macro_rules! format_instr {
    ($name:expr) => { format_args!("{}", $name) };
    ($name:expr, $($args:expr),+) => {
        format_args!(concat!("{:8} ", $crate::format_instr_args!($($args),+)), $name, $($args),+)
    };
}

#[macro_export]
macro_rules! write_instruction {
    ($formatter:expr, $name:expr) => {
        $formatter.write_fmt($crate::format_instr!($name))
    };
    ($formatter:expr, $name:expr, $($args:expr),+) => { $formatter.write_fmt($crate::format_instr!($name, $($args),+)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_text() {
        let sp = Register::StackPointer;
        let r0 = Register::General(0);
        assert_eq!(Instruction::mov(r0, sp).to_string(), "mov      r0, sp");
        assert_eq!(Instruction::add(sp, -3).to_string(), "add      sp, -3");
        assert_eq!(
            Instruction::Div {
                target: r0,
                rhs: Register::General(1).into(),
                kind: NumKind::Float
            }
            .to_string(),
            "fdiv     r0, r1"
        );
        assert_eq!(
            Instruction::Branch {
                condition: Condition::LessEqual,
                label: Label::new(".L4")
            }
            .to_string(),
            "jle      .L4"
        );
        assert_eq!(Instruction::Halt.to_string(), "halt");
    }

    #[test]
    fn assembly_lines() {
        let label = Label::static_variable("counter");
        assert_eq!(
            Assembly::from(Directive::Static {
                label: label.clone(),
                words: 2
            })
            .to_string(),
            ".static static.counter 2"
        );
        assert_eq!(Assembly::from(label).to_string(), "static.counter:");
        let annotated = Instruction::mem_write(Register::StackPointer, 7).with_comment("literal");
        assert!(annotated.to_string().ends_with("# literal"));
        assert!(annotated.to_string().starts_with("\tmemwrite sp, 7"));
    }

    #[test]
    fn register_slots() {
        assert_eq!(Register::StackPointer.slot(), 0);
        assert_eq!(Register::General(0).slot(), 1);
        assert_eq!(Register::General(15).slot(), 16);
    }
}
