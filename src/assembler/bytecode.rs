use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use super::isa::{OperandKind, Opcode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("word {index} is not an integer: {word:?}")]
    InvalidWord { index: usize, word: String },
}

/// Executable program: opcode words each followed by their operand words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytecode(Vec<i32>);

impl Bytecode {
    pub const fn new(words: Vec<i32>) -> Self {
        Self(words)
    }

    pub fn words(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads either the comma-separated form or one word per line. Blank
    /// entries are skipped.
    pub fn parse(text: &str) -> Result<Self, BytecodeError> {
        text.split(|c: char| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .enumerate()
            .map(|(index, word)| {
                word.parse().map_err(|_| BytecodeError::InvalidWord {
                    index,
                    word: word.to_string(),
                })
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }

    /// One word per line, with a trailing newline.
    pub fn to_lines(&self) -> String {
        self.0.iter().map(|word| format!("{}\n", word)).collect()
    }

    /// Human-readable listing, one instruction per line prefixed with its
    /// offset. Words that don't decode are listed as raw data.
    pub fn disassemble(&self) -> String {
        let mut lines = Vec::new();
        let mut pc = 0;
        while pc < self.0.len() {
            let decoded = Opcode::try_from(self.0[pc])
                .ok()
                .and_then(|opcode| Some((opcode, self.0.get(pc + 1..pc + opcode.width())?)));
            match decoded {
                Some((opcode, operands)) => {
                    let operands = opcode
                        .operands()
                        .iter()
                        .zip(operands)
                        .map(|(kind, word)| match kind {
                            OperandKind::Register if *word == 0 => "sp".to_string(),
                            OperandKind::Register => format!("r{}", word - 1),
                            OperandKind::Immediate => word.to_string(),
                        })
                        .join(", ");
                    lines.push(format!("{:5}  {:8} {}", pc, opcode.mnemonic(), operands));
                    pc += opcode.width();
                }
                None => {
                    lines.push(format!("{:5}  .word    {}", pc, self.0[pc]));
                    pc += 1;
                }
            }
        }
        lines.join("\n")
    }
}

/// The comma-separated single line form.
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

impl From<Vec<i32>> for Bytecode {
    fn from(words: Vec<i32>) -> Self {
        Self(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_layouts() -> Result<(), BytecodeError> {
        let csv = Bytecode::parse("2,0,10,0\n")?;
        let lines = Bytecode::parse("2\n0\n 10\n0\n\n")?;
        assert_eq!(csv, lines);
        assert_eq!(csv.words(), &[2, 0, 10, 0]);
        assert_eq!(csv.to_string(), "2,0,10,0");
        assert_eq!(csv.to_lines(), "2\n0\n10\n0\n");
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            Bytecode::parse("1,2,x"),
            Err(BytecodeError::InvalidWord {
                index: 2,
                word: "x".into()
            })
        );
    }

    #[test]
    fn listing_names_registers() {
        let listing = Bytecode::new(vec![2, 0, 10, 34, 0, 1, 99]).disassemble();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0].trim(), "0  mov      sp, 10");
        assert_eq!(lines[1].trim(), "3  memcopy  sp, r0");
        assert_eq!(lines[2].trim(), "6  .word    99");
    }
}
