//! Two-pass assembler turning assembly text into [`Bytecode`].
//!
//! The text is what the code generator prints:
//!
//! ```text
//! .static static.total 1   # reserve one word of static memory
//! start:                   # code label
//!     mov      r0, static.total
//!     memwrite r0, 4
//!     jmp      start
//! ```
//!
//! Commas between operands are optional and `#` starts a comment. Registers
//! are `sp` and `r0` to `r15`, immediates are signed decimal numbers, and any
//! other operand names a label or a static. Code labels resolve to the offset
//! of the instruction after them, statics to their address in memory.

pub mod bytecode;
pub mod isa;

use std::collections::HashMap;

use thiserror::Error;

use crate::codegen::registers::GENERAL_REGISTERS;
use crate::error::{self, SourceMetadata, Span};
pub use bytecode::{Bytecode, BytecodeError};
use isa::{OperandKind, Opcode, MNEMONICS};

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const STATIC_DIRECTIVE: &str = ".static";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssembleErrorKind {
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),
    #[error("{mnemonic} takes {expected} operands, found {found}")]
    Arity {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid operands for {mnemonic}: {found}")]
    InvalidOperand { mnemonic: String, found: String },
    #[error("malformed directive: {0}")]
    MalformedDirective(String),
    #[error("label {0:?} is defined more than once")]
    DuplicateLabel(String),
    #[error("undefined label {0:?}")]
    UndefinedLabel(String),
}

pub type AssembleError = error::Error<AssembleErrorKind>;

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand<'a> {
    Register(i32),
    Immediate(i32),
    Symbol(&'a str),
}

impl Operand<'_> {
    const fn kind(&self) -> OperandKind {
        match self {
            Self::Register(_) => OperandKind::Register,
            Self::Immediate(_) | Self::Symbol(_) => OperandKind::Immediate,
        }
    }
}

#[derive(Debug)]
enum Item<'a> {
    Label(Token<'a>),
    Static { name: Token<'a>, words: usize },
    Instruction {
        opcode: Opcode,
        operands: Vec<(Operand<'a>, Span)>,
    },
}

/// Splits one line into tokens, dropping the comment and separators.
/// `start` is the offset of the line in the whole text.
fn tokenize(line: &str, start: usize) -> Vec<Token<'_>> {
    let code = line.split(COMMENT_CHAR).next().unwrap_or_default();
    let mut tokens = Vec::new();
    let mut current: Option<usize> = None;
    for (i, c) in code.char_indices().chain(std::iter::once((code.len(), ' '))) {
        let separator = c.is_whitespace() || c == ',';
        match (current, separator) {
            (None, false) => current = Some(i),
            (Some(begin), true) => {
                tokens.push(Token {
                    text: &code[begin..i],
                    span: Span {
                        offset: start + begin,
                        len: i - begin,
                    },
                });
                current = None;
            }
            _ => {}
        }
    }
    tokens
}

fn is_symbol(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_operand(text: &str) -> Option<Operand> {
    if text == "sp" {
        return Some(Operand::Register(0));
    }
    if let Some(index) = text.strip_prefix('r') {
        if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
            return match index.parse::<usize>() {
                Ok(n) if n < GENERAL_REGISTERS as usize => Some(Operand::Register(n as i32 + 1)),
                _ => None,
            };
        }
    }
    if let Ok(value) = text.parse::<i32>() {
        return Some(Operand::Immediate(value));
    }
    is_symbol(text).then(|| Operand::Symbol(text))
}

pub struct Assembler<'a> {
    meta: &'a SourceMetadata<'a>,
}

impl<'a> Assembler<'a> {
    pub const fn new(meta: &'a SourceMetadata<'a>) -> Self {
        Self { meta }
    }

    fn error(&self, kind: AssembleErrorKind, span: Span) -> AssembleError {
        AssembleError::new(kind).with_source(span, self.meta)
    }

    pub fn assemble(&self) -> Result<Bytecode, AssembleError> {
        let items = self.parse().map_err(|err| err.add_context("reading assembly"))?;

        // first pass: give every label and static its value
        let mut symbols: HashMap<&str, i32> = HashMap::new();
        let mut code_offset = 0;
        let mut static_address = 0;
        for item in &items {
            let (name, value) = match item {
                Item::Label(name) => (name, code_offset),
                Item::Static { name, words } => {
                    let address = static_address;
                    static_address += *words as i32;
                    (name, address)
                }
                Item::Instruction { opcode, .. } => {
                    code_offset += opcode.width() as i32;
                    continue;
                }
            };
            if symbols.insert(name.text, value).is_some() {
                return Err(self.error(
                    AssembleErrorKind::DuplicateLabel(name.text.to_string()),
                    name.span,
                ));
            }
        }
        tracing::debug!(
            target: "assembler",
            "{} symbols, {} code words, {} static words",
            symbols.len(),
            code_offset,
            static_address
        );

        // second pass: encode
        let mut words = Vec::with_capacity(code_offset as usize);
        for item in &items {
            if let Item::Instruction { opcode, operands } = item {
                words.push(*opcode as i32);
                for (operand, span) in operands {
                    let word = match operand {
                        Operand::Register(slot) => *slot,
                        Operand::Immediate(value) => *value,
                        Operand::Symbol(name) => *symbols.get(name).ok_or_else(|| {
                            self.error(AssembleErrorKind::UndefinedLabel(name.to_string()), *span)
                        })?,
                    };
                    words.push(word);
                }
            }
        }
        Ok(Bytecode::new(words))
    }

    fn parse(&self) -> Result<Vec<Item<'a>>, AssembleError> {
        let mut items = Vec::new();
        let mut line_start = 0;
        for line in self.meta.input().split('\n') {
            let tokens = tokenize(line, line_start);
            line_start += line.len() + 1;
            let mut rest = &tokens[..];
            while let Some((first, tail)) = rest.split_first() {
                match first.text.strip_suffix(LABEL_SUFFIX) {
                    Some(name) if is_symbol(name) => {
                        items.push(Item::Label(Token {
                            text: name,
                            span: first.span,
                        }));
                        rest = tail;
                    }
                    _ => break,
                }
            }
            let (first, operands) = match rest.split_first() {
                Some(split) => split,
                None => continue,
            };
            if first.text == STATIC_DIRECTIVE {
                items.push(self.static_directive(first, operands)?);
            } else {
                items.push(self.instruction(first, operands)?);
            }
        }
        Ok(items)
    }

    fn static_directive(&self, directive: &Token, args: &[Token<'a>]) -> Result<Item<'a>, AssembleError> {
        let malformed = |message: &str, span| {
            self.error(AssembleErrorKind::MalformedDirective(message.to_string()), span)
        };
        match args {
            [name, words] => {
                if !is_symbol(name.text) {
                    return Err(malformed("expected a static name", name.span));
                }
                let words = words
                    .text
                    .parse()
                    .map_err(|_| malformed("expected a word count", words.span))?;
                Ok(Item::Static { name: *name, words })
            }
            _ => Err(malformed(".static takes a name and a word count", directive.span)),
        }
    }

    fn instruction(&self, mnemonic: &Token, args: &[Token<'a>]) -> Result<Item<'a>, AssembleError> {
        let forms = MNEMONICS.get(mnemonic.text).ok_or_else(|| {
            self.error(
                AssembleErrorKind::UnknownMnemonic(mnemonic.text.to_string()),
                mnemonic.span,
            )
        })?;
        let expected = forms.first().map_or(0, |opcode| opcode.arity());
        if args.len() != expected {
            return Err(self.error(
                AssembleErrorKind::Arity {
                    mnemonic: mnemonic.text.to_string(),
                    expected,
                    found: args.len(),
                },
                mnemonic.span,
            ));
        }
        let invalid = |span| {
            self.error(
                AssembleErrorKind::InvalidOperand {
                    mnemonic: mnemonic.text.to_string(),
                    found: args.iter().map(|arg| arg.text).collect::<Vec<_>>().join(", "),
                },
                span,
            )
        };
        let operands = args
            .iter()
            .map(|arg| {
                parse_operand(arg.text)
                    .map(|operand| (operand, arg.span))
                    .ok_or_else(|| invalid(arg.span))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let kinds: Vec<_> = operands.iter().map(|(operand, _)| operand.kind()).collect();
        let opcode = isa::select(mnemonic.text, &kinds).ok_or_else(|| invalid(mnemonic.span))?;
        Ok(Item::Instruction { opcode, operands })
    }
}

/// Assembles text that has no file attached.
pub fn assemble(text: &str) -> Result<Bytecode, AssembleError> {
    Assembler::new(&SourceMetadata::new(text)).assemble()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Position;

    fn kind_of(text: &str) -> Option<AssembleErrorKind> {
        assemble(text).err().map(|err| err.kind)
    }

    #[test]
    fn encodes_both_operand_forms() -> Result<(), AssembleError> {
        let code = assemble("mov sp, 10\nmov r0 sp\nadd r15, -2\nhalt")?;
        assert_eq!(code.words(), &[2, 0, 10, 1, 1, 0, 4, 16, -2, 0]);
        Ok(())
    }

    #[test]
    fn labels_resolve_to_code_offsets() -> Result<(), AssembleError> {
        let text = "\
start:
    cmp      r0, 0          # compare
    jeq      end
    jmp      start
end: halt
";
        let code = assemble(text)?;
        assert_eq!(code.words(), &[20, 1, 0, 25, 7, 23, 0, 0]);
        Ok(())
    }

    #[test]
    fn statics_get_sequential_addresses() -> Result<(), AssembleError> {
        let text = ".static str.0 6\n.static static.total 2\nmov r0, static.total\nmov r1, str.0";
        let code = assemble(text)?;
        assert_eq!(code.words(), &[2, 1, 6, 2, 2, 0]);
        Ok(())
    }

    #[test]
    fn labels_can_be_used_before_definition() -> Result<(), AssembleError> {
        let code = assemble("memwrite sp, .L0\n.L0:\nhalt")?;
        assert_eq!(code.words(), &[33, 0, 3, 0]);
        Ok(())
    }

    #[test]
    fn reports_the_offending_line() {
        let err = assemble("halt\n\n  frob r0").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::UnknownMnemonic("frob".into()));
        assert_eq!(err.position(), Some(Position { line: 3, col: 3 }));

        let err = assemble("halt\nmov r0, nowhere").unwrap_err();
        assert_eq!(err.kind, AssembleErrorKind::UndefinedLabel("nowhere".into()));
        assert_eq!(err.position(), Some(Position { line: 2, col: 9 }));
    }

    #[test]
    fn rejects_bad_instructions() {
        assert_eq!(
            kind_of("add r0"),
            Some(AssembleErrorKind::Arity {
                mnemonic: "add".into(),
                expected: 2,
                found: 1
            })
        );
        assert!(matches!(
            kind_of("memread r0, 4"),
            Some(AssembleErrorKind::InvalidOperand { .. })
        ));
        assert!(matches!(
            kind_of("mov r16, 1"),
            Some(AssembleErrorKind::InvalidOperand { .. })
        ));
        assert!(matches!(
            kind_of("mov r0, 1+2"),
            Some(AssembleErrorKind::InvalidOperand { .. })
        ));
    }

    #[test]
    fn rejects_bad_symbols() {
        assert_eq!(
            kind_of("a:\nhalt\na:"),
            Some(AssembleErrorKind::DuplicateLabel("a".into()))
        );
        assert_eq!(
            kind_of(".static x 1\nx:"),
            Some(AssembleErrorKind::DuplicateLabel("x".into()))
        );
        assert!(matches!(
            kind_of(".static x"),
            Some(AssembleErrorKind::MalformedDirective(_))
        ));
        assert!(matches!(
            kind_of(".static x many"),
            Some(AssembleErrorKind::MalformedDirective(_))
        ));
    }

    #[test]
    fn empty_text_is_empty_code() -> Result<(), AssembleError> {
        assert!(assemble("# nothing\n\n")?.is_empty());
        Ok(())
    }
}
