use super::stack::Location;
use super::{AssemblyOutput, CodegenResult, FunctionGenerator, SP};
use crate::assembly::{Assembly, Condition, Data, Instruction, NumKind, Register};
use crate::ast::{ArithmeticOp, BinaryOp, Expr, LogicOp, RelationalOp, UnaryOp};
use crate::error::Span;
use crate::types::{SType, TypeErrorKind};

fn num_kind(ty: &SType) -> NumKind {
    if *ty == SType::Float {
        NumKind::Float
    } else {
        NumKind::Integer
    }
}

pub(super) fn arithmetic_instruction(
    op: ArithmeticOp,
    target: Register,
    rhs: impl Into<Data>,
    kind: NumKind,
) -> Instruction {
    let rhs = rhs.into();
    match op {
        ArithmeticOp::Add => Instruction::Add { target, rhs, kind },
        ArithmeticOp::Sub => Instruction::Sub { target, rhs, kind },
        ArithmeticOp::Mul => Instruction::Mul { target, rhs, kind },
        ArithmeticOp::Div => Instruction::Div { target, rhs, kind },
    }
}

/// Compares `value` against zero, as a float when `ty` is one.
pub(super) fn zero_test(value: Register, ty: &SType) -> Instruction {
    Instruction::Cmp {
        lhs: value,
        rhs: 0.into(),
        kind: num_kind(ty),
    }
}

const fn condition(op: RelationalOp) -> Condition {
    match op {
        RelationalOp::Equals => Condition::Equals,
        RelationalOp::NotEquals => Condition::NotEquals,
        RelationalOp::Greater => Condition::Greater,
        RelationalOp::Less => Condition::Less,
        RelationalOp::GreaterEqual => Condition::GreaterEqual,
        RelationalOp::LessEqual => Condition::LessEqual,
    }
}

impl FunctionGenerator<'_> {
    /// Generates `expr`, leaving its value on top of the stack.
    pub(super) fn expr(&mut self, expr: &Expr, span: Span) -> CodegenResult {
        let ty = self.types().identify(expr, span)?;
        let mut out = AssemblyOutput::new();
        match expr {
            Expr::Integer(value) => self.push_immediate(&mut out, *value),
            Expr::Float(value) => self.push_immediate(&mut out, value.to_bits() as i32),
            Expr::String(string) => {
                let label = self.strings.label(string).cloned().ok_or_else(|| {
                    self.error(TypeErrorKind::UnknownIdentifier(string.to_string()), span)
                })?;
                out.push(Instruction::mem_write(SP, label));
                self.push_words(&mut out, 1);
            }
            Expr::SizeOf(inner) => {
                let words = match self.types().size_of_type_name(expr) {
                    Some(words) => words,
                    None => self.types().identify(&inner.0, inner.1)?.length(),
                };
                self.push_immediate(&mut out, words as i32);
            }
            Expr::Variable(name) => {
                let location = self
                    .frame
                    .lookup(name)
                    .map(|(_, location)| location)
                    .ok_or_else(|| {
                        self.error(TypeErrorKind::UnknownIdentifier(name.to_string()), span)
                    })?;
                let cursor = self.acquire(span)?;
                match location {
                    Location::Stack(offset) => {
                        out.push_commented(Instruction::mov(*cursor, SP), format!("read {}", name))
                            .push(Instruction::add(*cursor, offset as i32));
                    }
                    Location::Static(label) => {
                        out.push_commented(Instruction::mov(*cursor, label), format!("read {}", name));
                    }
                }
                self.push_copy(&mut out, *cursor, ty.length());
            }
            Expr::Call { function, args } => {
                out.append(self.call(function, args, span)?);
            }
            Expr::Binary { operator, lhs, rhs } => match operator {
                BinaryOp::Arithmetic(op) => {
                    let kind = num_kind(&ty);
                    out.append(self.expr(&lhs.0, lhs.1)?);
                    out.append(self.expr(&rhs.0, rhs.1)?);
                    let (left, right) = self.pop_operands(&mut out, lhs.1, rhs.1)?;
                    out.push(arithmetic_instruction(*op, *left, *right, kind))
                        .push(Instruction::mem_write(SP, *left));
                    self.push_words(&mut out, 1);
                }
                BinaryOp::Relational(op) => {
                    let kind = num_kind(&self.types().identify(&lhs.0, lhs.1)?);
                    out.append(self.expr(&lhs.0, lhs.1)?);
                    out.append(self.expr(&rhs.0, rhs.1)?);
                    let (left, right) = self.pop_operands(&mut out, lhs.1, rhs.1)?;
                    out.push(Instruction::Cmp {
                        lhs: *left,
                        rhs: (*right).into(),
                        kind,
                    });
                    drop((left, right));
                    self.materialise_condition(&mut out, condition(*op));
                }
                BinaryOp::Logic(op) => {
                    out.append(self.logic(*op, lhs, rhs)?);
                }
            },
            Expr::Unary { operator, expr: inner } => {
                out.append(self.expr(&inner.0, inner.1)?);
                let value = self.pop_to_register(&mut out, inner.1)?;
                match operator {
                    UnaryOp::Negate => {
                        let minus_one = match ty {
                            SType::Float => (-1.0f32).to_bits() as i32,
                            _ => -1,
                        };
                        out.push(Instruction::Mul {
                            target: *value,
                            rhs: minus_one.into(),
                            kind: num_kind(&ty),
                        })
                        .push(Instruction::mem_write(SP, *value));
                        self.push_words(&mut out, 1);
                    }
                    UnaryOp::Not => {
                        let operand_ty = self.types().identify(&inner.0, inner.1)?;
                        out.push(zero_test(*value, &operand_ty));
                        drop(value);
                        self.materialise_condition(&mut out, Condition::Equals);
                    }
                }
            }
            Expr::Assign {
                operator,
                destination,
                value,
            } => {
                out.append(self.assign(*operator, destination, value, &ty)?);
            }
            Expr::Field { base, field } => {
                let base_ty = self.types().identify(&base.0, base.1)?;
                let offset = match &base_ty {
                    SType::User(user) => user.field(field.source).map(|f| f.offset),
                    _ => None,
                }
                .ok_or_else(|| {
                    self.error(
                        TypeErrorKind::FieldOfNonStruct {
                            ty: base_ty.to_string(),
                            field: field.source.to_string(),
                        },
                        field.span,
                    )
                })?;
                // materialise the whole struct, then keep only the field
                out.append(self.expr(&base.0, base.1)?);
                self.pop_words(&mut out, base_ty.length());
                let cursor = self.acquire(span)?;
                out.push_commented(Instruction::mov(*cursor, SP), format!(".{}", field.source));
                if offset != 0 {
                    out.push(Instruction::add(*cursor, offset as i32));
                }
                self.push_copy(&mut out, *cursor, ty.length());
            }
            Expr::AddressOf(inner) => {
                let (address_code, address) = self.lvalue(&inner.0, inner.1)?;
                out.append(address_code);
                out.push(Instruction::mem_write(SP, *address));
                self.push_words(&mut out, 1);
            }
            Expr::Dereference(inner) => {
                out.append(self.expr(&inner.0, inner.1)?);
                let cursor = self.pop_to_register(&mut out, inner.1)?;
                self.push_copy(&mut out, *cursor, ty.length());
            }
        }
        Ok(out)
    }

    fn push_immediate(&mut self, out: &mut AssemblyOutput, value: i32) {
        out.push(Instruction::mem_write(SP, value));
        self.push_words(out, 1);
    }

    /// Pushes 1 if the last comparison satisfied `condition` and 0 otherwise.
    fn materialise_condition(&mut self, out: &mut AssemblyOutput, condition: Condition) {
        let truthy = self.labels.new_label();
        let end = self.labels.new_label();
        out.push(Instruction::Branch {
            condition,
            label: truthy.clone(),
        })
        .push(Instruction::mem_write(SP, 0))
        .push(Instruction::Jmp {
            target: end.clone().into(),
        })
        .push(Assembly::Label(truthy))
        .push(Instruction::mem_write(SP, 1))
        .push(Assembly::Label(end));
        self.push_words(out, 1);
    }

    // the right operand only runs when the left one doesn't decide the result
    fn logic(
        &mut self,
        op: LogicOp,
        lhs: &(Box<Expr>, Span),
        rhs: &(Box<Expr>, Span),
    ) -> CodegenResult {
        let (deciding, decided_value) = match op {
            LogicOp::And => (Condition::Equals, 0),
            LogicOp::Or => (Condition::NotEquals, 1),
        };
        let decided = self.labels.new_label();
        let end = self.labels.new_label();
        let mut out = AssemblyOutput::new();
        for (operand, span) in [lhs, rhs] {
            let operand_ty = self.types().identify(operand, *span)?;
            out.append(self.expr(operand, *span)?);
            let value = self.pop_to_register(&mut out, *span)?;
            out.push(zero_test(*value, &operand_ty))
                .push(Instruction::Branch {
                condition: deciding,
                label: decided.clone(),
            });
        }
        out.push(Instruction::mem_write(SP, 1 - decided_value))
            .push(Instruction::Jmp {
                target: end.clone().into(),
            })
            .push(Assembly::Label(decided))
            .push(Instruction::mem_write(SP, decided_value))
            .push(Assembly::Label(end));
        self.push_words(&mut out, 1);
        Ok(out)
    }

    fn assign(
        &mut self,
        operator: Option<ArithmeticOp>,
        destination: &(Box<Expr>, Span),
        value: &(Box<Expr>, Span),
        ty: &SType,
    ) -> CodegenResult {
        let (mut out, target) = self.lvalue(&destination.0, destination.1)?;
        out.append(self.expr(&value.0, value.1)?);
        match operator {
            None => {
                // the value stays where it is, so `sp` walks back over it
                let words = ty.length();
                out.push(Instruction::sub(SP, words as i32));
                for _ in 0..words {
                    out.push(Instruction::MemCopy {
                        destination: *target,
                        source: SP,
                    })
                    .push(Instruction::add(*target, 1))
                    .push(Instruction::add(SP, 1));
                }
            }
            Some(op) => {
                let operand = self.pop_to_register(&mut out, value.1)?;
                let result = self.acquire(destination.1)?;
                out.push(Instruction::MemRead {
                    target: *result,
                    address: *target,
                })
                .push(arithmetic_instruction(op, *result, *operand, num_kind(ty)))
                .push(Instruction::mem_write(*target, *result))
                .push(Instruction::mem_write(SP, *result));
                self.push_words(&mut out, 1);
            }
        }
        Ok(out)
    }

    fn call(
        &mut self,
        callee: &(Box<Expr>, Span),
        args: &[(Expr, Span)],
        span: Span,
    ) -> CodegenResult {
        let (function, signature, receiver) = {
            let call = self.types().resolve_call(&callee.0, callee.1)?;
            (call.function, call.signature.clone(), call.receiver)
        };
        let return_words = signature.return_type.length();
        let saved = self.registers.live();
        tracing::trace!(target: "codegen::call", "call to {} saves {:?}", function, saved);

        let mut out = AssemblyOutput::new();
        for register in &saved {
            out.push_commented(Instruction::mem_write(SP, *register), format!("save {}", register));
            self.push_words(&mut out, 1);
        }
        if return_words > 0 {
            out.push_commented(
                Instruction::add(SP, return_words as i32),
                format!("room for {}", signature.return_type),
            );
            self.frame.pushed_words(return_words);
        }
        if let Some(receiver) = receiver {
            let (address_code, address) = self.lvalue(&receiver.0, receiver.1)?;
            out.append(address_code);
            out.push_commented(Instruction::mem_write(SP, *address), "this");
            self.push_words(&mut out, 1);
        }
        for (arg, arg_span) in args {
            out.append(self.expr(arg, *arg_span)?);
        }

        let return_label = self.labels.new_label();
        out.push(Instruction::mem_write(SP, return_label.clone()))
            .push(Instruction::add(SP, 1))
            .push_commented(
                Instruction::Jmp {
                    target: function.label().into(),
                },
                format!("call {}", function),
            )
            .push(Assembly::Label(return_label));

        for (_, ty) in signature.params.iter().rev() {
            self.pop_words(&mut out, ty.length());
        }
        if signature.receiver.is_some() {
            self.pop_words(&mut out, 1);
        }
        if !saved.is_empty() {
            // the result sits above the saved registers: restore them, then
            // slide the result down to where they were
            if return_words > 0 {
                out.push(Instruction::sub(SP, return_words as i32));
            }
            for register in saved.iter().rev() {
                self.frame.popped_words(1);
                out.push(Instruction::sub(SP, 1)).push_commented(
                    Instruction::MemRead {
                        target: *register,
                        address: SP,
                    },
                    format!("restore {}", register),
                );
            }
            if return_words > 0 {
                let cursor = self.acquire(span)?;
                out.push(Instruction::mov(*cursor, SP))
                    .push(Instruction::add(*cursor, saved.len() as i32));
                for _ in 0..return_words {
                    out.push(Instruction::MemCopy {
                        destination: SP,
                        source: *cursor,
                    })
                    .push(Instruction::add(SP, 1))
                    .push(Instruction::add(*cursor, 1));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::assembly::{Assembly, Instruction, Register};
    use crate::ast::Program;
    use crate::codegen::compile_program;
    use crate::error::SourceMetadata;
    use crate::grammar::Parser;
    use crate::types::TypeErrorKind;

    fn generate(source: &str) -> Result<String, TypeErrorKind> {
        let meta = SourceMetadata::new(source);
        let program: Program = Parser::new(&meta).parse().expect("test source parses");
        compile_program(&program, &meta)
            .map(|out| out.to_string())
            .map_err(|err| err.kind)
    }

    #[test]
    fn literal_pushes_one_word() -> Result<(), TypeErrorKind> {
        let text = generate("return 42;")?;
        let body: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(body, vec!["\tmemwrite sp, 42", "\tadd      sp, 1", "\thalt", "\thalt"]);
        Ok(())
    }

    #[test]
    fn floats_are_written_as_bits() -> Result<(), TypeErrorKind> {
        let text = generate("return 1.5;")?;
        assert!(text.contains(&format!("memwrite sp, {}", 1.5f32.to_bits() as i32)));
        Ok(())
    }

    #[test]
    fn variables_are_copied_word_by_word() -> Result<(), TypeErrorKind> {
        let text = generate("struct P { int x; int y; } P p; P q = p;")?;
        assert_eq!(text.matches("memcopy  sp, r0").count(), 2, "{text}");
        assert!(text.contains("add      r0, -2"), "{text}");
        Ok(())
    }

    fn saves_and_restores(source: &str) -> (Vec<String>, Vec<String>, Vec<Instruction>) {
        let meta = SourceMetadata::new(source);
        let program: Program = Parser::new(&meta).parse().expect("parses");
        let out = compile_program(&program, &meta).expect("compiles");
        let mut saves = Vec::new();
        let mut restores = Vec::new();
        for item in out.iter() {
            match item {
                Assembly::Instruction {
                    instruction: Instruction::MemWrite { source, .. },
                    comment: Some(comment),
                } if comment.starts_with("save") => saves.push(source.to_string()),
                Assembly::Instruction {
                    instruction: Instruction::MemRead { target, .. },
                    comment: Some(comment),
                } if comment.starts_with("restore") => restores.push(target.to_string()),
                _ => {}
            }
        }
        (saves, restores, out.instructions().cloned().collect())
    }

    #[test]
    fn saved_registers_are_restored_in_mirror_order() {
        let (saves, restores, instructions) = saves_and_restores(
            "func int id(int a) { return a; }
             struct P { int x; int y; }
             P p;
             p.y = id(7);",
        );
        assert_eq!(saves, vec!["r0"]);
        assert_eq!(restores, vec!["r0"]);
        assert!(instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::MemCopy {
                destination: Register::StackPointer,
                source: Register::General(1)
            }
        )));

        let (saves, restores, _) = saves_and_restores(
            "func int id(int a) { return a; }
             int a;
             int b;
             a = b = id(9);",
        );
        assert_eq!(saves, vec!["r0", "r1"]);
        assert_eq!(restores, vec!["r1", "r0"]);
    }

    #[test]
    fn comparisons_converge() -> Result<(), TypeErrorKind> {
        let text = generate("int x = 3; int y = 4; return x > y;")?;
        assert!(text.contains("cmp      r0, r1"), "{text}");
        assert!(text.contains("jgt      .L0"), "{text}");
        assert!(text.contains(".L1:"), "{text}");
        Ok(())
    }

    #[test]
    fn type_errors_surface() {
        assert_eq!(generate("return 4@;"), Err(TypeErrorKind::DerefNonReference("int".into())));
        assert_eq!(generate("return 4&;"), Err(TypeErrorKind::NotAddressable));
        assert_eq!(
            generate("return nope;"),
            Err(TypeErrorKind::UnknownIdentifier("nope".into()))
        );
        assert_eq!(
            generate("return go();"),
            Err(TypeErrorKind::UnresolvedFunction("go".into()))
        );
    }
}
