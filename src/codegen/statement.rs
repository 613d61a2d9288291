use super::expr::zero_test;
use super::{AssemblyOutput, CodegenResult, Context, FunctionGenerator, SP};
use crate::assembly::{Assembly, Condition, Instruction, Label};
use crate::ast::{Expr, Statement, TypeName};
use crate::error::Span;
use crate::grammar::lexer::Source;
use crate::types::{SType, TypeErrorKind};

impl FunctionGenerator<'_> {
    pub(super) fn statement(&mut self, statement: &Statement, span: Span) -> CodegenResult {
        match statement {
            Statement::Return(value) => self.return_statement(value.as_ref(), span),
            Statement::SingleExpr((expr, expr_span)) => {
                let ty = self.types().identify(expr, *expr_span)?;
                let mut out = self.expr(expr, *expr_span)?;
                self.pop_words(&mut out, ty.length());
                Ok(out)
            }
            Statement::DeclareVar { ty, name, init } => self.declaration(ty, name, init.as_ref()),
            Statement::Block(statements) => self.block(statements),
            Statement::If {
                condition,
                true_branch,
                false_branch,
            } => {
                let otherwise = self.labels.new_label();
                let mut out = self.condition(condition, &otherwise)?;
                out.append(self.scoped(&true_branch.0, true_branch.1)?);
                match false_branch {
                    Some((false_branch, false_span)) => {
                        let end = self.labels.new_label();
                        out.push(Instruction::Jmp {
                            target: end.clone().into(),
                        })
                        .push(Assembly::Label(otherwise));
                        out.append(self.scoped(false_branch, *false_span)?);
                        out.push(Assembly::Label(end));
                    }
                    None => {
                        out.push(Assembly::Label(otherwise));
                    }
                }
                Ok(out)
            }
            Statement::While { condition, body } => {
                let start = self.labels.new_label();
                let end = self.labels.new_label();
                let mut out = AssemblyOutput::from(Assembly::Label(start.clone()));
                out.append(self.condition(condition, &end)?);
                out.append(self.scoped(&body.0, body.1)?);
                out.push(Instruction::Jmp {
                    target: start.into(),
                })
                .push(Assembly::Label(end));
                Ok(out)
            }
        }
    }

    pub(super) fn block(&mut self, statements: &[(Statement, Span)]) -> CodegenResult {
        self.frame.enter_scope();
        let mut out = AssemblyOutput::new();
        for (statement, span) in statements {
            out.append(self.statement(statement, *span)?);
        }
        let words = self.frame.leave_scope();
        if words > 0 {
            out.push_commented(Instruction::sub(SP, words as i32), "end of scope");
        }
        Ok(out)
    }

    // a branch or loop body gets its own scope even without braces
    fn scoped(&mut self, statement: &Statement, span: Span) -> CodegenResult {
        match statement {
            Statement::Block(statements) => self.block(statements),
            _ => {
                self.frame.enter_scope();
                let mut out = self.statement(statement, span)?;
                let words = self.frame.leave_scope();
                if words > 0 {
                    out.push(Instruction::sub(SP, words as i32));
                }
                Ok(out)
            }
        }
    }

    /// Jumps to `otherwise` when the condition is 0.
    fn condition(
        &mut self,
        (condition, span): &(Expr, Span),
        otherwise: &Label,
    ) -> CodegenResult {
        let ty = self.types().identify(condition, *span)?;
        if ty.length() != 1 {
            return Err(self.error(TypeErrorKind::InvalidOperand(ty.to_string()), *span));
        }
        let mut out = self.expr(condition, *span)?;
        let value = self.pop_to_register(&mut out, *span)?;
        out.push(zero_test(*value, &ty)).push(Instruction::Branch {
            condition: Condition::Equals,
            label: otherwise.clone(),
        });
        Ok(out)
    }

    fn declaration(
        &mut self,
        ty: &TypeName,
        name: &Source,
        init: Option<&(Expr, Span)>,
    ) -> CodegenResult {
        let var_ty = self
            .user_types
            .resolve(ty)
            .map_err(|kind| self.error(kind, ty.span))?;
        if var_ty == SType::NoType {
            return Err(self.error(
                TypeErrorKind::InvalidVariableType(var_ty.to_string()),
                ty.span,
            ));
        }
        let mut out = AssemblyOutput::new();
        match init {
            Some((value, value_span)) => {
                let value_ty = self.types().identify(value, *value_span)?;
                if !var_ty.accepts(&value_ty) {
                    return Err(self.error(TypeErrorKind::mismatch(&var_ty, &value_ty), *value_span));
                }
                out.append(self.expr(value, *value_span)?);
            }
            None => {
                for _ in 0..var_ty.length() {
                    out.push(Instruction::mem_write(SP, 0))
                        .push(Instruction::add(SP, 1));
                }
                self.frame.pushed(&var_ty);
            }
        }
        self.frame
            .declare(name.source, var_ty)
            .map_err(|kind| self.error(kind, name.span))?;
        Ok(out)
    }

    /// `return` with an optional value. In a function the value is copied to
    /// the caller's return slot and control goes back to the return address.
    pub(super) fn return_statement(
        &mut self,
        value: Option<&(Expr, Span)>,
        span: Span,
    ) -> CodegenResult {
        let value_ty = match value {
            Some((expr, expr_span)) => self.types().identify(expr, *expr_span)?,
            None => SType::NoType,
        };
        let return_type = match &self.context {
            Context::TopLevel => None,
            Context::Function { return_type, .. } => Some(return_type.clone()),
        };
        let mut out = match value {
            Some((expr, expr_span)) => self.expr(expr, *expr_span)?,
            None => AssemblyOutput::new(),
        };
        let return_type = match return_type {
            None => {
                out.push(Instruction::Halt);
                self.frame.popped(&value_ty);
                return Ok(out);
            }
            Some(return_type) => return_type,
        };
        if !return_type.accepts(&value_ty) {
            let at = value.map_or(span, |(_, expr_span)| *expr_span);
            return Err(self.error(TypeErrorKind::mismatch(&return_type, &value_ty), at));
        }
        if let Context::Function { name, .. } = &self.context {
            tracing::trace!(target: "codegen::function", "return from {} at depth {}", name, self.frame.depth());
        }

        let words = return_type.length();
        if words > 0 {
            let slot = self
                .frame
                .return_slot_offset()
                .ok_or_else(|| self.error(TypeErrorKind::MissingReturn(String::new()), span))?;
            let destination = self.acquire(span)?;
            let source = self.acquire(span)?;
            out.push_commented(Instruction::mov(*destination, SP), "return value")
                .push(Instruction::add(*destination, slot as i32))
                .push(Instruction::mov(*source, SP))
                .push(Instruction::sub(*source, words as i32));
            for _ in 0..words {
                out.push(Instruction::MemCopy {
                    destination: *destination,
                    source: *source,
                })
                .push(Instruction::add(*destination, 1))
                .push(Instruction::add(*source, 1));
            }
        }
        // the return address is the word just below the frame
        let below_frame = self.frame.depth() + 1;
        let address = self.acquire(span)?;
        out.push(Instruction::mov(*address, SP))
            .push(Instruction::sub(*address, below_frame as i32))
            .push(Instruction::MemRead {
                target: *address,
                address: *address,
            })
            .push(Instruction::sub(SP, below_frame as i32))
            .push(Instruction::Jmp {
                target: (*address).into(),
            });
        self.frame.popped_words(words);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
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
    fn scopes_pop_their_locals() -> Result<(), TypeErrorKind> {
        let text = generate("{ int a = 1; float b; { int c; } }")?;
        assert_eq!(text.matches("end of scope").count(), 2, "{text}");
        assert!(text.contains("sub      sp, 2"), "{text}");
        Ok(())
    }

    #[test]
    fn expression_statements_drop_their_value() -> Result<(), TypeErrorKind> {
        let text = generate("1 + 2;")?;
        assert!(text.trim_end().ends_with("sub      sp, 1\n\thalt"), "{text}");
        Ok(())
    }

    #[test]
    fn loops_jump_back() -> Result<(), TypeErrorKind> {
        let text = generate("int i = 0; while (i < 3) i += 1;")?;
        assert!(text.contains(".L0:"), "{text}");
        assert!(text.contains("jmp      .L0"), "{text}");
        assert!(text.contains("jeq      .L1"), "{text}");
        Ok(())
    }

    #[test]
    fn float_conditions_compare_as_floats() -> Result<(), TypeErrorKind> {
        let text = generate("float f = 0.5; while (f) f = 0.0;")?;
        assert!(text.contains("fcmp     r0, 0"), "{text}");
        let text = generate("int i = 1; if (i) i = 0;")?;
        assert!(text.contains("cmp      r0, 0"), "{text}");
        assert!(!text.contains("fcmp"), "{text}");
        Ok(())
    }

    #[test]
    fn function_returns_through_its_frame() -> Result<(), TypeErrorKind> {
        let text = generate("func int first(int a, int b) { int c = a; return c; }")?;
        // [ret][a][b][return address] | [c][value]
        assert!(text.contains("add      r0, -6"), "{text}");
        assert!(text.contains("sub      r1, 1"), "{text}");
        assert!(text.contains("sub      r0, 3"), "{text}");
        assert!(text.contains("sub      sp, 3"), "{text}");
        assert!(text.contains("jmp      r0"), "{text}");
        Ok(())
    }

    #[test]
    fn return_type_is_checked() {
        assert_eq!(
            generate("func int f() { return 1.0; }"),
            Err(TypeErrorKind::Mismatch {
                expected: "int".into(),
                found: "float".into()
            })
        );
        assert_eq!(
            generate("func void f() { return 1; }"),
            Err(TypeErrorKind::Mismatch {
                expected: "void".into(),
                found: "int".into()
            })
        );
    }

    #[test]
    fn declarations_are_checked() {
        assert_eq!(
            generate("int a = 1.5;"),
            Err(TypeErrorKind::Mismatch {
                expected: "int".into(),
                found: "float".into()
            })
        );
        assert_eq!(
            generate("int a; int a;"),
            Err(TypeErrorKind::Redeclared("a".into()))
        );
        assert_eq!(
            generate("while (1) int a = 1.0;"),
            Err(TypeErrorKind::Mismatch {
                expected: "int".into(),
                found: "float".into()
            })
        );
    }
}
