use super::registers::ScratchRegister;
use super::stack::Location;
use super::{AssemblyOutput, CodegenResult, FunctionGenerator, SP};
use crate::assembly::Instruction;
use crate::ast::Expr;
use crate::error::Span;
use crate::types::{AddressabilityChecker, SType, TypeErrorKind};

impl FunctionGenerator<'_> {
    /// Computes the address `expr` names into a register. The stack is left as it was.
    pub(super) fn lvalue(
        &mut self,
        expr: &Expr,
        span: Span,
    ) -> CodegenResult<(AssemblyOutput, ScratchRegister)> {
        if !AddressabilityChecker::is_addressable(expr) {
            return Err(self.error(TypeErrorKind::NotAddressable, span));
        }
        let mut out = AssemblyOutput::new();
        match expr {
            Expr::Variable(name) => {
                let location = self
                    .frame
                    .lookup(name)
                    .map(|(_, location)| location)
                    .ok_or_else(|| {
                        self.error(TypeErrorKind::UnknownIdentifier(name.to_string()), span)
                    })?;
                let address = self.acquire(span)?;
                match location {
                    Location::Stack(offset) => {
                        out.push_commented(Instruction::mov(*address, SP), format!("&{}", name))
                            .push(Instruction::add(*address, offset as i32));
                    }
                    Location::Static(label) => {
                        out.push_commented(Instruction::mov(*address, label), format!("&{}", name));
                    }
                }
                Ok((out, address))
            }
            Expr::Field { base, field } => {
                let base_ty = self.types().identify(&base.0, base.1)?;
                let offset = match &base_ty {
                    SType::User(user) => user
                        .field(field.source)
                        .map(|f| f.offset)
                        .ok_or_else(|| TypeErrorKind::UnknownField {
                            ty: user.name.clone(),
                            field: field.source.to_string(),
                        }),
                    other => Err(TypeErrorKind::FieldOfNonStruct {
                        ty: other.to_string(),
                        field: field.source.to_string(),
                    }),
                }
                .map_err(|kind| self.error(kind, field.span))?;
                let (base_code, address) = self.lvalue(&base.0, base.1)?;
                out.append(base_code);
                if offset != 0 {
                    out.push_commented(
                        Instruction::add(*address, offset as i32),
                        format!(".{}", field.source),
                    );
                }
                Ok((out, address))
            }
            Expr::Dereference(inner) => {
                let pointer_ty = self.types().identify(&inner.0, inner.1)?;
                if pointer_ty.pointee().is_none() {
                    return Err(self.error(
                        TypeErrorKind::DerefNonReference(pointer_ty.to_string()),
                        span,
                    ));
                }
                out.append(self.expr(&inner.0, inner.1)?);
                let address = self.pop_to_register(&mut out, inner.1)?;
                Ok((out, address))
            }
            _ => Err(self.error(TypeErrorKind::NotAddressable, span)),
        }
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
    fn field_addresses_add_the_offset() -> Result<(), TypeErrorKind> {
        let text = generate("struct V { int x; int y; int z; } V v; v.z = 9;")?;
        assert!(text.contains("add      r0, -3"), "{text}");
        assert!(text.contains("add      r0, 2"), "{text}");
        assert!(text.contains("memcopy  r0, sp"), "{text}");
        Ok(())
    }

    #[test]
    fn statics_are_addressed_by_label() -> Result<(), TypeErrorKind> {
        let text = generate("static int total; total = 4;")?;
        assert!(text.contains("mov      r0, static.total"), "{text}");
        Ok(())
    }

    #[test]
    fn pointers_are_followed() -> Result<(), TypeErrorKind> {
        let text = generate("int a = 1; int& p = a&; p@ = 5; return a;")?;
        assert!(text.contains("memread  r0, sp"), "{text}");
        Ok(())
    }

    #[test]
    fn literals_have_no_address() {
        assert_eq!(generate("4 = 5;"), Err(TypeErrorKind::NotAddressable));
        assert_eq!(generate("int a; (a + 1)& ;"), Err(TypeErrorKind::NotAddressable));
    }
}
