//! Code generation: walks the checked syntax tree and emits stack-machine
//! assembly.
//!
//! Every expression leaves its value on top of the operand stack: generating
//! an expression of type `T` moves `sp` up by exactly `T::length()` words.
//! Everything else (arguments, operands, assigned values) is built on that.
use crate::assembly::{Assembly, Directive, Instruction, Register};
use crate::ast::{Expr, Function, Program};
use crate::error::{SourceMetadata, Span};
use crate::types::{
    FunctionRef, FunctionTypeRepository, SType, TypeError, TypeErrorKind, TypeIdentifier,
    UserTypeRepository,
};

mod expr;
pub mod labels;
mod lvalue;
pub mod output;
pub mod registers;
pub mod stack;
mod statement;
pub mod strings;

pub use labels::LabelGenerator;
pub use output::AssemblyOutput;
use registers::{RegisterManager, ScratchRegister};
use stack::{StackFrame, StaticVariable};
use strings::StringPool;

pub type CodegenResult<T = AssemblyOutput> = Result<T, TypeError>;

const SP: Register = Register::StackPointer;

/// What a `return` means where the code is generated.
#[derive(Debug)]
enum Context {
    /// Top-level statements: `return` stops the machine
    TopLevel,
    Function { name: String, return_type: SType },
}

/// Generator for one body of code: the top-level statements or a function.
pub struct FunctionGenerator<'a> {
    user_types: &'a UserTypeRepository,
    functions: &'a FunctionTypeRepository,
    strings: &'a StringPool<'a>,
    labels: &'a mut LabelGenerator,
    meta: &'a SourceMetadata<'a>,
    frame: StackFrame,
    registers: RegisterManager,
    context: Context,
}

/// Compiles a whole program to assembly.
pub fn compile_program(program: &Program, meta: &SourceMetadata) -> CodegenResult {
    let user_types = UserTypeRepository::from_declarations(&program.structs, meta)?;
    let functions = FunctionTypeRepository::from_program(program, &user_types, meta)?;
    let strings = StringPool::collect(program);
    let statics = static_variables(program, &user_types, meta)?;
    let mut labels = LabelGenerator::new();

    let mut out = AssemblyOutput::new();
    for (label, string) in strings.iter() {
        out.push(Directive::Static {
            label: label.clone(),
            words: 1 + string.chars().count(),
        });
    }
    for variable in &statics {
        out.push(Directive::Static {
            label: variable.label.clone(),
            words: variable.ty.length(),
        });
    }
    let static_words = strings.words() + statics.iter().map(|v| v.ty.length()).sum::<usize>();
    out.push(Instruction::mov(SP, static_words as i32).with_comment("stack starts after statics"));

    {
        let mut main = FunctionGenerator {
            user_types: &user_types,
            functions: &functions,
            strings: &strings,
            labels: &mut labels,
            meta,
            frame: StackFrame::new(&statics),
            registers: RegisterManager::new(),
            context: Context::TopLevel,
        };
        out.append(main.string_initialisation()?);
        for decl in program.statics.iter() {
            if let Some((init, span)) = &decl.init {
                out.append(main.static_initialiser(decl.name.source, init, *span)?);
            }
        }
        for (statement, span) in &program.body {
            out.append(main.statement(statement, *span)?);
        }
    }
    out.push(Instruction::Halt);

    for function in &program.functions {
        let reference = FunctionRef::Free(function.name.source.to_string());
        out.append(compile_function(
            &user_types,
            &functions,
            &strings,
            &mut labels,
            meta,
            &statics,
            reference,
            function,
        )?);
    }
    for decl in &program.structs {
        for method in &decl.methods {
            let reference = FunctionRef::Method {
                owner: decl.name.source.to_string(),
                name: method.name.source.to_string(),
            };
            out.append(compile_function(
                &user_types,
                &functions,
                &strings,
                &mut labels,
                meta,
                &statics,
                reference,
                method,
            )?);
        }
    }
    tracing::debug!(target: "codegen", "generated {} assembly items", out.len());
    Ok(out)
}

fn static_variables(
    program: &Program,
    user_types: &UserTypeRepository,
    meta: &SourceMetadata,
) -> CodegenResult<Vec<StaticVariable>> {
    let mut statics: Vec<StaticVariable> = Vec::with_capacity(program.statics.len());
    for decl in &program.statics {
        let name = decl.name.source;
        if statics.iter().any(|existing| existing.name == name) {
            return Err(TypeError::new(TypeErrorKind::Redeclared(name.to_string()))
                .with_source(decl.name.span, meta));
        }
        let ty = user_types
            .resolve(&decl.ty)
            .map_err(|kind| TypeError::new(kind).with_source(decl.ty.span, meta))?;
        if ty == SType::NoType {
            return Err(TypeError::new(TypeErrorKind::InvalidVariableType(ty.to_string()))
                .with_source(decl.ty.span, meta));
        }
        statics.push(StaticVariable::new(name, ty));
    }
    Ok(statics)
}

#[allow(clippy::too_many_arguments)]
fn compile_function(
    user_types: &UserTypeRepository,
    functions: &FunctionTypeRepository,
    strings: &StringPool,
    labels: &mut LabelGenerator,
    meta: &SourceMetadata,
    statics: &[StaticVariable],
    reference: FunctionRef,
    function: &Function,
) -> CodegenResult {
    let signature = functions.get(&reference).ok_or_else(|| {
        TypeError::new(TypeErrorKind::UnresolvedFunction(reference.to_string()))
            .with_source(function.name.span, meta)
    })?;
    let label = reference.label();
    tracing::debug!(target: "codegen::function", "generating {} as {}", reference, label);

    let returns_value = signature.return_type != SType::NoType;
    let always_returns = function
        .body
        .statements
        .iter()
        .any(|(statement, _)| statement.always_returns());
    if returns_value && !always_returns {
        return Err(TypeError::new(TypeErrorKind::MissingReturn(reference.to_string()))
            .with_source(function.name.span, meta));
    }

    let mut generator = FunctionGenerator {
        user_types,
        functions,
        strings,
        labels,
        meta,
        frame: StackFrame::for_function(statics, signature),
        registers: RegisterManager::new(),
        context: Context::Function {
            name: reference.to_string(),
            return_type: signature.return_type.clone(),
        },
    };
    let mut out = AssemblyOutput::from(Assembly::Label(label));
    out.append(generator.block(&function.body.statements)?);
    if !always_returns {
        out.append(generator.return_statement(None, function.name.span)?);
    }
    Ok(out)
}

impl<'a> FunctionGenerator<'a> {
    fn types(&self) -> TypeIdentifier<'_> {
        TypeIdentifier {
            user_types: self.user_types,
            functions: self.functions,
            frame: &self.frame,
            meta: self.meta,
        }
    }

    fn error(&self, kind: TypeErrorKind, span: Span) -> TypeError {
        TypeError::new(kind).with_source(span, self.meta)
    }

    fn acquire(&self, span: Span) -> CodegenResult<ScratchRegister> {
        self.registers.acquire().map_err(|kind| self.error(kind, span))
    }

    /// Moves `sp` up, keeping the frame in step.
    fn push_words(&mut self, out: &mut AssemblyOutput, words: usize) {
        if words > 0 {
            out.push(Instruction::add(SP, words as i32));
            self.frame.pushed_words(words);
        }
    }

    fn pop_words(&mut self, out: &mut AssemblyOutput, words: usize) {
        if words > 0 {
            out.push(Instruction::sub(SP, words as i32));
            self.frame.popped_words(words);
        }
    }

    /// Pushes `words` words read from the address in `source`, advancing it.
    fn push_copy(&mut self, out: &mut AssemblyOutput, source: Register, words: usize) {
        for _ in 0..words {
            out.push(Instruction::MemCopy {
                destination: SP,
                source,
            })
            .push(Instruction::add(source, 1))
            .push(Instruction::add(SP, 1));
        }
        self.frame.pushed_words(words);
    }

    /// Pops the one-word value on top of the stack into a fresh register.
    fn pop_to_register(&mut self, out: &mut AssemblyOutput, span: Span) -> CodegenResult<ScratchRegister> {
        self.pop_words(out, 1);
        let register = self.acquire(span)?;
        out.push(Instruction::MemRead {
            target: *register,
            address: SP,
        });
        Ok(register)
    }

    /// Pops the two one-word operands of a binary operator, left one first
    /// in register order.
    fn pop_operands(
        &mut self,
        out: &mut AssemblyOutput,
        lhs_span: Span,
        rhs_span: Span,
    ) -> CodegenResult<(ScratchRegister, ScratchRegister)> {
        let left = self.acquire(lhs_span)?;
        let right = self.acquire(rhs_span)?;
        for register in [&right, &left] {
            self.pop_words(out, 1);
            out.push(Instruction::MemRead {
                target: **register,
                address: SP,
            });
        }
        Ok((left, right))
    }

    fn string_initialisation(&mut self) -> CodegenResult {
        let mut out = AssemblyOutput::new();
        if self.strings.words() == 0 {
            return Ok(out);
        }
        let cursor = self.acquire(Span::default())?;
        for (label, string) in self.strings.iter() {
            out.push_commented(Instruction::mov(*cursor, label.clone()), format!("{:?}", string))
                .push(Instruction::mem_write(*cursor, string.chars().count() as i32));
            for ch in string.chars() {
                out.push(Instruction::add(*cursor, 1))
                    .push(Instruction::mem_write(*cursor, ch as i32));
            }
        }
        Ok(out)
    }

    fn static_initialiser(&mut self, name: &str, init: &Expr, span: Span) -> CodegenResult {
        let (ty, label) = match self.frame.lookup(name) {
            Some((ty, stack::Location::Static(label))) => (ty.clone(), label),
            _ => return Err(self.error(TypeErrorKind::UnknownIdentifier(name.to_string()), span)),
        };
        let value_ty = self.types().identify(init, span)?;
        if !ty.accepts(&value_ty) {
            return Err(self.error(TypeErrorKind::mismatch(&ty, &value_ty), span));
        }
        let mut out = self.expr(init, span)?;
        let words = ty.length();
        self.pop_words(&mut out, words);
        let destination = self.acquire(span)?;
        let source = self.acquire(span)?;
        out.push_commented(Instruction::mov(*destination, label), format!("static {}", name))
            .push(Instruction::mov(*source, SP));
        for _ in 0..words {
            out.push(Instruction::MemCopy {
                destination: *destination,
                source: *source,
            })
            .push(Instruction::add(*destination, 1))
            .push(Instruction::add(*source, 1));
        }
        Ok(out)
    }
}
