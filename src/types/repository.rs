use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{SType, TypeError, TypeErrorKind, UserType};
use crate::assembly::Label;
use crate::ast::{Function, Program, StructDecl, TypeName};
use crate::error::{SourceMetadata, Span};

/// Every struct declared by a program, by name.
#[derive(Debug, Default)]
pub struct UserTypeRepository {
    types: HashMap<String, Rc<UserType>>,
}

fn located(kind: TypeErrorKind, span: Span, meta: &SourceMetadata) -> TypeError {
    TypeError::new(kind).with_source(span, meta)
}

impl UserTypeRepository {
    /// Structs are registered in order; a field can only use the structs declared
    /// before, or a reference to the struct it belongs to.
    pub fn from_declarations(
        structs: &[StructDecl],
        meta: &SourceMetadata,
    ) -> Result<Self, TypeError> {
        let mut repository = Self::default();
        for decl in structs {
            let name = decl.name.source;
            if repository.types.contains_key(name) {
                return Err(located(
                    TypeErrorKind::Redeclared(name.to_string()),
                    decl.name.span,
                    meta,
                ));
            }
            let user = Rc::new(UserType::declared(name));
            repository.types.insert(name.to_string(), Rc::clone(&user));
            let mut fields: Vec<(String, SType)> = Vec::with_capacity(decl.fields.len());
            for (ty, field) in &decl.fields {
                if fields.iter().any(|(existing, _)| existing == field.source) {
                    return Err(located(
                        TypeErrorKind::Redeclared(field.source.to_string()),
                        field.span,
                        meta,
                    ));
                }
                let resolved = repository
                    .resolve(ty)
                    .map_err(|kind| located(kind, ty.span, meta))?;
                if matches!(&resolved, SType::User(inner) if Rc::ptr_eq(inner, &user)) {
                    return Err(located(
                        TypeErrorKind::RecursiveType(name.to_string()),
                        ty.span,
                        meta,
                    ));
                }
                if resolved == SType::NoType {
                    return Err(located(
                        TypeErrorKind::InvalidVariableType(resolved.to_string()),
                        ty.span,
                        meta,
                    ));
                }
                fields.push((field.source.to_string(), resolved));
            }
            tracing::trace!(target: "types::user", "struct {name} has fields {fields:?}");
            user.define(fields);
        }
        Ok(repository)
    }

    pub fn get(&self, name: &str) -> Option<&Rc<UserType>> {
        self.types.get(name)
    }

    /// A builtin or declared type by its bare name.
    pub fn base_type(&self, name: &str) -> Option<SType> {
        match name {
            "int" => Some(SType::Integer),
            "float" => Some(SType::Float),
            "ptr" => Some(SType::GenericPointer),
            "void" => Some(SType::NoType),
            other => self.types.get(other).cloned().map(SType::User),
        }
    }

    pub fn resolve(&self, ty: &TypeName) -> Result<SType, TypeErrorKind> {
        let base = self
            .base_type(ty.name)
            .ok_or_else(|| TypeErrorKind::UnknownType(ty.name.to_string()))?;
        if base == SType::NoType && ty.references > 0 {
            return Err(TypeErrorKind::InvalidVariableType(format!(
                "{}{}",
                base,
                "&".repeat(ty.references)
            )));
        }
        Ok((0..ty.references).fold(base, |ty, _| ty.reference()))
    }
}

impl Drop for UserTypeRepository {
    fn drop(&mut self) {
        for user in self.types.values() {
            user.forget_fields();
        }
    }
}

/// How a call names its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionRef {
    Free(String),
    Method { owner: String, name: String },
}

impl FunctionRef {
    pub fn label(&self) -> Label {
        match self {
            Self::Free(name) => Label::function(name),
            Self::Method { owner, name } => Label::method(owner, name),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Free(name) => f.write_str(name),
            Self::Method { owner, name } => write!(f, "{}.{}", owner, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<(String, SType)>,
    pub return_type: SType,
    /// Type of the implicit `this` of methods, a reference to the owner
    pub receiver: Option<SType>,
}

impl FunctionSignature {
    pub fn argument_words(&self) -> usize {
        self.params.iter().map(|(_, ty)| ty.length()).sum()
    }
}

#[derive(Debug, Default)]
pub struct FunctionTypeRepository {
    functions: HashMap<FunctionRef, FunctionSignature>,
}

impl FunctionTypeRepository {
    pub fn from_program(
        program: &Program,
        user_types: &UserTypeRepository,
        meta: &SourceMetadata,
    ) -> Result<Self, TypeError> {
        let mut repository = Self::default();
        for function in &program.functions {
            let key = FunctionRef::Free(function.name.source.to_string());
            repository.declare(key, None, function, user_types, meta)?;
        }
        for decl in &program.structs {
            let owner = user_types.get(decl.name.source).cloned().ok_or_else(|| {
                located(
                    TypeErrorKind::UnknownType(decl.name.source.to_string()),
                    decl.name.span,
                    meta,
                )
            })?;
            let receiver = SType::User(owner).reference();
            for method in &decl.methods {
                let key = FunctionRef::Method {
                    owner: decl.name.source.to_string(),
                    name: method.name.source.to_string(),
                };
                repository.declare(key, Some(receiver.clone()), method, user_types, meta)?;
            }
        }
        Ok(repository)
    }

    fn declare(
        &mut self,
        key: FunctionRef,
        receiver: Option<SType>,
        function: &Function,
        user_types: &UserTypeRepository,
        meta: &SourceMetadata,
    ) -> Result<(), TypeError> {
        if self.functions.contains_key(&key) {
            return Err(located(
                TypeErrorKind::Redeclared(key.to_string()),
                function.name.span,
                meta,
            ));
        }
        let return_type = user_types
            .resolve(&function.return_type)
            .map_err(|kind| located(kind, function.return_type.span, meta))?;
        let mut params: Vec<(String, SType)> = Vec::with_capacity(function.params.len());
        for (ty, name) in &function.params {
            let taken = params.iter().any(|(existing, _)| existing == name.source)
                || (receiver.is_some() && name.source == "this");
            if taken {
                return Err(located(
                    TypeErrorKind::Redeclared(name.source.to_string()),
                    name.span,
                    meta,
                ));
            }
            let resolved = user_types
                .resolve(ty)
                .map_err(|kind| located(kind, ty.span, meta))?;
            if resolved == SType::NoType {
                return Err(located(
                    TypeErrorKind::InvalidVariableType(resolved.to_string()),
                    ty.span,
                    meta,
                ));
            }
            params.push((name.source.to_string(), resolved));
        }
        tracing::trace!(target: "types::function", "{key}: {params:?} -> {return_type}");
        self.functions.insert(
            key,
            FunctionSignature {
                params,
                return_type,
                receiver,
            },
        );
        Ok(())
    }

    pub fn get(&self, function: &FunctionRef) -> Option<&FunctionSignature> {
        self.functions.get(function)
    }
}
