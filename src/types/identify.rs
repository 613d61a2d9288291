use super::{
    FunctionRef, FunctionSignature, FunctionTypeRepository, SType, TypeError, TypeErrorKind,
    UserTypeRepository,
};
use crate::ast::{ArithmeticOp, BinaryOp, Expr, UnaryOp};
use crate::codegen::stack::StackFrame;
use crate::error::{SourceMetadata, Span};

/// Decides whether an expression names a storage location.
pub struct AddressabilityChecker;

impl AddressabilityChecker {
    /// Variables, fields of addressable values and dereferences have an address;
    /// literals, operator results and call results don't.
    pub fn is_addressable(expr: &Expr) -> bool {
        match expr {
            Expr::Variable(_) | Expr::Dereference(_) => true,
            Expr::Field { base, .. } => Self::is_addressable(&base.0),
            Expr::Integer(_)
            | Expr::Float(_)
            | Expr::String(_)
            | Expr::Call { .. }
            | Expr::Binary { .. }
            | Expr::Unary { .. }
            | Expr::Assign { .. }
            | Expr::AddressOf(_)
            | Expr::SizeOf(_) => false,
        }
    }
}

/// A call with its target looked up.
pub struct ResolvedCall<'t, 'e, 's> {
    pub function: FunctionRef,
    pub signature: &'t FunctionSignature,
    /// The value a method is called on
    pub receiver: Option<&'e (Box<Expr<'s>>, Span)>,
}

/// Computes the static type of expressions, checking them on the way.
pub struct TypeIdentifier<'t> {
    pub user_types: &'t UserTypeRepository,
    pub functions: &'t FunctionTypeRepository,
    pub frame: &'t StackFrame,
    pub meta: &'t SourceMetadata<'t>,
}

impl<'t> TypeIdentifier<'t> {
    fn error(&self, kind: TypeErrorKind, span: Span) -> TypeError {
        TypeError::new(kind).with_source(span, self.meta)
    }

    pub fn identify(&self, expr: &Expr, span: Span) -> Result<SType, TypeError> {
        match expr {
            Expr::Integer(_) => Ok(SType::Integer),
            Expr::Float(_) => Ok(SType::Float),
            Expr::String(_) => Ok(SType::Integer.reference()),
            Expr::Variable(name) => self
                .frame
                .lookup(name)
                .map(|(ty, _)| ty.clone())
                .ok_or_else(|| {
                    self.error(TypeErrorKind::UnknownIdentifier(name.to_string()), span)
                }),
            Expr::Call { function, args } => self.call(function, args, span),
            Expr::Binary { operator, lhs, rhs } => {
                let lhs_ty = self.identify(&lhs.0, lhs.1)?;
                let rhs_ty = self.identify(&rhs.0, rhs.1)?;
                self.single_word(&lhs_ty, lhs.1)?;
                self.single_word(&rhs_ty, rhs.1)?;
                match operator {
                    BinaryOp::Arithmetic(op) => self.arithmetic(*op, lhs_ty, &rhs_ty, span),
                    BinaryOp::Relational(_) => {
                        if lhs_ty.accepts(&rhs_ty) {
                            Ok(SType::Integer)
                        } else {
                            Err(self.error(TypeErrorKind::mismatch(&lhs_ty, &rhs_ty), span))
                        }
                    }
                    BinaryOp::Logic(_) => Ok(SType::Integer),
                }
            }
            Expr::Unary { operator, expr } => {
                let ty = self.identify(&expr.0, expr.1)?;
                match operator {
                    UnaryOp::Negate if ty.is_number() => Ok(ty),
                    UnaryOp::Negate => {
                        Err(self.error(TypeErrorKind::InvalidOperand(ty.to_string()), span))
                    }
                    UnaryOp::Not => {
                        self.single_word(&ty, expr.1)?;
                        Ok(SType::Integer)
                    }
                }
            }
            Expr::Assign {
                operator,
                destination,
                value,
            } => {
                if !AddressabilityChecker::is_addressable(&destination.0) {
                    return Err(self.error(TypeErrorKind::NotAddressable, destination.1));
                }
                let dest_ty = self.identify(&destination.0, destination.1)?;
                let value_ty = self.identify(&value.0, value.1)?;
                match operator {
                    Some(op) => {
                        self.single_word(&dest_ty, destination.1)?;
                        self.single_word(&value_ty, value.1)?;
                        self.arithmetic(*op, dest_ty, &value_ty, span)
                    }
                    None if dest_ty.accepts(&value_ty) => Ok(dest_ty),
                    None => Err(self.error(TypeErrorKind::mismatch(&dest_ty, &value_ty), value.1)),
                }
            }
            Expr::Field { base, field } => {
                let base_ty = self.identify(&base.0, base.1)?;
                match &base_ty {
                    SType::User(user) => user
                        .field(field.source)
                        .map(|f| f.ty)
                        .ok_or_else(|| {
                            self.error(
                                TypeErrorKind::UnknownField {
                                    ty: user.name.clone(),
                                    field: field.source.to_string(),
                                },
                                field.span,
                            )
                        }),
                    other => Err(self.error(
                        TypeErrorKind::FieldOfNonStruct {
                            ty: other.to_string(),
                            field: field.source.to_string(),
                        },
                        field.span,
                    )),
                }
            }
            Expr::AddressOf(inner) => {
                if !AddressabilityChecker::is_addressable(&inner.0) {
                    return Err(self.error(TypeErrorKind::NotAddressable, inner.1));
                }
                Ok(self.identify(&inner.0, inner.1)?.reference())
            }
            Expr::Dereference(inner) => match self.identify(&inner.0, inner.1)? {
                SType::Reference(pointee) => Ok(*pointee),
                other => Err(self.error(TypeErrorKind::DerefNonReference(other.to_string()), span)),
            },
            Expr::SizeOf(inner) => {
                if self.size_of_type_name(expr).is_none() {
                    self.identify(&inner.0, inner.1)?;
                }
                Ok(SType::Integer)
            }
        }
    }

    /// `sizeof(Name)` where `Name` is a type rather than a value.
    pub fn size_of_type_name(&self, expr: &Expr) -> Option<usize> {
        match expr {
            Expr::SizeOf(inner) => match &*inner.0 {
                Expr::Variable(name) => self.user_types.base_type(name).map(|ty| ty.length()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn resolve_call<'e, 's>(
        &self,
        callee: &'e Expr<'s>,
        span: Span,
    ) -> Result<ResolvedCall<'t, 'e, 's>, TypeError> {
        let (function, receiver) = match callee {
            Expr::Variable(name) => (FunctionRef::Free(name.to_string()), None),
            Expr::Field { base, field } => match self.identify(&base.0, base.1)? {
                SType::User(owner) => (
                    FunctionRef::Method {
                        owner: owner.name.clone(),
                        name: field.source.to_string(),
                    },
                    Some(base),
                ),
                other => {
                    return Err(self.error(
                        TypeErrorKind::FieldOfNonStruct {
                            ty: other.to_string(),
                            field: field.source.to_string(),
                        },
                        field.span,
                    ))
                }
            },
            _ => return Err(self.error(TypeErrorKind::UnresolvedFunction("<expression>".into()), span)),
        };
        match self.functions.get(&function) {
            Some(signature) => Ok(ResolvedCall {
                function,
                signature,
                receiver,
            }),
            None => Err(self.error(TypeErrorKind::UnresolvedFunction(function.to_string()), span)),
        }
    }

    fn call(
        &self,
        callee: &(Box<Expr>, Span),
        args: &[(Expr, Span)],
        span: Span,
    ) -> Result<SType, TypeError> {
        let call = self.resolve_call(&callee.0, callee.1)?;
        if let Some(receiver) = call.receiver {
            if !AddressabilityChecker::is_addressable(&receiver.0) {
                return Err(self.error(TypeErrorKind::NotAddressable, receiver.1));
            }
        }
        if args.len() != call.signature.params.len() {
            return Err(self.error(
                TypeErrorKind::ArgumentCount {
                    function: call.function.to_string(),
                    expected: call.signature.params.len(),
                    found: args.len(),
                },
                span,
            ));
        }
        for ((arg, arg_span), (_, expected)) in args.iter().zip(&call.signature.params) {
            let found = self.identify(arg, *arg_span)?;
            if !expected.accepts(&found) {
                return Err(self.error(TypeErrorKind::mismatch(expected, &found), *arg_span));
            }
        }
        Ok(call.signature.return_type.clone())
    }

    fn single_word(&self, ty: &SType, span: Span) -> Result<(), TypeError> {
        if ty.length() == 1 {
            Ok(())
        } else {
            Err(self.error(TypeErrorKind::InvalidOperand(ty.to_string()), span))
        }
    }

    // numbers of the same kind, or a pointer moved by an integer
    fn arithmetic(
        &self,
        op: ArithmeticOp,
        lhs: SType,
        rhs: &SType,
        span: Span,
    ) -> Result<SType, TypeError> {
        let pointer_offset = matches!(op, ArithmeticOp::Add | ArithmeticOp::Sub)
            && lhs.is_pointer()
            && *rhs == SType::Integer;
        if pointer_offset || (lhs.is_number() && lhs == *rhs) {
            Ok(lhs)
        } else if !lhs.is_number() {
            Err(self.error(TypeErrorKind::InvalidOperand(lhs.to_string()), span))
        } else {
            Err(self.error(TypeErrorKind::mismatch(&lhs, rhs), span))
        }
    }
}
