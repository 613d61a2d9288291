//! Value types of scripts and the tables describing user types and functions.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::error;

pub mod identify;
pub mod repository;

pub use identify::{AddressabilityChecker, TypeIdentifier};
pub use repository::{FunctionRef, FunctionSignature, FunctionTypeRepository, UserTypeRepository};

#[derive(Debug, Clone, PartialEq)]
pub enum SType {
    /// `void`, takes no space
    NoType,
    Integer,
    Float,
    /// `ptr`, an address to something unknown
    GenericPointer,
    User(Rc<UserType>),
    Reference(Box<SType>),
}

impl SType {
    /// Size of a value of this type, in words.
    pub fn length(&self) -> usize {
        match self {
            Self::NoType => 0,
            Self::Integer | Self::Float | Self::GenericPointer | Self::Reference(_) => 1,
            Self::User(user) => user.length(),
        }
    }

    pub fn reference(self) -> Self {
        Self::Reference(Box::new(self))
    }

    pub fn pointee(&self) -> Option<&SType> {
        match self {
            Self::Reference(inner) => Some(inner),
            _ => None,
        }
    }

    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::GenericPointer)
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Whether a value of type `value` can be stored where `self` is expected.
    pub fn accepts(&self, value: &SType) -> bool {
        self == value
            || matches!(
                (self, value),
                (Self::GenericPointer, Self::Reference(_)) | (Self::Reference(_), Self::GenericPointer)
            )
    }
}

impl fmt::Display for SType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoType => f.write_str("void"),
            Self::Integer => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::GenericPointer => f.write_str("ptr"),
            Self::User(user) => f.write_str(&user.name),
            Self::Reference(inner) => write!(f, "{}&", inner),
        }
    }
}

/// A struct: fields laid out one after the other, in declaration order.
///
/// The layout is filled in after the struct is registered, so its fields may
/// hold references back to it. Struct names are unique within a program, so
/// two user types are the same type when their names are.
pub struct UserType {
    pub name: String,
    fields: RefCell<Vec<Field>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Words from the start of the struct
    pub offset: usize,
    pub ty: SType,
}

fn lay_out(fields: impl IntoIterator<Item = (String, SType)>) -> Vec<Field> {
    let mut offset = 0;
    fields
        .into_iter()
        .map(|(name, ty)| {
            let field = Field { name, offset, ty };
            offset += field.ty.length();
            field
        })
        .collect()
}

impl UserType {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = (String, SType)>) -> Self {
        Self {
            name: name.into(),
            fields: RefCell::new(lay_out(fields)),
        }
    }

    /// A struct whose fields aren't known yet.
    pub(crate) fn declared(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub(crate) fn define(&self, fields: impl IntoIterator<Item = (String, SType)>) {
        *self.fields.borrow_mut() = lay_out(fields);
    }

    /// Drops the layout, releasing references the fields hold back to this type.
    pub(crate) fn forget_fields(&self) {
        self.fields.borrow_mut().clear();
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        self.fields.borrow().iter().find(|field| field.name == name).cloned()
    }

    pub fn length(&self) -> usize {
        self.fields.borrow().iter().map(|field| field.ty.length()).sum()
    }
}

impl PartialEq for UserType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for UserType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // field types by name only, a field may point back at this struct
        write!(f, "{} ", self.name)?;
        f.debug_map()
            .entries(self.fields.borrow().iter().map(|field| (&field.name, field.ty.to_string())))
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeErrorKind {
    #[error("unknown identifier: {0:?}")]
    UnknownIdentifier(String),
    #[error("unknown type: {0:?}")]
    UnknownType(String),
    #[error("type {ty} has no field {field:?}")]
    UnknownField { ty: String, field: String },
    #[error("can't access field {field:?} of non-struct type {ty}")]
    FieldOfNonStruct { ty: String, field: String },
    #[error("can't dereference a value of non-reference type {0}")]
    DerefNonReference(String),
    #[error("expression is not addressable")]
    NotAddressable,
    #[error("unresolved function: {0}")]
    UnresolvedFunction(String),
    #[error("{function} expects {expected} arguments, but {found} were given")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("mismatched types: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("operator can't be applied to a value of type {0}")]
    InvalidOperand(String),
    #[error("struct {0} can't contain itself")]
    RecursiveType(String),
    #[error("{0:?} was already declared")]
    Redeclared(String),
    #[error("can't declare a variable of type {0}")]
    InvalidVariableType(String),
    #[error("function {0:?} doesn't return a value on every path")]
    MissingReturn(String),
    #[error("ran out of scratch registers")]
    RegistersExhausted,
}

impl TypeErrorKind {
    pub fn mismatch(expected: &SType, found: &SType) -> Self {
        Self::Mismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

pub type TypeError = error::Error<TypeErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        let point = Rc::new(UserType::new(
            "Point",
            vec![("x".to_string(), SType::Integer), ("y".to_string(), SType::Float)],
        ));
        let segment = UserType::new(
            "Segment",
            vec![
                ("from".to_string(), SType::User(point.clone())),
                ("to".to_string(), SType::User(point.clone())),
                ("next".to_string(), SType::User(point).reference()),
            ],
        );
        assert_eq!(SType::NoType.length(), 0);
        assert_eq!(SType::Integer.length(), 1);
        assert_eq!(SType::GenericPointer.length(), 1);
        assert_eq!(segment.length(), 5);
        assert_eq!(segment.field("to").map(|f| f.offset), Some(2));
        assert_eq!(segment.field("next").map(|f| f.offset), Some(4));
        assert_eq!(segment.field("next").map(|f| f.ty.length()), Some(1));
        assert!(segment.field("missing").is_none());
    }

    #[test]
    fn generic_pointers_accept_references() {
        let int_ref = SType::Integer.reference();
        assert!(SType::GenericPointer.accepts(&int_ref));
        assert!(int_ref.accepts(&SType::GenericPointer));
        assert!(!SType::Integer.accepts(&SType::Float));
        assert!(!int_ref.accepts(&SType::Float.reference()));
        assert_eq!(SType::Float.reference().reference().to_string(), "float&&");
    }
}
