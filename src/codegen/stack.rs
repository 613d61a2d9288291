//! Compile-time model of the operand stack: how many words are pushed at any
//! point of a function, and where each variable lives.
use std::collections::HashMap;

use crate::assembly::Label;
use crate::types::{FunctionSignature, SType, TypeErrorKind};

/// A `static` variable, stored in static memory for the whole run.
#[derive(Debug, Clone)]
pub struct StaticVariable {
    pub name: String,
    pub ty: SType,
    pub label: Label,
}

impl StaticVariable {
    pub fn new(name: &str, ty: SType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            label: Label::static_variable(name),
        }
    }
}

#[derive(Debug, Clone)]
enum Storage {
    /// Word position relative to the stack pointer at function entry
    Frame(isize),
    Static(Label),
}

#[derive(Debug, Clone)]
struct Variable {
    ty: SType,
    storage: Storage,
}

/// Where a variable's first word is, from the current point of the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Offset from the current stack pointer, always negative
    Stack(isize),
    Static(Label),
}

#[derive(Debug, Default)]
struct Scope {
    variables: HashMap<String, Variable>,
    words: usize,
}

#[derive(Debug)]
pub struct StackFrame {
    // the outermost scope holds the statics
    scopes: Vec<Scope>,
    depth: isize,
    return_slot: Option<isize>,
}

impl StackFrame {
    /// Frame of the top-level statements.
    pub fn new(statics: &[StaticVariable]) -> Self {
        let globals = Scope {
            variables: statics
                .iter()
                .map(|variable| {
                    (
                        variable.name.clone(),
                        Variable {
                            ty: variable.ty.clone(),
                            storage: Storage::Static(variable.label.clone()),
                        },
                    )
                })
                .collect(),
            words: 0,
        };
        Self {
            scopes: vec![globals, Scope::default()],
            depth: 0,
            return_slot: None,
        }
    }

    /// Frame of a function body, as laid out by the caller:
    /// `[return slot][receiver][arguments][return address]`, then the body.
    pub fn for_function(statics: &[StaticVariable], signature: &FunctionSignature) -> Self {
        let mut frame = Self::new(statics);
        let argument_words = signature.argument_words() as isize;
        let mut position = -1 - argument_words;
        let arguments = &mut frame.scopes[1].variables;
        for (name, ty) in &signature.params {
            arguments.insert(
                name.clone(),
                Variable {
                    ty: ty.clone(),
                    storage: Storage::Frame(position),
                },
            );
            position += ty.length() as isize;
        }
        let mut below = -1 - argument_words;
        if let Some(receiver) = &signature.receiver {
            below -= 1;
            arguments.insert(
                "this".to_string(),
                Variable {
                    ty: receiver.clone(),
                    storage: Storage::Frame(below),
                },
            );
        }
        frame.return_slot = Some(below - signature.return_type.length() as isize);
        frame
    }

    pub fn lookup(&self, name: &str) -> Option<(&SType, Location)> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
            .map(|variable| {
                let location = match &variable.storage {
                    Storage::Frame(position) => Location::Stack(position - self.depth),
                    Storage::Static(label) => Location::Static(label.clone()),
                };
                (&variable.ty, location)
            })
    }

    pub fn pushed(&mut self, ty: &SType) {
        self.pushed_words(ty.length());
    }

    pub fn popped(&mut self, ty: &SType) {
        self.popped_words(ty.length());
    }

    pub fn pushed_words(&mut self, words: usize) {
        self.depth += words as isize;
    }

    pub fn popped_words(&mut self, words: usize) {
        self.depth -= words as isize;
    }

    /// The last `ty.length()` pushed words become the variable `name`.
    pub fn declare(&mut self, name: &str, ty: SType) -> Result<(), TypeErrorKind> {
        let words = ty.length();
        let position = self.depth - words as isize;
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| TypeErrorKind::UnknownIdentifier(name.to_string()))?;
        if scope.variables.contains_key(name) {
            return Err(TypeErrorKind::Redeclared(name.to_string()));
        }
        scope.words += words;
        scope.variables.insert(
            name.to_string(),
            Variable {
                ty,
                storage: Storage::Frame(position),
            },
        );
        Ok(())
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Forgets the innermost scope and returns how many words its variables
    /// took, which the caller has to pop.
    pub fn leave_scope(&mut self) -> usize {
        let words = self.scopes.pop().map_or(0, |scope| scope.words);
        self.popped_words(words);
        words
    }

    /// Words pushed since function entry.
    pub const fn depth(&self) -> isize {
        self.depth
    }

    /// Offset from the current stack pointer to the return slot, for function frames.
    pub fn return_slot_offset(&self) -> Option<isize> {
        self.return_slot.map(|slot| slot - self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_move_with_the_stack() -> Result<(), TypeErrorKind> {
        let mut frame = StackFrame::new(&[]);
        frame.pushed(&SType::Integer);
        frame.declare("a", SType::Integer)?;
        assert_eq!(frame.lookup("a").map(|(_, l)| l), Some(Location::Stack(-1)));
        frame.pushed_words(3);
        assert_eq!(frame.lookup("a").map(|(_, l)| l), Some(Location::Stack(-4)));
        frame.popped_words(3);
        assert_eq!(frame.declare("a", SType::Float), Err(TypeErrorKind::Redeclared("a".into())));
        Ok(())
    }

    #[test]
    fn scopes_shadow_and_release() -> Result<(), TypeErrorKind> {
        let statics = vec![StaticVariable::new("total", SType::Integer)];
        let mut frame = StackFrame::new(&statics);
        assert_eq!(
            frame.lookup("total").map(|(_, l)| l),
            Some(Location::Static(Label::new("static.total")))
        );
        frame.enter_scope();
        frame.pushed_words(1);
        frame.declare("total", SType::GenericPointer.reference())?;
        frame.pushed_words(1);
        frame.declare("x", SType::Integer)?;
        assert_eq!(frame.lookup("total").map(|(_, l)| l), Some(Location::Stack(-2)));
        assert_eq!(frame.leave_scope(), 2);
        assert_eq!(frame.depth(), 0);
        assert!(frame.lookup("x").is_none());
        assert!(matches!(frame.lookup("total"), Some((SType::Integer, Location::Static(_)))));
        Ok(())
    }

    #[test]
    fn function_frame_layout() {
        let method = FunctionSignature {
            params: vec![
                ("a".to_string(), SType::Integer),
                ("b".to_string(), SType::Float),
            ],
            return_type: SType::Integer,
            receiver: Some(SType::GenericPointer),
        };
        let frame = StackFrame::for_function(&[], &method);
        // [ret][this][a][b][return address] | sp
        assert_eq!(frame.lookup("b").map(|(_, l)| l), Some(Location::Stack(-2)));
        assert_eq!(frame.lookup("a").map(|(_, l)| l), Some(Location::Stack(-3)));
        assert_eq!(frame.lookup("this").map(|(_, l)| l), Some(Location::Stack(-4)));
        assert_eq!(frame.return_slot_offset(), Some(-5));

        let procedure = FunctionSignature {
            params: Vec::new(),
            return_type: SType::NoType,
            receiver: None,
        };
        let frame = StackFrame::for_function(&[], &procedure);
        assert_eq!(frame.return_slot_offset(), Some(-1));
        assert!(StackFrame::new(&[]).return_slot_offset().is_none());
    }
}
