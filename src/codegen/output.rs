use std::fmt;

use itertools::Itertools;

use crate::assembly::{Assembly, Instruction};

/// A run of assembly items, appended as the generator walks the tree.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssemblyOutput(Vec<Assembly>);

impl AssemblyOutput {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, value: impl Into<Assembly>) -> &mut Self {
        self.0.push(value.into());
        self
    }

    pub fn push_commented(&mut self, instruction: Instruction, comment: impl Into<String>) -> &mut Self {
        self.0.push(instruction.with_comment(comment));
        self
    }

    pub fn extend<T>(&mut self, values: impl IntoIterator<Item = T>) -> &mut Self
    where
        T: Into<Assembly>,
    {
        self.0.extend(values.into_iter().map(T::into));
        self
    }

    pub fn append(&mut self, mut other: AssemblyOutput) -> &mut Self {
        self.0.append(&mut other.0);
        self
    }

    #[must_use]
    pub fn chain(mut self, other: AssemblyOutput) -> Self {
        self.append(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assembly> {
        self.0.iter()
    }

    /// Only the instructions, without labels, directives or comments.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.0.iter().filter_map(|item| match item {
            Assembly::Instruction { instruction, .. } => Some(instruction),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssemblyOutput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.0.iter().join("\n"))
    }
}

impl IntoIterator for AssemblyOutput {
    type Item = Assembly;
    type IntoIter = std::vec::IntoIter<Assembly>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T> From<T> for AssemblyOutput
where
    T: Into<Assembly>,
{
    fn from(item: T) -> Self {
        Self(vec![item.into()])
    }
}

impl FromIterator<AssemblyOutput> for AssemblyOutput {
    fn from_iter<T: IntoIterator<Item = AssemblyOutput>>(iter: T) -> Self {
        iter.into_iter().fold(AssemblyOutput::new(), AssemblyOutput::chain)
    }
}

impl FromIterator<Assembly> for AssemblyOutput {
    fn from_iter<T: IntoIterator<Item = Assembly>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
