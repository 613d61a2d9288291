//! Where the host keeps its assembled scripts.
//!
//! A host hands a [`ScriptStore`] to whatever needs to run scripts instead of
//! registering a global one.

use std::collections::HashMap;

use crate::assembler::Bytecode;
use crate::vm::{Vm, VmConfig};

pub type ScriptId = u32;

pub trait ScriptStore {
    fn load(&self, id: ScriptId) -> Option<Bytecode>;

    /// A fresh machine for script `id`, if the store has it.
    fn create_vm(&self, id: ScriptId, config: VmConfig) -> Option<Vm> {
        let code = self.load(id)?;
        tracing::debug!(target: "store", "creating a machine for script {}", id);
        Some(Vm::new(code, config))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryScriptStore {
    scripts: HashMap<ScriptId, Bytecode>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `code` under `id`, giving back what was there before.
    pub fn insert(&mut self, id: ScriptId, code: Bytecode) -> Option<Bytecode> {
        self.scripts.insert(id, code)
    }

    pub fn remove(&mut self, id: ScriptId) -> Option<Bytecode> {
        self.scripts.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl ScriptStore for MemoryScriptStore {
    fn load(&self, id: ScriptId) -> Option<Bytecode> {
        self.scripts.get(&id).cloned()
    }
}

impl FromIterator<(ScriptId, Bytecode)> for MemoryScriptStore {
    fn from_iter<T: IntoIterator<Item = (ScriptId, Bytecode)>>(iter: T) -> Self {
        Self {
            scripts: iter.into_iter().collect(),
        }
    }
}

/// A store without any scripts, for hosts that don't run any.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScriptStore;

impl ScriptStore for NullScriptStore {
    fn load(&self, id: ScriptId) -> Option<Bytecode> {
        tracing::warn!(target: "store", "script {} requested from the null store", id);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    #[test]
    fn memory_store_creates_machines() -> anyhow::Result<()> {
        let mut store = MemoryScriptStore::new();
        assert!(store.insert(7, assemble("mov r0, 3\nhalt")?).is_none());
        assert_eq!(store.len(), 1);

        let vm = store.create_vm(7, VmConfig::default());
        let end = vm.map(Vm::run).transpose()?;
        assert_eq!(end.map(|end| end.registers[1]), Some(3));
        assert!(store.create_vm(8, VmConfig::default()).is_none());
        Ok(())
    }

    #[test]
    fn stores_can_be_collected() -> anyhow::Result<()> {
        let store: MemoryScriptStore = vec![(1, assemble("halt")?), (2, assemble("")?)]
            .into_iter()
            .collect();
        assert_eq!(store.load(1).map(|code| code.len()), Some(1));
        assert_eq!(store.load(2), Some(Bytecode::default()));
        Ok(())
    }

    #[test]
    fn null_store_has_nothing() {
        assert!(NullScriptStore.load(0).is_none());
        assert!(NullScriptStore.create_vm(0, VmConfig::default()).is_none());
    }
}
