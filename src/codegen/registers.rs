//! Scratch register pool. Registers are handed out as guards that give
//! themselves back when dropped, so every exit path releases them.
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::assembly::Register;
use crate::types::TypeErrorKind;

/// `r0` to `r15`; `sp` is never handed out.
pub const GENERAL_REGISTERS: u8 = 16;

#[derive(Debug, Clone, Default)]
pub struct RegisterManager {
    // bit n set: rn is taken
    used: Rc<Cell<u16>>,
}

impl RegisterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lowest free register.
    pub fn acquire(&self) -> Result<ScratchRegister, TypeErrorKind> {
        let used = self.used.get();
        let index = (0..GENERAL_REGISTERS)
            .find(|index| used & (1 << index) == 0)
            .ok_or(TypeErrorKind::RegistersExhausted)?;
        self.used.set(used | 1 << index);
        Ok(ScratchRegister {
            register: Register::General(index),
            index,
            used: Rc::clone(&self.used),
        })
    }

    /// Registers currently held, lowest first. Saving walks this order and
    /// restoring walks it backwards.
    pub fn live(&self) -> Vec<Register> {
        let used = self.used.get();
        (0..GENERAL_REGISTERS)
            .filter(|index| used & (1 << index) != 0)
            .map(Register::General)
            .collect()
    }

    pub fn in_use(&self) -> usize {
        self.used.get().count_ones() as usize
    }
}

pub struct ScratchRegister {
    register: Register,
    index: u8,
    used: Rc<Cell<u16>>,
}

impl Deref for ScratchRegister {
    type Target = Register;

    fn deref(&self) -> &Register {
        &self.register
    }
}

impl Drop for ScratchRegister {
    fn drop(&mut self) {
        self.used.set(self.used.get() & !(1 << self.index));
    }
}

impl fmt::Debug for ScratchRegister {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ScratchRegister({})", self.register)
    }
}
