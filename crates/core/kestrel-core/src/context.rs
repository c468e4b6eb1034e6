//! Saved CPU register context (ARMv7-A/R exception frame layout).

use core::fmt;
use core::ops::{Index, IndexMut};

use bitflags::bitflags;

/// Number of words in a [`RegisterSet`].
pub const XCPTCONTEXT_REGS: usize = 17;

/// Index of the stack pointer.
pub const REG_SP: usize = 13;
/// Index of the link register.
pub const REG_LR: usize = 14;
/// Index of the program counter.
pub const REG_PC: usize = 15;
/// Index of the saved program status register.
pub const REG_CPSR: usize = 16;

bitflags! {
    /// Control bits of the program status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cpsr: u32 {
        /// Executing Thumb instructions.
        const THUMB = 1 << 5;
        /// FIQs masked.
        const FIQ_MASK = 1 << 6;
        /// IRQs masked.
        const IRQ_MASK = 1 << 7;
        /// Asynchronous aborts masked.
        const ABORT_MASK = 1 << 8;
    }
}

/// Processor mode field of the CPSR (bits `[4:0]`).
pub const CPSR_MODE_MASK: u32 = 0x1f;
/// Supervisor mode.
pub const CPSR_MODE_SVC: u32 = 0x13;
/// Abort mode.
pub const CPSR_MODE_ABT: u32 = 0x17;

/// A complete register snapshot: `R0..R12`, `SP`, `LR`, `PC`, `CPSR`.
///
/// Owned by a task's control block while the task is not running, and by
/// the interrupt entry path while a handler runs.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct RegisterSet {
    regs: [u32; XCPTCONTEXT_REGS],
}

impl RegisterSet {
    /// All registers zero.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; XCPTCONTEXT_REGS],
        }
    }

    /// Initial context for a task entering at `entry` with stack top `sp`,
    /// in supervisor mode with interrupts enabled.
    #[must_use]
    pub const fn for_entry(entry: u32, sp: u32) -> Self {
        let mut regs = [0; XCPTCONTEXT_REGS];
        regs[REG_PC] = entry;
        regs[REG_SP] = sp;
        regs[REG_CPSR] = CPSR_MODE_SVC;
        Self { regs }
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.regs[REG_PC]
    }

    /// Stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.regs[REG_SP]
    }

    /// Control bits of the saved CPSR; unknown bits are kept.
    #[must_use]
    pub const fn cpsr(&self) -> Cpsr {
        Cpsr::from_bits_retain(self.regs[REG_CPSR])
    }

    /// Processor mode recorded in the saved CPSR.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.regs[REG_CPSR] & CPSR_MODE_MASK
    }

    /// Raw register words.
    #[must_use]
    pub const fn as_array(&self) -> &[u32; XCPTCONTEXT_REGS] {
        &self.regs
    }
}

impl Index<usize> for RegisterSet {
    type Output = u32;

    fn index(&self, reg: usize) -> &u32 {
        &self.regs[reg]
    }
}

impl IndexMut<usize> for RegisterSet {
    fn index_mut(&mut self, reg: usize) -> &mut u32 {
        &mut self.regs[reg]
    }
}

impl fmt::Debug for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterSet")
            .field("pc", &format_args!("{:#010x}", self.pc()))
            .field("sp", &format_args!("{:#010x}", self.sp()))
            .field("lr", &format_args!("{:#010x}", self.regs[REG_LR]))
            .field("cpsr", &format_args!("{:#010x}", self.regs[REG_CPSR]))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_context() {
        let regs = RegisterSet::for_entry(0x8000, 0x2000_0000);
        assert_eq!(regs.pc(), 0x8000);
        assert_eq!(regs.sp(), 0x2000_0000);
        assert_eq!(regs.mode(), CPSR_MODE_SVC);
        assert!(!regs.cpsr().contains(Cpsr::IRQ_MASK));
    }

    #[test]
    fn index_by_register_number() {
        let mut regs = RegisterSet::zeroed();
        regs[0] = 7;
        regs[REG_LR] = 0xdead_beef;
        assert_eq!(regs[0], 7);
        assert_eq!(regs.as_array()[REG_LR], 0xdead_beef);
    }

    #[test]
    fn cpsr_keeps_mode_bits() {
        let mut regs = RegisterSet::zeroed();
        regs[REG_CPSR] = CPSR_MODE_ABT | Cpsr::IRQ_MASK.bits();
        assert_eq!(regs.mode(), CPSR_MODE_ABT);
        assert!(regs.cpsr().contains(Cpsr::IRQ_MASK));
        assert_eq!(regs.cpsr().bits() & CPSR_MODE_MASK, CPSR_MODE_ABT);
    }
}
