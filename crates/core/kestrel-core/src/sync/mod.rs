//! Synchronization primitives.

mod irq_spinlock;

pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
