//! Interrupt-safe spin lock.
//!
//! Masks IRQs before taking the lock and puts the previous mask back on
//! release. The scheduler state is shared between task context and
//! interrupt handlers, so every access to it goes through this lock.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A spin lock that masks interrupts while held.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: the atomic flag serializes all access to `data`.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates an unlocked lock.
    pub const fn new(value: T) -> Self {
        Self::named("<unnamed>", value)
    }

    /// Creates an unlocked lock with a diagnostic name.
    pub const fn named(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(value),
        }
    }

    /// Diagnostic name given at construction.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Masks interrupts, then spins until the lock is free.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved_flags = save_flags_and_cli();

        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    saved_flags,
                    _not_send: PhantomData,
                };
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Attempts to take the lock once. Interrupt state is untouched on
    /// failure.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved_flags = save_flags_and_cli();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqSpinLockGuard {
                lock: self,
                saved_flags,
                _not_send: PhantomData,
            })
        } else {
            restore_flags(saved_flags);
            None
        }
    }

    /// Whether some context currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Returns the protected data without taking the lock.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that nothing else touches the data for the
    /// lifetime of the returned reference. Meant for the fatal exception
    /// path on a uniprocessor, where the interrupted code may hold the lock
    /// and will never run again.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn force_get(&self) -> &mut T {
        // SAFETY: exclusivity is guaranteed by the caller.
        unsafe { &mut *self.data.get() }
    }
}

/// Guard that releases the lock and restores the interrupt mask on drop.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved_flags: u32,
    // Interrupt state is per-CPU; the guard must stay on this one.
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the lock is held, so access is exclusive.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the lock is held, so access is exclusive.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        restore_flags(self.saved_flags);
    }
}

#[cfg(all(target_os = "none", target_arch = "arm"))]
#[inline]
fn save_flags_and_cli() -> u32 {
    let flags: u32;
    // SAFETY: reading CPSR and masking IRQs is allowed in privileged modes.
    unsafe {
        core::arch::asm!(
            "mrs {}, cpsr",
            "cpsid i",
            out(reg) flags,
            options(nomem, nostack),
        );
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "arm"))]
#[inline]
fn restore_flags(flags: u32) {
    // Only the I bit is restored.
    if flags & crate::context::Cpsr::IRQ_MASK.bits() == 0 {
        // SAFETY: re-enabling IRQs returns to the state saved on entry.
        unsafe {
            core::arch::asm!("cpsie i", options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "arm")))]
#[inline]
fn save_flags_and_cli() -> u32 {
    0
}

#[cfg(not(all(target_os = "none", target_arch = "arm")))]
#[inline]
fn restore_flags(_flags: u32) {}
