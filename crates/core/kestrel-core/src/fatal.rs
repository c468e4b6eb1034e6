//! Fatal errors and the system halt hook.
//!
//! A [`FatalError`] describes a condition the kernel cannot continue past:
//! a broken scheduler contract, an unrecoverable CPU exception, or an
//! impossible memory layout. Code that detects one returns it; exactly one
//! place per entry path hands it to [`halt`], which logs it and calls the
//! registered [`HaltFn`]. The default hook panics with the rendered error,
//! which lets host tests observe the halt with `#[should_panic]`.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::context::{REG_PC, RegisterSet};
use crate::kfatal;
use crate::task::{TaskId, TaskState};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// CPU exception classes that end in a halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Instruction fetch from an address that could not be accessed.
    PrefetchAbort,
}

/// Everything known about a fatal CPU exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord {
    /// Exception class.
    pub kind: ExceptionKind,
    /// Registers at the time of the exception.
    pub regs: RegisterSet,
    /// Faulting address register (IFAR for prefetch aborts).
    pub fault_address: u32,
    /// Fault status register (IFSR for prefetch aborts).
    pub fault_status: u32,
}

impl ExceptionRecord {
    /// Builds a prefetch-abort record.
    #[must_use]
    pub const fn prefetch_abort(regs: RegisterSet, ifar: u32, ifsr: u32) -> Self {
        Self {
            kind: ExceptionKind::PrefetchAbort,
            regs,
            fault_address: ifar,
            fault_status: ifsr,
        }
    }

    /// Program counter of the faulting context.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.regs[REG_PC]
    }
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ExceptionKind::PrefetchAbort => write!(
                f,
                "Prefetch abort. PC: {:08x} IFAR: {:08x} IFSR: {:08x}",
                self.pc(),
                self.fault_address,
                self.fault_status
            ),
        }
    }
}

/// A condition the kernel cannot recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// A task identifier that names no control block.
    UnknownTask(TaskId),
    /// A task identifier registered twice.
    DuplicateTask(TaskId),
    /// No room left for another control block.
    TaskTableFull,
    /// An operation was applied to a task in the wrong state.
    InvalidTaskState {
        /// The task.
        task: TaskId,
        /// Its state at the time of the call.
        state: TaskState,
        /// The operation that was refused.
        operation: &'static str,
    },
    /// A requested priority outside the configured bounds.
    PriorityOutOfRange {
        /// The task.
        task: TaskId,
        /// Requested priority.
        priority: u8,
        /// Lowest allowed priority.
        min: u8,
        /// Highest allowed priority.
        max: u8,
    },
    /// Preemption unlocked more often than it was locked.
    UnbalancedUnlock,
    /// A CPU exception with no recovery path.
    Exception(ExceptionRecord),
    /// The idle stack reaches the end of the kernel heap region while the
    /// data section lies below it.
    KernelHeapOverlap {
        /// Start of the data section.
        sdata: usize,
        /// Aligned top of the idle task stack.
        stack_end: usize,
        /// End of the heap region.
        region_end: usize,
    },
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTask(id) => write!(f, "unknown task {id}"),
            Self::DuplicateTask(id) => write!(f, "task {id} already registered"),
            Self::TaskTableFull => write!(f, "task table full"),
            Self::InvalidTaskState {
                task,
                state,
                operation,
            } => write!(f, "{operation}: task {task} in invalid state {state:?}"),
            Self::PriorityOutOfRange {
                task,
                priority,
                min,
                max,
            } => write!(
                f,
                "task {task}: priority {priority} outside [{min}, {max}]"
            ),
            Self::UnbalancedUnlock => write!(f, "preemption unlock without matching lock"),
            Self::Exception(record) => fmt::Display::fmt(record, f),
            Self::KernelHeapOverlap {
                sdata,
                stack_end,
                region_end,
            } => write!(
                f,
                "kernel heap overlap: sdata {sdata:#x}, idle stack end {stack_end:#x}, region end {region_end:#x}"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Halt hook
// ---------------------------------------------------------------------------

/// Signature of the system halt hook.
pub type HaltFn = fn(&FatalError) -> !;

fn default_halt(err: &FatalError) -> ! {
    panic!("{err}")
}

static HALT_FN: AtomicPtr<()> = AtomicPtr::new(default_halt as *mut ());

/// Replaces the halt hook.
///
/// # Safety
///
/// `f` runs with the scheduler in an arbitrary state, possibly from an
/// exception handler with the scheduler lock held. It must not take
/// locks.
pub unsafe fn set_halt_fn(f: HaltFn) {
    HALT_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_halt_fn() -> HaltFn {
    let ptr = HALT_FN.load(Ordering::Acquire);
    // SAFETY: only `HaltFn` pointers are ever stored into HALT_FN.
    unsafe { core::mem::transmute::<*mut (), HaltFn>(ptr) }
}

/// Logs `err` and stops the system.
pub fn halt(err: &FatalError) -> ! {
    kfatal!("system halted: {}", err);
    load_halt_fn()(err)
}

/// Escalates the error of a fatal result to [`halt`].
pub trait OrHalt<T> {
    /// Returns the success value or halts.
    fn or_halt(self) -> T;
}

impl<T> OrHalt<T> for Result<T, FatalError> {
    #[inline]
    fn or_halt(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => halt(&err),
        }
    }
}
