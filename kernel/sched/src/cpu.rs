//! CPU context primitives used by the dispatcher.
//!
//! On hardware these are a handful of assembly routines that move the
//! register file between the CPU, the exception frame and task save
//! areas. [`SoftCpu`] implements the same contract on plain memory so the
//! scheduler can be driven from host tests and from the software
//! [`Executor`](crate::executor::Executor).

use kestrel_core::context::RegisterSet;
use kestrel_core::task::{TaskId, Tcb};

/// Register save/restore primitives.
pub trait Cpu {
    /// Copies the interrupted context held in `frame` into a task's save
    /// area.
    fn save_state(&mut self, frame: &RegisterSet, dest: &mut RegisterSet) {
        *dest = *frame;
    }

    /// Makes `src` the context the CPU returns to when the current
    /// interrupt handler exits.
    fn restore_state(&mut self, src: &RegisterSet, frame: &mut RegisterSet) {
        *frame = *src;
    }

    /// Reloads per-task hardware state (address space, MPU regions) for
    /// `tcb` ahead of an interrupt return into it.
    fn restore_task(&mut self, tcb: &Tcb) {
        let _ = tcb;
    }

    /// Saves the live registers into `save` and resumes execution from
    /// `restore`.
    ///
    /// On hardware this never returns to the caller's logical task until
    /// that task is switched back in. Implementations that model it in
    /// software return immediately and leave resumption to a dispatch loop.
    fn switch_context(&mut self, save: &mut RegisterSet, restore: &RegisterSet);
}

/// Per-primitive call counters kept by [`SoftCpu`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    /// `save_state` calls.
    pub saves: u32,
    /// `restore_state` calls.
    pub restores: u32,
    /// `restore_task` calls.
    pub task_restores: u32,
    /// `switch_context` calls.
    pub switches: u32,
}

/// A CPU whose register file is ordinary memory.
#[derive(Debug, Default)]
pub struct SoftCpu {
    /// Registers of whatever is executing now.
    pub live: RegisterSet,
    /// Call counters.
    pub stats: CpuStats,
    /// Task passed to the most recent `restore_task`.
    pub last_restored: Option<TaskId>,
}

impl SoftCpu {
    /// Creates a CPU with zeroed registers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of context switches, deferred or immediate.
    #[must_use]
    pub fn switch_count(&self) -> u32 {
        self.stats.switches + self.stats.task_restores
    }
}

impl Cpu for SoftCpu {
    fn save_state(&mut self, frame: &RegisterSet, dest: &mut RegisterSet) {
        self.stats.saves += 1;
        *dest = *frame;
    }

    fn restore_state(&mut self, src: &RegisterSet, frame: &mut RegisterSet) {
        self.stats.restores += 1;
        *frame = *src;
    }

    fn restore_task(&mut self, tcb: &Tcb) {
        self.stats.task_restores += 1;
        self.last_restored = Some(tcb.id);
    }

    fn switch_context(&mut self, save: &mut RegisterSet, restore: &RegisterSet) {
        self.stats.switches += 1;
        *save = self.live;
        self.live = *restore;
    }
}
