//! Kernel-side scheduler entry points.
//!
//! Every call takes the scheduler lock, runs one transition, and halts
//! the system if the transition reports a [`FatalError`]. Interrupt
//! handlers call the same entry points; the lock is released while a
//! handler body runs so they can.

use kestrel_core::context::RegisterSet;
use kestrel_core::fatal::{FatalError, OrHalt};
use kestrel_core::kerr;
use kestrel_core::sync::IrqSpinLock;
use kestrel_core::task::{TaskId, Tcb};
use kestrel_sched::invariants::check_all_invariants;
use kestrel_sched::{Cpu, Dispatch, SchedConfig, SchedulerContext};

use crate::arch::arm::fault;

/// The kernel's scheduler.
pub struct Kernel<C: Cpu> {
    sched: IrqSpinLock<SchedulerContext<C>>,
}

impl<C: Cpu> Kernel<C> {
    /// Creates a kernel whose only ready task is idle.
    #[must_use]
    pub fn new(config: SchedConfig, cpu: C) -> Self {
        Self {
            sched: IrqSpinLock::named("sched", SchedulerContext::new(config, cpu)),
        }
    }

    /// Runs `f` with the scheduler locked.
    pub fn with_sched<R>(&self, f: impl FnOnce(&mut SchedulerContext<C>) -> R) -> R {
        let mut sched = self.sched.lock();
        f(&mut *sched)
    }

    /// Adds a blocked task. Halts if the task cannot be registered.
    pub fn register_task(&self, tcb: Tcb) {
        self.transition(|sched| sched.register(tcb));
    }

    /// Changes the priority of a ready-to-run task. Halts if `id` is not
    /// ready to run or `priority` is out of bounds.
    pub fn reprioritize_rtr(&self, id: TaskId, priority: u8) -> Dispatch {
        self.transition(|sched| sched.reprioritize(id, priority))
    }

    /// Makes a blocked task ready to run. Halts if `id` is not blocked.
    pub fn unblock_task(&self, id: TaskId) -> Dispatch {
        self.transition(|sched| sched.unblock(id))
    }

    /// Disables preemption. Nests.
    pub fn sched_lock(&self) {
        self.sched.lock().lock();
    }

    /// Re-enables preemption. Halts on an unbalanced unlock.
    pub fn sched_unlock(&self) -> Dispatch {
        self.transition(SchedulerContext::unlock)
    }

    /// Runs an interrupt handler for the trap that saved `frame`.
    ///
    /// Returns the frame to restore on exception return, which belongs to
    /// another task if the handler made one runnable that outranks the
    /// interrupted one.
    pub fn handle_irq(&self, frame: RegisterSet, handler: impl FnOnce(&Self)) -> RegisterSet {
        self.sched.lock().enter_interrupt(frame);
        handler(self);
        self.sched.lock().leave_interrupt().unwrap_or(frame)
    }

    /// Prefetch abort entry. The faulting code may hold the scheduler lock,
    /// so it is bypassed if busy.
    pub fn prefetch_abort(&self, regs: RegisterSet, ifar: u32, ifsr: u32) -> ! {
        if let Some(mut sched) = self.sched.try_lock() {
            fault::prefetch_abort(&mut *sched, regs, ifar, ifsr)
        }
        // SAFETY: the system halts below and nothing resumes the lock
        // holder.
        let sched = unsafe { self.sched.force_get() };
        fault::prefetch_abort(sched, regs, ifar, ifsr)
    }

    /// [`prefetch_abort`](Self::prefetch_abort) with the fault registers
    /// read from CP15.
    #[cfg(all(target_os = "none", target_arch = "arm"))]
    pub fn handle_prefetch_abort(&self, regs: RegisterSet) -> ! {
        let (ifar, ifsr) = fault::read_fault_registers();
        self.prefetch_abort(regs, ifar, ifsr)
    }

    fn transition<R>(
        &self,
        op: impl FnOnce(&mut SchedulerContext<C>) -> Result<R, FatalError>,
    ) -> R {
        let mut sched = self.sched.lock();
        let result = op(&mut *sched);
        if cfg!(debug_assertions) {
            for violation in check_all_invariants(&*sched) {
                kerr!(
                    "sched: invariant {} violated: {}",
                    violation.invariant,
                    violation.description
                );
            }
        }
        drop(sched);
        result.or_halt()
    }
}
