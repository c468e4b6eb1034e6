//! Context-switch dispatch.
//!
//! Called by the transition engine once it has decided that the head of
//! the ready-to-run list changed. Inside an interrupt handler the switch
//! is deferred: the outgoing task's registers are taken from the exception
//! frame and the incoming task's registers are written back into it, so
//! the return from the handler lands in the new task. Outside a handler
//! the CPU switches immediately.

use kestrel_core::fatal::FatalError;
use kestrel_core::ktrace;
use kestrel_core::task::TaskId;

use crate::context::SchedulerContext;
use crate::cpu::Cpu;

/// Outcome of a scheduling decision.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The running task keeps the CPU.
    None,
    /// The interrupt return frame now holds `to`'s registers; the switch
    /// completes when the handler exits.
    Deferred {
        /// Task that was running when the handler was entered.
        from: TaskId,
        /// Task the handler will return into.
        to: TaskId,
    },
    /// The CPU switched from `from` to `to`. For `from` this is a yield: it
    /// resumes only after it is scheduled again.
    Switched {
        /// Suspended task.
        from: TaskId,
        /// Task now executing.
        to: TaskId,
    },
}

impl Dispatch {
    /// Whether any switch took place or is scheduled.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The task that ends up on the CPU, if it changed.
    #[must_use]
    pub fn incoming(&self) -> Option<TaskId> {
        match *self {
            Self::None => None,
            Self::Deferred { to, .. } | Self::Switched { to, .. } => Some(to),
        }
    }
}

impl<C: Cpu> SchedulerContext<C> {
    /// Hands the CPU from `from` to the current head of the ready-to-run
    /// list.
    ///
    /// Returns [`Dispatch::None`] if `from` is still the head, leaving the
    /// live registers and any interrupt frame untouched.
    ///
    /// # Errors
    ///
    /// [`FatalError::UnknownTask`] if either task has no control block.
    pub(crate) fn dispatch(&mut self, from: TaskId) -> Result<Dispatch, FatalError> {
        let to = self.this_task();
        if to == from {
            ktrace!("sched: {from} stays on the cpu");
            return Ok(Dispatch::None);
        }

        if let Some(frame) = self.current_regs.as_mut() {
            let outgoing = self
                .tasks
                .get_mut(&from)
                .ok_or(FatalError::UnknownTask(from))?;
            self.cpu.save_state(frame, &mut outgoing.xcp);

            let incoming = self.tasks.get(&to).ok_or(FatalError::UnknownTask(to))?;
            self.cpu.restore_task(incoming);
            self.cpu.restore_state(&incoming.xcp, frame);

            ktrace!("sched: deferred switch {from} -> {to}");
            Ok(Dispatch::Deferred { from, to })
        } else {
            let incoming_regs = self.tcb(to)?.xcp;
            let outgoing = self
                .tasks
                .get_mut(&from)
                .ok_or(FatalError::UnknownTask(from))?;
            // Saves the live registers into `from` before loading `to`.
            self.cpu.switch_context(&mut outgoing.xcp, &incoming_regs);

            ktrace!("sched: switch {from} -> {to}");
            Ok(Dispatch::Switched { from, to })
        }
    }
}
