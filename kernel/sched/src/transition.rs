//! Task state transitions that may trigger a context switch.
//!
//! Callers must hold the scheduler lock (interrupts masked) across each
//! call. A returned [`FatalError`] means a kernel contract was broken; the
//! kernel escalates it to the halt hook.

use kestrel_core::fatal::FatalError;
use kestrel_core::task::TaskId;
use kestrel_core::{kdebug, ktrace};

use crate::context::SchedulerContext;
use crate::cpu::Cpu;
use crate::dispatch::Dispatch;

impl<C: Cpu> SchedulerContext<C> {
    /// Changes the priority of a ready-to-run task, switching context if the
    /// running task changes as a result.
    ///
    /// The task is unlinked, given its new priority, and relinked. A switch
    /// is needed when exactly one of the two list operations moved the
    /// head: if both did, the task was running and still is.
    ///
    /// # Errors
    ///
    /// [`FatalError::InvalidTaskState`] if the task is not ready-to-run,
    /// [`FatalError::PriorityOutOfRange`] if `priority` lies outside the
    /// configured bounds, [`FatalError::UnknownTask`] for an unknown id.
    pub fn reprioritize(&mut self, id: TaskId, priority: u8) -> Result<Dispatch, FatalError> {
        let tcb = self.tcb(id)?;
        if !tcb.task_state.is_ready_to_run() {
            return Err(FatalError::InvalidTaskState {
                task: id,
                state: tcb.task_state,
                operation: "reprioritize",
            });
        }
        let (min, max) = (self.config.priority_min, self.config.priority_max);
        if priority < min || priority > max {
            return Err(FatalError::PriorityOutOfRange {
                task: id,
                priority,
                min,
                max,
            });
        }

        let rtcb = self.this_task();

        let mut switch_needed = self.remove_readytorun(id);
        self.tcb_mut(id)?.sched_priority = priority;
        switch_needed ^= self.add_readytorun(id);

        ktrace!("sched: reprioritize {id} -> {priority} switch={switch_needed}");
        if !switch_needed {
            return Ok(Dispatch::None);
        }

        if !self.pending.is_empty() {
            // The head is about to change anyway; whatever the merge does to
            // it, the dispatch below picks up the final head.
            let _ = self.merge_pending();
        }
        self.dispatch(rtcb)
    }

    /// Moves a blocked task to the ready-to-run list, switching context if
    /// it preempts the running task.
    ///
    /// Unlike [`reprioritize`](Self::reprioritize) this never merges the
    /// pending list; tasks parked there wait for the next unlock.
    ///
    /// # Errors
    ///
    /// [`FatalError::InvalidTaskState`] if the task is not blocked,
    /// [`FatalError::UnknownTask`] for an unknown id.
    pub fn unblock(&mut self, id: TaskId) -> Result<Dispatch, FatalError> {
        let tcb = self.tcb(id)?;
        if !tcb.task_state.is_blocked() {
            return Err(FatalError::InvalidTaskState {
                task: id,
                state: tcb.task_state,
                operation: "unblock",
            });
        }

        let rtcb = self.this_task();

        self.remove_blocked(id);
        let switch_needed = self.add_readytorun(id);

        ktrace!("sched: unblock {id} switch={switch_needed}");
        if switch_needed {
            self.dispatch(rtcb)
        } else {
            Ok(Dispatch::None)
        }
    }

    // -----------------------------------------------------------------------
    // Preemption lock
    // -----------------------------------------------------------------------

    /// Disables preemption for the running task. Nests.
    ///
    /// The count belongs to the task: if the holder is switched out, the
    /// task that replaces it runs unlocked.
    pub fn lock(&mut self) {
        let rtcb = self.this_task();
        if let Some(tcb) = self.tasks.get_mut(&rtcb) {
            tcb.lockcount += 1;
        }
    }

    /// Re-enables preemption once the running task releases its outermost
    /// lock, running any task that became ready in the meantime and
    /// outranks it.
    ///
    /// # Errors
    ///
    /// [`FatalError::UnbalancedUnlock`] if the running task holds no lock.
    pub fn unlock(&mut self) -> Result<Dispatch, FatalError> {
        let rtcb = self.this_task();
        let tcb = self.tcb_mut(rtcb)?;
        if tcb.lockcount == 0 {
            return Err(FatalError::UnbalancedUnlock);
        }
        tcb.lockcount -= 1;
        if tcb.lockcount > 0 || self.pending.is_empty() {
            return Ok(Dispatch::None);
        }

        kdebug!("sched: unlock merging {} pending task(s)", self.pending.len());
        if self.merge_pending() {
            self.dispatch(rtcb)
        } else {
            Ok(Dispatch::None)
        }
    }
}
