//! Ready-to-run, pending and blocked list mutation.
//!
//! These are the only functions that move tasks between lists. Each keeps
//! the list/state correspondence intact: the ready-list head is `Running`,
//! every other ready task is `ReadyToRun`, pending tasks are `Pending`,
//! and a task that has been unlinked is `Invalid` until it is linked again.

use kestrel_core::ktrace;
use kestrel_core::task::{TaskId, TaskState};

use crate::context::SchedulerContext;
use crate::cpu::Cpu;

impl<C: Cpu> SchedulerContext<C> {
    /// Unlinks a ready-to-run (or pending) task.
    ///
    /// Returns `true` if the task was the head of the ready-to-run list, in
    /// which case the next task is now `Running`.
    pub(crate) fn remove_readytorun(&mut self, id: TaskId) -> bool {
        let Some(state) = self.task(id).map(|t| t.task_state) else {
            return false;
        };

        let head_changed = if state == TaskState::Pending {
            self.pending.remove(id);
            false
        } else {
            let removed = self.ready.remove(id);
            debug_assert!(removed.is_some(), "{id} not on the ready-to-run list");
            removed.unwrap_or(false)
        };

        if head_changed {
            let head = self.this_task();
            self.set_state(head, TaskState::Running);
        }
        self.set_state(id, TaskState::Invalid);

        ktrace!("sched: remove_readytorun {id} head_changed={head_changed}");
        head_changed
    }

    /// Links a task into the ready-to-run list by its current priority.
    ///
    /// If the running task holds the preemption lock and the task outranks
    /// it, the task is parked on the pending list instead and `false` is returned.
    /// Otherwise returns `true` iff it became the new head; the previous
    /// head is then demoted to `ReadyToRun`.
    pub(crate) fn add_readytorun(&mut self, id: TaskId) -> bool {
        let Some(priority) = self.task(id).map(|t| t.sched_priority) else {
            return false;
        };
        let rtcb = self.this_task();
        let (rtcb_priority, rtcb_locked) = self
            .task(rtcb)
            .map_or((0, false), |t| (t.sched_priority, t.lockcount > 0));

        if rtcb_locked && rtcb_priority < priority {
            self.pending.insert(id, priority);
            self.set_state(id, TaskState::Pending);
            ktrace!("sched: add_readytorun {id} deferred to pending (locked)");
            return false;
        }

        let head_changed = self.ready.insert(id, priority);
        if head_changed {
            self.set_state(id, TaskState::Running);
            self.set_state(rtcb, TaskState::ReadyToRun);
        } else {
            self.set_state(id, TaskState::ReadyToRun);
        }

        ktrace!("sched: add_readytorun {id} prio {priority} head_changed={head_changed}");
        head_changed
    }

    /// Moves every pending task into the ready-to-run list.
    ///
    /// Returns `true` iff the head of the ready-to-run list changed.
    pub(crate) fn merge_pending(&mut self) -> bool {
        let rtcb = self.this_task();

        while let Some(entry) = self.pending.pop_head() {
            self.ready.insert(entry.id, entry.priority);
            self.set_state(entry.id, TaskState::ReadyToRun);
        }

        let head = self.this_task();
        let head_changed = head != rtcb;
        if head_changed {
            self.set_state(rtcb, TaskState::ReadyToRun);
            self.set_state(head, TaskState::Running);
        }

        ktrace!("sched: merge_pending head_changed={head_changed}");
        head_changed
    }

    /// Unlinks a task from the blocked list for its state.
    pub(crate) fn remove_blocked(&mut self, id: TaskId) {
        let Some(state) = self.task(id).map(|t| t.task_state) else {
            return;
        };
        if !state.is_blocked() {
            return;
        }
        let removed = self.blocked_list_mut(state).remove(id);
        debug_assert!(removed.is_some(), "{id} not on the {state:?} list");
        self.set_state(id, TaskState::Invalid);
        ktrace!("sched: remove_blocked {id} from {state:?}");
    }
}
