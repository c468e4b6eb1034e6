//! Scheduler state shared by task and interrupt context.

use alloc::collections::BTreeMap;

use kestrel_core::config::{MAX_TASKS, SCHED_PRIORITY_MAX, SCHED_PRIORITY_MIN};
use kestrel_core::context::RegisterSet;
use kestrel_core::fatal::FatalError;
use kestrel_core::task::{BLOCKED_STATE_COUNT, TaskId, TaskState, Tcb};
use kestrel_core::{kdebug, kwarn};

use crate::cpu::Cpu;
use crate::list::TaskList;

/// Runtime scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Lowest priority accepted by [`reprioritize`](SchedulerContext::reprioritize).
    pub priority_min: u8,
    /// Highest priority accepted by [`reprioritize`](SchedulerContext::reprioritize).
    pub priority_max: u8,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            priority_min: SCHED_PRIORITY_MIN,
            priority_max: SCHED_PRIORITY_MAX,
        }
    }
}

/// All task lists plus the interrupt-context marker.
///
/// Every mutation must happen with interrupts masked; the kernel keeps the
/// context inside an [`IrqSpinLock`](kestrel_core::sync::IrqSpinLock).
pub struct SchedulerContext<C: Cpu> {
    pub(crate) tasks: BTreeMap<TaskId, Tcb>,
    pub(crate) ready: TaskList,
    pub(crate) pending: TaskList,
    pub(crate) blocked: [TaskList; BLOCKED_STATE_COUNT],
    pub(crate) current_regs: Option<RegisterSet>,
    pub(crate) config: SchedConfig,
    pub(crate) cpu: C,
}

impl<C: Cpu> SchedulerContext<C> {
    /// Creates a scheduler whose only task is the idle task, running.
    #[must_use]
    pub fn new(config: SchedConfig, cpu: C) -> Self {
        let idle = Tcb::idle();
        let mut ready = TaskList::prioritized();
        ready.insert(idle.id, idle.sched_priority);

        let mut tasks = BTreeMap::new();
        tasks.insert(idle.id, idle);

        Self {
            tasks,
            ready,
            pending: TaskList::prioritized(),
            blocked: TaskState::BLOCKED.map(|state| {
                if state.is_prioritized() {
                    TaskList::prioritized()
                } else {
                    TaskList::fifo()
                }
            }),
            current_regs: None,
            config,
            cpu,
        }
    }

    /// Hands a freshly created task to the scheduler.
    ///
    /// The task must be in a blocked state (normally
    /// [`TaskState::Inactive`]); it becomes runnable through
    /// [`unblock`](Self::unblock).
    ///
    /// # Errors
    ///
    /// [`FatalError::DuplicateTask`] if the identifier is taken,
    /// [`FatalError::TaskTableFull`] past [`MAX_TASKS`], and
    /// [`FatalError::InvalidTaskState`] for a non-blocked task.
    pub fn register(&mut self, tcb: Tcb) -> Result<(), FatalError> {
        if self.tasks.contains_key(&tcb.id) {
            return Err(FatalError::DuplicateTask(tcb.id));
        }
        if self.tasks.len() >= MAX_TASKS {
            return Err(FatalError::TaskTableFull);
        }
        if !tcb.task_state.is_blocked() {
            return Err(FatalError::InvalidTaskState {
                task: tcb.id,
                state: tcb.task_state,
                operation: "register",
            });
        }

        kdebug!(
            "sched: register {} '{}' prio {} as {:?}",
            tcb.id,
            tcb.name,
            tcb.sched_priority,
            tcb.task_state
        );
        self.blocked_list_mut(tcb.task_state)
            .insert(tcb.id, tcb.sched_priority);
        self.tasks.insert(tcb.id, tcb);
        Ok(())
    }

    /// The running task: head of the ready-to-run list.
    #[must_use]
    pub fn this_task(&self) -> TaskId {
        // The idle task is never removed, so the list is never empty.
        self.ready.head().unwrap_or(TaskId::IDLE)
    }

    /// Looks up a task control block.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Tcb> {
        self.tasks.get(&id)
    }

    /// Number of registered tasks, idle included.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Ready-to-run list, head first.
    #[must_use]
    pub fn ready_list(&self) -> &TaskList {
        &self.ready
    }

    /// Tasks held back while preemption is locked.
    #[must_use]
    pub fn pending_list(&self) -> &TaskList {
        &self.pending
    }

    /// Blocked list for `state`, or `None` if `state` is not a blocked
    /// state.
    #[must_use]
    pub fn blocked_list(&self, state: TaskState) -> Option<&TaskList> {
        state
            .is_blocked()
            .then(|| &self.blocked[blocked_index(state)])
    }

    pub(crate) fn blocked_list_mut(&mut self, state: TaskState) -> &mut TaskList {
        &mut self.blocked[blocked_index(state)]
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> SchedConfig {
        self.config
    }

    /// The CPU primitives.
    #[must_use]
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    /// The CPU primitives, mutably.
    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    /// Preemption lock nesting depth of the running task.
    #[must_use]
    pub fn lockcount(&self) -> u32 {
        self.task(self.this_task()).map_or(0, |t| t.lockcount)
    }

    // -----------------------------------------------------------------------
    // Interrupt-context marker
    // -----------------------------------------------------------------------

    /// Whether an interrupt or exception handler is executing.
    #[must_use]
    pub fn in_interrupt(&self) -> bool {
        self.current_regs.is_some()
    }

    /// The frame the current handler will return into.
    #[must_use]
    pub fn current_regs(&self) -> Option<&RegisterSet> {
        self.current_regs.as_ref()
    }

    /// Overwrites the marker. The fault path uses this to publish the
    /// faulting frame.
    pub fn set_current_regs(&mut self, regs: Option<RegisterSet>) {
        self.current_regs = regs;
    }

    /// Marks handler entry with the interrupted context.
    pub fn enter_interrupt(&mut self, frame: RegisterSet) {
        if self.current_regs.is_some() {
            kwarn!("sched: nested interrupt entry, previous frame dropped");
        }
        self.current_regs = Some(frame);
    }

    /// Marks handler exit and returns the frame to resume, which differs
    /// from the entry frame if a switch was deferred to this point.
    pub fn leave_interrupt(&mut self) -> Option<RegisterSet> {
        self.current_regs.take()
    }

    pub(crate) fn tcb(&self, id: TaskId) -> Result<&Tcb, FatalError> {
        self.tasks.get(&id).ok_or(FatalError::UnknownTask(id))
    }

    pub(crate) fn tcb_mut(&mut self, id: TaskId) -> Result<&mut Tcb, FatalError> {
        self.tasks.get_mut(&id).ok_or(FatalError::UnknownTask(id))
    }

    pub(crate) fn set_state(&mut self, id: TaskId, state: TaskState) {
        if let Some(tcb) = self.tasks.get_mut(&id) {
            tcb.task_state = state;
        }
    }
}

fn blocked_index(state: TaskState) -> usize {
    usize::from(state as u8 - TaskState::FIRST_BLOCKED as u8)
}
