//! Task control blocks and task states.

use core::fmt;

use crate::config::{SCHED_PRIORITY_DEFAULT, SCHED_PRIORITY_IDLE};
use crate::context::RegisterSet;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_to_run_range() {
        assert!(TaskState::Pending.is_ready_to_run());
        assert!(TaskState::ReadyToRun.is_ready_to_run());
        assert!(TaskState::Running.is_ready_to_run());
        assert!(!TaskState::Invalid.is_ready_to_run());
        assert!(!TaskState::Inactive.is_ready_to_run());
        assert!(!TaskState::WaitSem.is_ready_to_run());
    }

    #[test]
    fn blocked_range() {
        assert!(TaskState::Inactive.is_blocked());
        assert!(TaskState::WaitSem.is_blocked());
        assert!(TaskState::WaitSig.is_blocked());
        assert!(TaskState::WaitMqNotEmpty.is_blocked());
        assert!(TaskState::WaitMqNotFull.is_blocked());
        assert!(!TaskState::Running.is_blocked());
        assert!(!TaskState::Pending.is_blocked());
        assert!(!TaskState::Invalid.is_blocked());
    }

    #[test]
    fn prioritized_wait_lists() {
        assert!(TaskState::WaitSem.is_prioritized());
        assert!(TaskState::WaitMqNotFull.is_prioritized());
        assert!(!TaskState::Inactive.is_prioritized());
        assert!(!TaskState::WaitSig.is_prioritized());
    }

    #[test]
    fn tcb_defaults() {
        let tcb = Tcb::new(TaskId(3), "worker");
        assert_eq!(tcb.id, TaskId(3));
        assert_eq!(tcb.name, "worker");
        assert_eq!(tcb.task_state, TaskState::Inactive);
        assert_eq!(tcb.sched_priority, SCHED_PRIORITY_DEFAULT);
        assert_eq!(tcb.lockcount, 0);
    }

    #[test]
    fn tcb_builder() {
        let regs = RegisterSet::for_entry(0x100, 0x200);
        let tcb = Tcb::new(TaskId(1), "a")
            .with_priority(42)
            .with_state(TaskState::WaitSem)
            .with_context(regs);
        assert_eq!(tcb.sched_priority, 42);
        assert_eq!(tcb.task_state, TaskState::WaitSem);
        assert_eq!(tcb.xcp.pc(), 0x100);
    }

    #[test]
    fn idle_tcb() {
        let idle = Tcb::idle();
        assert_eq!(idle.id, TaskId::IDLE);
        assert_eq!(idle.sched_priority, SCHED_PRIORITY_IDLE);
        assert_eq!(idle.task_state, TaskState::Running);
    }

    #[test]
    fn task_id_display() {
        use alloc::string::ToString;
        assert_eq!(TaskId(12).to_string(), "#12");
    }
}

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Identifier reserved for the idle task.
    pub const IDLE: Self = Self(0);
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of distinct blocked states.
pub const BLOCKED_STATE_COUNT: usize = 5;

/// Which list a task is linked into.
///
/// The discriminants are ordered so that the ready-to-run and blocked
/// groups are contiguous ranges.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Not linked anywhere (being created or torn down).
    Invalid = 0,
    /// Ready, but held back because preemption is locked.
    Pending = 1,
    /// Ready and waiting for the CPU.
    ReadyToRun = 2,
    /// Head of the ready-to-run list.
    Running = 3,
    /// Created but not yet started, or stopped.
    Inactive = 4,
    /// Waiting on a semaphore.
    WaitSem = 5,
    /// Waiting for a signal.
    WaitSig = 6,
    /// Waiting for a message queue to become non-empty.
    WaitMqNotEmpty = 7,
    /// Waiting for a message queue to become non-full.
    WaitMqNotFull = 8,
}

impl TaskState {
    /// First state of the ready-to-run group.
    pub const FIRST_READY_TO_RUN: Self = Self::Pending;
    /// Last state of the ready-to-run group.
    pub const LAST_READY_TO_RUN: Self = Self::Running;
    /// First blocked state.
    pub const FIRST_BLOCKED: Self = Self::Inactive;
    /// Last blocked state.
    pub const LAST_BLOCKED: Self = Self::WaitMqNotFull;

    /// All blocked states, in discriminant order.
    pub const BLOCKED: [Self; BLOCKED_STATE_COUNT] = [
        Self::Inactive,
        Self::WaitSem,
        Self::WaitSig,
        Self::WaitMqNotEmpty,
        Self::WaitMqNotFull,
    ];

    /// `Pending ..= Running`.
    #[must_use]
    pub const fn is_ready_to_run(self) -> bool {
        let raw = self as u8;
        raw >= Self::FIRST_READY_TO_RUN as u8 && raw <= Self::LAST_READY_TO_RUN as u8
    }

    /// `Inactive ..= WaitMqNotFull`.
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        let raw = self as u8;
        raw >= Self::FIRST_BLOCKED as u8 && raw <= Self::LAST_BLOCKED as u8
    }

    /// Whether the blocked list for this state is kept in priority order
    /// rather than FIFO.
    #[must_use]
    pub const fn is_prioritized(self) -> bool {
        matches!(
            self,
            Self::WaitSem | Self::WaitMqNotEmpty | Self::WaitMqNotFull
        )
    }
}

/// Task control block.
#[derive(Debug, Clone)]
pub struct Tcb {
    /// Identifier, unique for the lifetime of the task.
    pub id: TaskId,
    /// Human-readable name for diagnostics.
    pub name: &'static str,
    /// List the task currently belongs to.
    pub task_state: TaskState,
    /// Current scheduling priority; higher runs first.
    pub sched_priority: u8,
    /// Preemption lock nesting depth held by this task.
    pub lockcount: u32,
    /// Registers saved while the task is off the CPU.
    pub xcp: RegisterSet,
}

impl Tcb {
    /// Creates an inactive TCB at the default priority.
    #[must_use]
    pub const fn new(id: TaskId, name: &'static str) -> Self {
        Self {
            id,
            name,
            task_state: TaskState::Inactive,
            sched_priority: SCHED_PRIORITY_DEFAULT,
            lockcount: 0,
            xcp: RegisterSet::zeroed(),
        }
    }

    /// The idle task: lowest priority, running from boot.
    #[must_use]
    pub const fn idle() -> Self {
        Self::new(TaskId::IDLE, "idle")
            .with_priority(SCHED_PRIORITY_IDLE)
            .with_state(TaskState::Running)
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.sched_priority = priority;
        self
    }

    /// Sets the initial task state.
    #[must_use]
    pub const fn with_state(mut self, state: TaskState) -> Self {
        self.task_state = state;
        self
    }

    /// Sets the saved register context.
    #[must_use]
    pub const fn with_context(mut self, xcp: RegisterSet) -> Self {
        self.xcp = xcp;
        self
    }
}
