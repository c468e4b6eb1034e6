//! Runtime-checkable scheduler invariants.
//!
//! Used by tests after every transition and by the kernel's debug checks.
//!
//! 1. **Single membership**: every task is linked into exactly one list,
//!    and that list matches its state.
//! 2. **Ready ordering**: the ready-to-run list is sorted by descending
//!    priority and records each task's current priority.
//! 3. **Head state**: the head is `Running`, all others `ReadyToRun`.
//! 4. **Idle presence**: the idle task is always ready to run.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use kestrel_core::task::{TaskId, TaskState};

use crate::context::SchedulerContext;
use crate::cpu::Cpu;
use crate::list::TaskList;

/// A violated invariant.
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Short name of the invariant.
    pub invariant: &'static str,
    /// What was found.
    pub description: String,
}

/// Checks every scheduler invariant; an empty result means all hold.
pub fn check_all_invariants<C: Cpu>(ctx: &SchedulerContext<C>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_single_membership(ctx));
    violations.extend(check_ready_ordering(ctx));
    violations.extend(check_head_state(ctx));
    violations.extend(check_idle_presence(ctx));

    violations
}

fn lists<C: Cpu>(ctx: &SchedulerContext<C>) -> impl Iterator<Item = (&'static str, &TaskList)> {
    [("ready", &ctx.ready), ("pending", &ctx.pending)]
        .into_iter()
        .chain(
            TaskState::BLOCKED
                .iter()
                .zip(ctx.blocked.iter())
                .map(|(state, list)| (blocked_name(*state), list)),
        )
}

fn blocked_name(state: TaskState) -> &'static str {
    match state {
        TaskState::Inactive => "inactive",
        TaskState::WaitSem => "wait_sem",
        TaskState::WaitSig => "wait_sig",
        TaskState::WaitMqNotEmpty => "wait_mq_not_empty",
        _ => "wait_mq_not_full",
    }
}

fn list_accepts(name: &str, state: TaskState) -> bool {
    match name {
        "ready" => matches!(state, TaskState::ReadyToRun | TaskState::Running),
        "pending" => state == TaskState::Pending,
        other => state.is_blocked() && blocked_name(state) == other,
    }
}

/// Invariant 1.
fn check_single_membership<C: Cpu>(ctx: &SchedulerContext<C>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (id, tcb) in &ctx.tasks {
        let homes: Vec<&str> = lists(ctx)
            .filter(|(_, list)| list.contains(*id))
            .map(|(name, _)| name)
            .collect();
        match homes.as_slice() {
            [home] if list_accepts(home, tcb.task_state) => {}
            [home] => violations.push(InvariantViolation {
                invariant: "single_membership",
                description: format!("task {id} in state {:?} is on the {home} list", tcb.task_state),
            }),
            _ => violations.push(InvariantViolation {
                invariant: "single_membership",
                description: format!("task {id} is linked into {} lists: {homes:?}", homes.len()),
            }),
        }
    }

    for (name, list) in lists(ctx) {
        for id in list.ids() {
            if !ctx.tasks.contains_key(&id) {
                violations.push(InvariantViolation {
                    invariant: "single_membership",
                    description: format!("{name} list links unknown task {id}"),
                });
            }
        }
    }

    violations
}

/// Invariant 2.
fn check_ready_ordering<C: Cpu>(ctx: &SchedulerContext<C>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for pair in ctx.ready.entries().windows(2) {
        if pair[0].priority < pair[1].priority {
            violations.push(InvariantViolation {
                invariant: "ready_ordering",
                description: format!(
                    "task {} (prio {}) ahead of task {} (prio {})",
                    pair[0].id, pair[0].priority, pair[1].id, pair[1].priority
                ),
            });
        }
    }

    for entry in ctx.ready.entries().iter().chain(ctx.pending.entries()) {
        let Some(tcb) = ctx.tasks.get(&entry.id) else {
            continue;
        };
        if tcb.sched_priority != entry.priority {
            violations.push(InvariantViolation {
                invariant: "ready_ordering",
                description: format!(
                    "task {} linked at prio {} but has prio {}",
                    entry.id, entry.priority, tcb.sched_priority
                ),
            });
        }
    }

    violations
}

/// Invariant 3.
fn check_head_state<C: Cpu>(ctx: &SchedulerContext<C>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (index, id) in ctx.ready.ids().enumerate() {
        let expected = if index == 0 {
            TaskState::Running
        } else {
            TaskState::ReadyToRun
        };
        let actual = ctx.tasks.get(&id).map(|t| t.task_state);
        if actual != Some(expected) {
            violations.push(InvariantViolation {
                invariant: "head_state",
                description: format!("task {id} at position {index} is {actual:?}, expected {expected:?}"),
            });
        }
    }

    violations
}

/// Invariant 4.
fn check_idle_presence<C: Cpu>(ctx: &SchedulerContext<C>) -> Vec<InvariantViolation> {
    if ctx.ready.contains(TaskId::IDLE) {
        Vec::new()
    } else {
        alloc::vec![InvariantViolation {
            invariant: "idle_presence",
            description: String::from("idle task is not ready to run"),
        }]
    }
}
