//! Software dispatch loop.
//!
//! On hardware, a normal-context switch transfers control and never comes
//! back to the caller until the caller is scheduled again. The executor
//! models that with one continuation per task: after each step it looks up
//! the head of the ready-to-run list and resumes that task's continuation.
//! Interrupts are modeled by [`Executor::interrupt`], which brackets a
//! handler with entry and exit of interrupt context and loads the frame
//! the handler returns into.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use kestrel_core::fatal::FatalError;
use kestrel_core::task::TaskId;
use kestrel_core::{kdebug, ktrace};

use crate::context::SchedulerContext;
use crate::cpu::SoftCpu;

/// What a task continuation wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume whichever task is at the head of the ready-to-run list.
    Yield,
    /// Stop the dispatch loop.
    Stop,
}

/// A task body, resumed once per scheduling of its task.
pub type Continuation =
    Box<dyn FnMut(&mut SchedulerContext<SoftCpu>) -> Result<Step, FatalError>>;

/// Runs task continuations on a [`SoftCpu`].
pub struct Executor {
    ctx: SchedulerContext<SoftCpu>,
    bodies: BTreeMap<TaskId, Continuation>,
}

impl Executor {
    /// Wraps a scheduler context.
    #[must_use]
    pub fn new(ctx: SchedulerContext<SoftCpu>) -> Self {
        Self {
            ctx,
            bodies: BTreeMap::new(),
        }
    }

    /// The scheduler.
    #[must_use]
    pub fn context(&self) -> &SchedulerContext<SoftCpu> {
        &self.ctx
    }

    /// The scheduler, mutably.
    pub fn context_mut(&mut self) -> &mut SchedulerContext<SoftCpu> {
        &mut self.ctx
    }

    /// Installs the body of `id`, replacing any previous one.
    pub fn spawn<F>(&mut self, id: TaskId, body: F)
    where
        F: FnMut(&mut SchedulerContext<SoftCpu>) -> Result<Step, FatalError> + 'static,
    {
        self.bodies.insert(id, Box::new(body));
    }

    /// Resumes the running task repeatedly, at most `max_steps` times.
    ///
    /// Stops early when a body returns [`Step::Stop`] or when the running
    /// task has no body (typically the idle task). Returns the tasks that
    /// were resumed, in order.
    ///
    /// # Errors
    ///
    /// Propagates the first [`FatalError`] returned by a body.
    pub fn run(&mut self, max_steps: usize) -> Result<Vec<TaskId>, FatalError> {
        let mut trace = Vec::new();

        for _ in 0..max_steps {
            let current = self.ctx.this_task();
            let Some(body) = self.bodies.get_mut(&current) else {
                kdebug!("executor: {current} has no body, stopping");
                break;
            };

            ktrace!("executor: resume {current}");
            trace.push(current);
            if body(&mut self.ctx)? == Step::Stop {
                break;
            }
        }

        Ok(trace)
    }

    /// Runs `handler` in interrupt context.
    ///
    /// The live registers become the interrupt frame; whatever frame is
    /// left when the handler returns is loaded back into the CPU, so a
    /// switch deferred by the handler takes effect here.
    ///
    /// # Errors
    ///
    /// Propagates the handler's error. Interrupt context is left either
    /// way.
    pub fn interrupt<R>(
        &mut self,
        handler: impl FnOnce(&mut SchedulerContext<SoftCpu>) -> Result<R, FatalError>,
    ) -> Result<R, FatalError> {
        let frame = self.ctx.cpu().live;
        self.ctx.enter_interrupt(frame);
        let result = handler(&mut self.ctx);
        if let Some(resume) = self.ctx.leave_interrupt() {
            self.ctx.cpu_mut().live = resume;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SchedConfig;
    use crate::dispatch::Dispatch;
    use crate::invariants::check_all_invariants;
    use kestrel_core::context::RegisterSet;
    use kestrel_core::task::Tcb;
    use std::cell::RefCell;
    use std::rc::Rc;

    const A: TaskId = TaskId(1);
    const B: TaskId = TaskId(2);

    fn executor(tasks: &[(TaskId, u8)]) -> Executor {
        let mut ctx = SchedulerContext::new(
            SchedConfig {
                priority_min: 0,
                priority_max: 31,
            },
            SoftCpu::new(),
        );
        for &(id, prio) in tasks {
            let entry = 0x1000 * (id.0 + 1);
            ctx.register(
                Tcb::new(id, "t")
                    .with_priority(prio)
                    .with_context(RegisterSet::for_entry(entry, entry + 0x800)),
            )
            .unwrap();
            let _ = ctx.unblock(id).unwrap();
        }
        Executor::new(ctx)
    }

    #[test]
    fn yield_resumes_new_head() {
        let mut exec = executor(&[(A, 10), (B, 5)]);
        exec.spawn(A, |ctx| {
            let dispatch = ctx.reprioritize(A, 3)?;
            assert_eq!(dispatch, Dispatch::Switched { from: A, to: B });
            Ok(Step::Yield)
        });
        exec.spawn(B, |_| Ok(Step::Stop));

        assert_eq!(exec.run(10).unwrap(), [A, B]);
        assert_eq!(exec.context().cpu().live.pc(), 0x3000);
        assert!(check_all_invariants(exec.context()).is_empty());
    }

    #[test]
    fn stops_when_idle_has_no_body() {
        let mut exec = executor(&[(A, 10)]);
        exec.spawn(A, |ctx| {
            let _ = ctx.reprioritize(A, 0)?;
            // Equal to idle: A goes behind it, idle takes over.
            Ok(Step::Yield)
        });
        assert_eq!(exec.run(10).unwrap(), [A]);
        assert_eq!(exec.context().this_task(), TaskId::IDLE);
    }

    #[test]
    fn interleaves_until_budget() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut exec = executor(&[(A, 10), (B, 10)]);
        for id in [A, B] {
            let log = Rc::clone(&log);
            exec.spawn(id, move |ctx| {
                log.borrow_mut().push(id);
                // Same priority: requeue behind the peer.
                let _ = ctx.reprioritize(id, 10)?;
                Ok(Step::Yield)
            });
        }
        let trace = exec.run(4).unwrap();
        assert_eq!(trace, [A, B, A, B]);
        assert_eq!(*log.borrow(), trace);
    }

    #[test]
    fn body_error_propagates() {
        let mut exec = executor(&[(A, 10)]);
        exec.spawn(A, |ctx| {
            let _ = ctx.reprioritize(A, 99)?;
            Ok(Step::Yield)
        });
        assert!(matches!(
            exec.run(3),
            Err(FatalError::PriorityOutOfRange { priority: 99, .. })
        ));
    }

    #[test]
    fn interrupt_switch_takes_effect_on_return() {
        let mut exec = executor(&[(A, 10)]);
        exec.context_mut()
            .register(
                Tcb::new(B, "b")
                    .with_priority(20)
                    .with_context(RegisterSet::for_entry(0xb000, 0xb800)),
            )
            .unwrap();
        let before = exec.context().cpu().live;

        let dispatch = exec.interrupt(|ctx| ctx.unblock(B)).unwrap();

        assert_eq!(dispatch, Dispatch::Deferred { from: A, to: B });
        assert!(!exec.context().in_interrupt());
        assert_eq!(exec.context().cpu().live.pc(), 0xb000);
        assert_eq!(exec.context().task(A).unwrap().xcp, before);
    }
}
