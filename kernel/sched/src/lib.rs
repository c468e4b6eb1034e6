//! Scheduler core for the Kestrel kernel.
//!
//! Holds the task lists and the interrupt-context marker in a
//! [`SchedulerContext`], and implements the transitions that can change
//! which task runs: [`reprioritize`](SchedulerContext::reprioritize),
//! [`unblock`](SchedulerContext::unblock) and the preemption
//! [`unlock`](SchedulerContext::unlock). Each returns a [`Dispatch`]
//! describing the switch it performed, either immediately through the
//! [`Cpu`] primitives or deferred to the return from the current interrupt.
//!
//! The crate is `no_std` + `alloc` and host-testable; [`SoftCpu`] and the
//! [`Executor`](executor::Executor) stand in for the hardware.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod context;
pub mod cpu;
pub mod dispatch;
pub mod executor;
pub mod invariants;
pub mod list;
mod readytorun;
mod transition;

pub use context::{SchedConfig, SchedulerContext};
pub use cpu::{Cpu, SoftCpu};
pub use dispatch::Dispatch;
