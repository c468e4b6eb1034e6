//! Kestrel kernel library.
//!
//! Ties the scheduler to the rest of the kernel: [`Kernel`] owns the
//! scheduler state behind an interrupt-safe lock and escalates every
//! scheduler contract violation to the halt hook. Also home to the ARM
//! fault entry and the kernel heap layout.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod arch;
pub mod mm;
pub mod sched;

pub use kestrel_core::log::LogLevel;
pub use kestrel_core::{kdebug, kerr, kfatal, kinfo, klog, ktrace, kwarn};
pub use kestrel_core::{kprint, kprintln};
pub use sched::Kernel;
