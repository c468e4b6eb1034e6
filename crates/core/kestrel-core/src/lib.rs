//! Core types and synchronization primitives for the Kestrel kernel.
//!
//! This crate holds the host-testable pieces shared by the scheduler,
//! the binary loader and the architecture layer: task control blocks and
//! their states, the saved register set, errno codes, the fatal-error
//! taxonomy with its halt hook, leveled logging, and the interrupt-safe
//! spin lock.
//!
//! Nothing here touches hardware directly except the interrupt mask
//! primitives, which compile to no-ops off target so the whole crate can
//! be exercised with `cargo test` on the host.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod context;
pub mod errno;
pub mod fatal;
pub mod log;
pub mod static_assert;
pub mod sync;
pub mod task;
