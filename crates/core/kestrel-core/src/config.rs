//! Compile-time kernel configuration.
//!
//! Runtime knobs (priority bounds enforced by the transition engine, cache
//! geometry for the loader) default to these values.

use crate::static_assert;

/// Priority of the idle task. Always the lowest in the system.
pub const SCHED_PRIORITY_IDLE: u8 = 0;

/// Lowest priority a regular task may hold.
pub const SCHED_PRIORITY_MIN: u8 = 1;

/// Highest priority a regular task may hold.
pub const SCHED_PRIORITY_MAX: u8 = 255;

/// Priority given to tasks created without an explicit one.
pub const SCHED_PRIORITY_DEFAULT: u8 = 100;

/// Maximum number of task control blocks, idle task included.
pub const MAX_TASKS: usize = 64;

/// Default size in bytes of one loader cache block.
pub const DEFAULT_CACHE_BLOCK_SIZE: usize = 4096;

/// Default number of loader cache blocks.
pub const DEFAULT_CACHE_BLOCKS: usize = 4;

/// Upper bound on loader cache blocks (fixed slot storage).
pub const MAX_CACHE_BLOCKS: usize = 8;

static_assert!(SCHED_PRIORITY_IDLE < SCHED_PRIORITY_MIN);
static_assert!(SCHED_PRIORITY_MIN <= SCHED_PRIORITY_DEFAULT);
static_assert!(SCHED_PRIORITY_DEFAULT <= SCHED_PRIORITY_MAX);
static_assert!(MAX_TASKS > 1, "idle task needs at least one peer");
static_assert!(DEFAULT_CACHE_BLOCK_SIZE.is_power_of_two());
static_assert!(DEFAULT_CACHE_BLOCKS <= MAX_CACHE_BLOCKS);
