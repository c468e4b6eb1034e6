//! Compile-time static assertion macro.

/// Asserts a condition at compile time.
///
/// ```ignore
/// static_assert!(SCHED_PRIORITY_MIN <= SCHED_PRIORITY_MAX);
/// static_assert!(MAX_TASKS > 1, "idle task needs company");
/// ```
#[macro_export]
macro_rules! static_assert {
    ($cond:expr $(,)?) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}
