//! POSIX-style error numbers for I/O paths.
//!
//! Loader and filesystem code reports recoverable conditions as an
//! [`Errno`]. The numeric values follow Linux so that negated codes can be
//! handed straight back to user space.

use core::fmt;

/// A positive error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Errno(i32);

impl Errno {
    /// Interrupted system call; the operation may be retried.
    pub const EINTR: Self = Self(4);
    /// Generic I/O failure.
    pub const EIO: Self = Self(5);
    /// Out of memory.
    pub const ENOMEM: Self = Self(12);
    /// Invalid argument.
    pub const EINVAL: Self = Self(22);
    /// Illegal seek.
    pub const ESPIPE: Self = Self(29);
    /// No data available (unexpected end of file).
    pub const ENODATA: Self = Self(61);

    /// Wraps a raw positive error number.
    #[must_use]
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// The positive error number.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// The negated error number, as returned across the syscall boundary.
    #[must_use]
    pub const fn as_neg(self) -> i32 {
        -self.0
    }

    /// Whether the failed operation may simply be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        self.0 == Self::EINTR.0
    }

    const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            4 => "EINTR",
            5 => "EIO",
            12 => "ENOMEM",
            22 => "EINVAL",
            29 => "ESPIPE",
            61 => "ENODATA",
            _ => return None,
        })
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}
