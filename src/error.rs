//! # Kernel Errors
//!
//! Every kernel call reports its outcome to the immediate caller. Success
//! is `Ok`; the two failure kinds are [`KernelError::Fail`] and
//! [`KernelError::Timeout`]. There is no unwinding: a task that ignores an
//! error simply continues unsynchronized.

use core::fmt;

/// Failure reported by a kernel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// Invalid argument or violated precondition: releasing a mutex you do
    /// not own, a receive buffer that is too small, an exhausted arena or
    /// message pool, an unknown handle.
    Fail,
    /// A bounded wait expired, or the resource was unavailable and the
    /// caller asked not to wait.
    Timeout,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Fail => write!(f, "fail"),
            KernelError::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result type used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;
