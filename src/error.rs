//! Kernel error types
//!
//! Every fallible kernel operation reports one of these. Setup failures are
//! routed to the fault path by the caller; none of them is retried.

use core::fmt;

/// Result type for kernel operations
pub type Result<T> = core::result::Result<T, KernelError>;

/// Kernel-level errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The task table has no free slot
    TaskTableFull,
    /// The allocator could not provide a dynamic stack region
    OutOfMemory,
    /// Requested stack is smaller than `MIN_STACK_WORDS`
    StackTooSmall,
    /// Handle does not name a registered task
    InvalidTask,
    /// Task has already been deleted
    TaskDeleted,
    /// Operation needs a running task but the scheduler has not started
    NotStarted,
    /// The kernel is in its terminal fault state
    Faulted,
}

/// Handoff queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// The timeout elapsed before space (send) or data (receive) appeared.
    /// The queue is left unchanged.
    TimedOut,
    /// The operation was attempted outside a running task
    Kernel(KernelError),
}

impl From<KernelError> for QueueError {
    fn from(e: KernelError) -> Self {
        QueueError::Kernel(e)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::TaskTableFull => write!(f, "task table full"),
            KernelError::OutOfMemory => write!(f, "out of memory for stack region"),
            KernelError::StackTooSmall => write!(f, "stack region too small"),
            KernelError::InvalidTask => write!(f, "invalid task handle"),
            KernelError::TaskDeleted => write!(f, "task deleted"),
            KernelError::NotStarted => write!(f, "scheduler not started"),
            KernelError::Faulted => write!(f, "kernel faulted"),
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::TimedOut => write!(f, "queue operation timed out"),
            QueueError::Kernel(e) => write!(f, "queue: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", KernelError::OutOfMemory), "out of memory for stack region");
        assert_eq!(
            format!("{}", QueueError::from(KernelError::NotStarted)),
            "queue: scheduler not started"
        );
    }
}
