//! # Stack-Headroom Monitor
//!
//! Reports how many words of a task's stack have never been written, and
//! decides when that margin is too small.
//!
//! The measuring strategy follows from how the stack was provisioned:
//!
//! | Provisioning | Strategy | Source |
//! |--------------|----------|--------|
//! | Static | [`Strategy::PatternScan`] | count sentinel words from the low end of the region |
//! | Dynamic | [`Strategy::Watermark`] | low-water mark advanced by the scheduler on every context switch |
//!
//! Both are approximations: a frame that stores the sentinel value itself
//! reads as untouched memory, so headroom can be over-reported. This is a
//! known false-negative risk of sentinel-based measurement.
//!
//! The policy is self-policing: a task measures its own headroom once per
//! unit of work and, on a breach, raises its fault indicator and deletes
//! itself. See [`Kernel::police_stack`](crate::kernel::Kernel::police_stack).

use crate::error::{KernelError, Result};
use crate::stack::Provisioning;
use crate::task::TaskControlBlock;

/// How headroom is measured for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Strategy {
    /// Scan the region for contiguous sentinel words.
    PatternScan,
    /// Read the scheduler-maintained low-water mark.
    Watermark,
}

impl Strategy {
    pub const fn for_provisioning(provisioning: Provisioning) -> Self {
        match provisioning {
            Provisioning::Static => Strategy::PatternScan,
            Provisioning::Dynamic => Strategy::Watermark,
        }
    }

    /// Unused words of `tcb`'s stack according to this strategy.
    pub fn measure(self, tcb: &TaskControlBlock) -> usize {
        match self {
            Strategy::PatternScan => tcb.stack().map_or(0, |s| s.untouched_words()),
            Strategy::Watermark => tcb.low_water_mark(),
        }
    }
}

/// Words of `tcb`'s stack never written so far.
///
/// # Errors
/// `TaskDeleted` once the task is gone.
pub fn headroom(tcb: &TaskControlBlock) -> Result<usize> {
    if tcb.is_deleted() {
        return Err(KernelError::TaskDeleted);
    }
    Ok(Strategy::for_provisioning(tcb.provisioning()).measure(tcb))
}

/// Outcome of a headroom check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    Healthy,
    /// Headroom fell below the threshold; the task must be sacrificed.
    Breach,
}

/// Breach threshold for one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackPolicy {
    threshold: usize,
}

impl StackPolicy {
    /// Breach once less than half of `capacity_words` is left.
    pub const fn half_of(capacity_words: usize) -> Self {
        Self {
            threshold: capacity_words / 2,
        }
    }

    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    pub const fn check(&self, headroom: usize) -> Verdict {
        if headroom < self.threshold {
            Verdict::Breach
        } else {
            Verdict::Healthy
        }
    }
}
