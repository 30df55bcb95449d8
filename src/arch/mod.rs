//! # Architecture Abstraction Layer
//!
//! The kernel reaches the CPU only through [`Port`]. The Cortex-M4 port is
//! compiled for bare-metal ARM targets; host tests supply their own port.

use crate::kernel::SchedulerCell;
use crate::task::TaskEntry;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

/// CPU services the kernel needs.
pub trait Port {
    /// Request a context switch at the next opportunity (PendSV on Cortex-M).
    fn pend_switch(&self);

    /// Sleep until the next interrupt.
    fn wait_for_interrupt(&self);

    /// Stack pointer of the running task, if it can be sampled.
    fn current_stack_pointer(&self) -> Option<*const u32>;

    /// Entry point of the idle task.
    fn idle_entry(&self) -> TaskEntry;

    /// Hand the CPU to the first task. Interrupt handlers reach the scheduler
    /// through `scheduler` from here on.
    fn launch(&self, scheduler: &'static SchedulerCell, first_sp: *mut u32) -> !;
}
