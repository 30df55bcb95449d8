//! # Task Control Block
//!
//! Per-task bookkeeping: identity, priority, state, owned stack region, saved
//! stack pointer, what the task is waiting for, and the low-water-mark tracker
//! used by the watermark headroom strategy.

use crate::config::{DEFAULT_TIME_SLICE, STACK_SENTINEL};
use crate::stack::{Provisioning, StackRegion};

/// Task entry point. Receives the opaque parameter given at creation.
pub type TaskEntry = extern "C" fn(usize) -> !;

/// Handle naming a task; the index of its slot in the task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(pub(crate) usize);

impl TaskHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲   ▲     preempt / yield        │
///        │   └────────────────────────────┤
///        │                                │ delay() / queue block
///        │         wake / deadline        ▼
///        │                          ┌──────────┐
///        └───────────────────────── │ Blocked  │
///                                   └──────────┘
///   any state ── delete() ──► Deleted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Deleted,
}

/// Identifies a handoff queue while a task is blocked on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueId(pub(crate) usize);

/// Why a Blocked task is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitReason {
    /// Timed delay; only the deadline wakes it.
    Delay,
    /// Waiting for a free slot in the queue.
    Space(QueueId),
    /// Waiting for an item in the queue.
    Data(QueueId),
}

/// Relative timeout supplied by callers of blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Block until the operation can complete.
    Forever,
    /// Block for at most this many ticks. `Ticks(0)` never blocks.
    Ticks(u32),
}

/// Absolute tick at which a blocked task is woken regardless of its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Deadline {
    Never,
    At(u64),
}

impl Deadline {
    /// Deadline `timeout` ticks after `now`.
    pub fn after(now: u64, timeout: Timeout) -> Self {
        match timeout {
            Timeout::Forever => Deadline::Never,
            Timeout::Ticks(t) => Deadline::At(now + t as u64),
        }
    }

    #[inline]
    pub fn expired(self, now: u64) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At(at) => now >= at,
        }
    }
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, set at creation time.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Human-readable name, used in logs only.
    pub name: &'static str,
    /// Fixed priority (higher = more important). 0 is reserved for idle.
    pub priority: u8,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// The TCB owns its stack region exclusively while the task lives. After
/// deletion the region is released and `stack` is `None`.
pub struct TaskControlBlock {
    pub handle: TaskHandle,
    pub config: TaskConfig,
    pub state: TaskState,

    pub(crate) entry: TaskEntry,
    pub(crate) param: usize,

    /// Owned stack region; `None` once released.
    pub(crate) stack: Option<StackRegion>,
    /// Provisioning of the stack, kept after the region is released.
    pub(crate) provisioning: Provisioning,
    /// Capacity of the stack in words, kept after the region is released.
    pub(crate) stack_words: usize,

    /// Saved stack pointer. Updated on every context switch.
    pub stack_pointer: *mut u32,

    pub(crate) wait: Option<WaitReason>,
    pub(crate) deadline: Deadline,

    /// Lowest word index of the stack ever observed in use. Everything below
    /// it has never been written.
    pub(crate) low_water: usize,

    /// Remaining ticks in the current round-robin slice.
    pub(crate) ticks_remaining: u32,
}

// Safety: stack_pointer always points into the task's own stack region and
// TCBs are only touched inside critical sections.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// Create a Ready TCB and build the initial frame on its stack.
    pub fn new(
        handle: TaskHandle,
        config: TaskConfig,
        entry: TaskEntry,
        param: usize,
        mut stack: StackRegion,
    ) -> Self {
        let stack_pointer = stack.init_frame(entry, param, task_exit);
        let low_water = stack.index_of(stack_pointer).unwrap_or(0);

        Self {
            handle,
            config,
            state: TaskState::Ready,
            entry,
            param,
            provisioning: stack.provisioning(),
            stack_words: stack.len_words(),
            stack: Some(stack),
            stack_pointer,
            wait: None,
            deadline: Deadline::Never,
            low_water,
            ticks_remaining: DEFAULT_TIME_SLICE,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TaskState::Deleted
    }

    pub fn entry(&self) -> TaskEntry {
        self.entry
    }

    pub fn param(&self) -> usize {
        self.param
    }

    pub fn priority(&self) -> u8 {
        self.config.priority
    }

    pub fn provisioning(&self) -> Provisioning {
        self.provisioning
    }

    /// Stack capacity in words.
    pub fn stack_words(&self) -> usize {
        self.stack_words
    }

    pub fn stack(&self) -> Option<&StackRegion> {
        self.stack.as_ref()
    }

    pub fn stack_mut(&mut self) -> Option<&mut StackRegion> {
        self.stack.as_mut()
    }

    /// Words below the deepest stack position observed so far.
    pub fn low_water_mark(&self) -> usize {
        self.low_water
    }

    /// Fold an observed stack pointer into the low-water mark.
    ///
    /// The mark first moves down to `sp`, then down to the lowest
    /// non-sentinel word beneath it. Frames pushed and popped between
    /// observations can leave holes of untouched words, so the scan runs up
    /// from the bottom of the region and stops at the first written word. It
    /// never looks above the previous mark.
    pub fn observe_stack_pointer(&mut self, sp: *const u32) {
        let Some(stack) = self.stack.as_ref() else {
            return;
        };
        let mark = match stack.index_of(sp) {
            Some(index) => self.low_water.min(index),
            // Below the region: the stack has overflowed.
            None if (sp as usize) < stack.base_ptr() as usize => 0,
            None => self.low_water,
        };
        self.low_water = stack.words()[..mark]
            .iter()
            .take_while(|&&w| w == STACK_SENTINEL)
            .count();
    }

    /// Move the task out of any wait.
    pub(crate) fn clear_wait(&mut self) {
        self.wait = None;
        self.deadline = Deadline::Never;
    }
}

/// Return address planted in every initial frame. Task entries never return,
/// so reaching this is a bug; park the core.
extern "C" fn task_exit() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FRAME_WORDS;

    extern "C" fn idle(_: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn tcb(words: usize) -> TaskControlBlock {
        let stack = StackRegion::reserve_dynamic(words).unwrap();
        TaskControlBlock::new(
            TaskHandle(1),
            TaskConfig {
                name: "t",
                priority: 2,
            },
            idle,
            0,
            stack,
        )
    }

    #[test]
    fn test_tcb_initialization() {
        let tcb = tcb(64);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.priority(), 2);
        assert_eq!(tcb.stack_words(), 64);
        assert_eq!(tcb.provisioning(), Provisioning::Dynamic);
        assert!(tcb.wait.is_none());
        assert_eq!(tcb.deadline, Deadline::Never);
        // Mark starts at the initial frame
        assert!(tcb.low_water_mark() <= 64 - FRAME_WORDS);
        assert!(tcb.low_water_mark() >= 64 - FRAME_WORDS - 1);
    }

    #[test]
    fn test_low_water_follows_deepest_pointer() {
        let mut tcb = tcb(64);
        let base = tcb.stack().unwrap().base_ptr() as usize;

        tcb.observe_stack_pointer((base + 40 * 4) as *const u32);
        assert_eq!(tcb.low_water_mark(), 40);

        // Shallower pointer never raises the mark
        tcb.observe_stack_pointer((base + 44 * 4) as *const u32);
        assert_eq!(tcb.low_water_mark(), 40);
    }

    #[test]
    fn test_low_water_sees_popped_frames() {
        let mut tcb = tcb(64);
        let base = tcb.stack().unwrap().base_ptr() as usize;
        // A deep call wrote words 20..44 and returned
        for w in &mut tcb.stack_mut().unwrap().words_mut()[20..44] {
            *w = 0xDEAD_BEEF;
        }
        tcb.observe_stack_pointer((base + 44 * 4) as *const u32);
        assert_eq!(tcb.low_water_mark(), 20);
    }

    #[test]
    fn test_low_water_skips_untouched_hole() {
        let mut tcb = tcb(96);
        let base = tcb.stack().unwrap().base_ptr() as usize;
        // Frames wrote words 20..80, but one padding word kept the sentinel
        let words = tcb.stack_mut().unwrap().words_mut();
        words[20..80].fill(0);
        words[30] = STACK_SENTINEL;

        tcb.observe_stack_pointer((base + 80 * 4) as *const u32);
        assert_eq!(tcb.low_water_mark(), 20);
    }

    #[test]
    fn test_pointer_below_region_means_overflow() {
        let mut tcb = tcb(64);
        let base = tcb.stack().unwrap().base_ptr() as usize;
        tcb.observe_stack_pointer((base - 8) as *const u32);
        assert_eq!(tcb.low_water_mark(), 0);
    }

    #[test]
    fn test_deadline() {
        assert_eq!(Deadline::after(10, Timeout::Ticks(5)), Deadline::At(15));
        assert_eq!(Deadline::after(10, Timeout::Forever), Deadline::Never);
        assert!(!Deadline::At(15).expired(14));
        assert!(Deadline::At(15).expired(15));
        assert!(!Deadline::Never.expired(u64::MAX));
    }
}
