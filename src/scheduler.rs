//! # Scheduler
//!
//! Fixed-priority preemptive scheduler with round-robin among equal
//! priorities.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt (`tick()`):
//! 1. **Advance time**: increment the tick counter
//! 2. **Wake**: every Blocked task whose deadline has passed becomes Ready
//! 3. **Preempt**: request a switch if a woken task outranks the running one
//! 4. **Rotate**: when the running task's slice expires and another Ready task
//!    of the same priority exists, request a switch
//!
//! On every switch (`schedule()`), from PendSV:
//! 1. Release stacks of deleted tasks (none of them is executing any more)
//! 2. Put the outgoing task back to Ready if it was still Running
//! 3. Select the highest-priority Ready task; among equals, keep the outgoing
//!    task while its slice lasts, otherwise take the next one in table order
//!
//! A task leaves the CPU only by delaying, yielding, blocking on a queue,
//! deleting itself, or being preempted by a higher-priority wake-up.

use crate::config::{DEFAULT_TIME_SLICE, MAX_TASKS};
use crate::error::{KernelError, Result};
use crate::stack::StackRegion;
use crate::task::{
    Deadline, TaskConfig, TaskControlBlock, TaskEntry, TaskHandle, TaskState, WaitReason,
};

/// Process-level state of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemState {
    /// Tasks are being registered; nothing runs yet.
    Starting,
    /// The scheduler is dispatching tasks.
    Running,
    /// Unrecoverable setup failure. Terminal: nothing is scheduled again.
    Faulted,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state: the TCB table and the dispatch bookkeeping.
/// Owned by the [`Kernel`](crate::kernel::Kernel) behind a critical-section
/// mutex.
pub struct Scheduler {
    tasks: [Option<TaskControlBlock>; MAX_TASKS],

    /// Number of allocated slots. Slots are never reused.
    task_count: usize,

    /// The task that owns the CPU, if the scheduler has started.
    current: Option<TaskHandle>,

    /// Monotonic tick counter.
    tick_count: u64,

    /// Set when a context switch should happen at the next opportunity.
    needs_reschedule: bool,

    state: SystemState,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    const EMPTY_SLOT: Option<TaskControlBlock> = None;

    pub const fn new() -> Self {
        Self {
            tasks: [Self::EMPTY_SLOT; MAX_TASKS],
            task_count: 0,
            current: None,
            tick_count: 0,
            needs_reschedule: false,
            state: SystemState::Starting,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a new task with the scheduler. The task is Ready immediately.
    ///
    /// # Errors
    /// - `Faulted` after the kernel entered its terminal state
    /// - `TaskTableFull` if all `MAX_TASKS` slots are taken
    pub fn create_task(
        &mut self,
        config: TaskConfig,
        entry: TaskEntry,
        param: usize,
        stack: StackRegion,
    ) -> Result<TaskHandle> {
        if self.state == SystemState::Faulted {
            return Err(KernelError::Faulted);
        }
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let handle = TaskHandle(self.task_count);
        let words = stack.len_words();
        self.tasks[handle.0] = Some(TaskControlBlock::new(handle, config, entry, param, stack));
        self.task_count += 1;

        if self.outranks_current(config.priority) {
            self.needs_reschedule = true;
        }

        crate::log_info!(
            "task {} '{}' created: priority {}, {} stack words",
            handle.0,
            config.name,
            config.priority,
            words
        );
        Ok(handle)
    }

    /// Leave the `Starting` state and pick the first task to run.
    pub fn start(&mut self) -> Result<TaskHandle> {
        match self.state {
            SystemState::Faulted => return Err(KernelError::Faulted),
            SystemState::Running => {}
            SystemState::Starting => self.state = SystemState::Running,
        }
        self.schedule().ok_or(KernelError::NotStarted)
    }

    /// Enter the terminal fault state. No task is scheduled afterwards.
    pub fn fault(&mut self) {
        self.state = SystemState::Faulted;
        self.needs_reschedule = false;
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Called from the SysTick handler every tick.
    ///
    /// Wakes tasks whose deadline passed and accounts the running task's
    /// slice. Returns `true` if a context switch should be pended.
    pub fn tick(&mut self) -> bool {
        if self.state != SystemState::Running {
            return false;
        }
        self.tick_count += 1;
        let now = self.tick_count;

        // --- Wake expired delays and timed-out waits ---
        for i in 0..self.task_count {
            let woken_priority = match self.tasks[i].as_mut() {
                Some(tcb) if tcb.state == TaskState::Blocked && tcb.deadline.expired(now) => {
                    tcb.state = TaskState::Ready;
                    tcb.clear_wait();
                    Some(tcb.priority())
                }
                _ => None,
            };
            if let Some(priority) = woken_priority {
                if self.outranks_current(priority) {
                    self.needs_reschedule = true;
                }
            }
        }

        // --- Round-robin slice of the running task ---
        if let Some(tcb) = self.running_mut() {
            tcb.ticks_remaining = tcb.ticks_remaining.saturating_sub(1);
            let (priority, expired) = (tcb.priority(), tcb.ticks_remaining == 0);
            if expired && self.has_ready_peer(priority) {
                self.needs_reschedule = true;
            }
        }

        self.needs_reschedule
    }

    /// Suspend the running task for `ticks` ticks. A delay of zero yields.
    ///
    /// The task becomes Ready again at the first tick at or after
    /// `now + ticks`; it may run later than that under load.
    pub fn delay(&mut self, ticks: u32) -> Result<()> {
        if ticks == 0 {
            return self.yield_current();
        }
        let deadline = Deadline::At(self.tick_count + ticks as u64);
        self.block_current(WaitReason::Delay, deadline)
    }

    /// Give up the CPU without blocking. The task stays Ready but goes behind
    /// its equal-priority peers.
    pub fn yield_current(&mut self) -> Result<()> {
        let tcb = self.running_mut().ok_or(KernelError::NotStarted)?;
        tcb.state = TaskState::Ready;
        tcb.ticks_remaining = 0;
        self.needs_reschedule = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Blocking and waking
    // -----------------------------------------------------------------------

    /// Block the running task until woken for `reason` or until `deadline`.
    ///
    /// A task that is already Blocked on the same `reason` but still executing,
    /// because the pended switch has not been taken yet, may block again.
    pub fn block_current(&mut self, reason: WaitReason, deadline: Deadline) -> Result<()> {
        let handle = self.current.ok_or(KernelError::NotStarted)?;
        let tcb = self.tasks[handle.0]
            .as_mut()
            .filter(|t| match t.state {
                TaskState::Running => true,
                TaskState::Blocked => t.wait == Some(reason),
                _ => false,
            })
            .ok_or(KernelError::NotStarted)?;
        tcb.state = TaskState::Blocked;
        tcb.wait = Some(reason);
        tcb.deadline = deadline;
        self.needs_reschedule = true;
        Ok(())
    }

    /// Make the highest-priority task blocked on `reason` Ready.
    ///
    /// Returns the woken task, if any. Requests a switch when the woken task
    /// outranks the running one.
    pub fn wake_one(&mut self, reason: WaitReason) -> Option<TaskHandle> {
        let handle = self
            .tasks()
            .filter(|t| t.state == TaskState::Blocked && t.wait == Some(reason))
            .fold(None::<&TaskControlBlock>, |best, t| match best {
                Some(b) if b.priority() >= t.priority() => Some(b),
                _ => Some(t),
            })
            .map(|t| t.handle)?;

        let tcb = self.tasks[handle.0].as_mut()?;
        tcb.state = TaskState::Ready;
        tcb.clear_wait();
        let priority = tcb.priority();

        if self.outranks_current(priority) {
            self.needs_reschedule = true;
        }
        Some(handle)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Remove a task from all scheduling consideration.
    ///
    /// Once this returns the task is never selected again. The stack region of
    /// a task that is not running is released immediately; a task deleting
    /// itself keeps its stack until the next `schedule()`, because it is still
    /// executing on it.
    pub fn delete(&mut self, handle: TaskHandle) -> Result<()> {
        let is_current = self.current == Some(handle);
        let tcb = self.task_mut(handle)?;
        if tcb.is_deleted() {
            return Err(KernelError::TaskDeleted);
        }
        tcb.state = TaskState::Deleted;
        tcb.clear_wait();
        if !is_current {
            tcb.stack = None;
        }
        let name = tcb.config.name;
        if is_current {
            self.needs_reschedule = true;
        }
        crate::log_info!("task {} '{}' deleted", handle.0, name);
        Ok(())
    }

    fn release_deleted_stacks(&mut self) {
        for tcb in self.tasks.iter_mut().flatten() {
            if tcb.is_deleted() {
                tcb.stack = None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Select the next task to run and mark it Running.
    ///
    /// Returns `None` if the kernel is not running or no task is Ready.
    pub fn schedule(&mut self) -> Option<TaskHandle> {
        self.needs_reschedule = false;
        if self.state != SystemState::Running {
            return None;
        }

        self.release_deleted_stacks();

        let prev = self.current;
        if let Some(tcb) = self.running_mut() {
            tcb.state = TaskState::Ready;
        }

        let next = self.select_next(prev);
        if let Some(handle) = next {
            if let Some(tcb) = self.tasks[handle.0].as_mut() {
                if prev != next || tcb.ticks_remaining == 0 {
                    tcb.ticks_remaining = DEFAULT_TIME_SLICE;
                }
                tcb.state = TaskState::Running;
            }
        }
        self.current = next;
        next
    }

    fn select_next(&self, prev: Option<TaskHandle>) -> Option<TaskHandle> {
        let best = self.tasks().filter(|t| t.is_ready()).map(|t| t.priority()).max()?;

        // Keep the outgoing task while its slice lasts
        if let Some(tcb) = prev.and_then(|h| self.tasks[h.0].as_ref()) {
            if tcb.is_ready() && tcb.priority() == best && tcb.ticks_remaining > 0 {
                return Some(tcb.handle);
            }
        }

        // Otherwise rotate: first ready peer after the outgoing task
        let start = prev.map_or(0, |h| h.0 + 1);
        (0..self.task_count)
            .map(|k| (start + k) % self.task_count)
            .filter_map(|i| self.tasks[i].as_ref())
            .find(|t| t.is_ready() && t.priority() == best)
            .map(|t| t.handle)
    }

    /// Record the outgoing task's stack pointer. Called from PendSV before
    /// `schedule()`; this is where the low-water mark is advanced.
    pub fn save_context(&mut self, sp: *mut u32) {
        if let Some(tcb) = self.current.and_then(|h| self.tasks[h.0].as_mut()) {
            tcb.stack_pointer = sp;
            tcb.observe_stack_pointer(sp);
        }
    }

    /// Fold a stack pointer sampled outside a context switch into a task's
    /// low-water mark.
    pub fn observe_stack_pointer(&mut self, handle: TaskHandle, sp: *const u32) -> Result<()> {
        self.task_mut(handle)?.observe_stack_pointer(sp);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn task(&self, handle: TaskHandle) -> Result<&TaskControlBlock> {
        self.tasks
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(KernelError::InvalidTask)
    }

    pub fn task_mut(&mut self, handle: TaskHandle) -> Result<&mut TaskControlBlock> {
        self.tasks
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(KernelError::InvalidTask)
    }

    /// Iterate over all registered tasks, deleted ones included.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskControlBlock> {
        self.tasks[..self.task_count].iter().flatten()
    }

    pub fn state_of(&self, handle: TaskHandle) -> Result<TaskState> {
        self.task(handle).map(|t| t.state)
    }

    #[inline]
    pub fn current(&self) -> Option<TaskHandle> {
        self.current
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    #[inline]
    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    #[inline]
    pub fn system_state(&self) -> SystemState {
        self.state
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    fn running_mut(&mut self) -> Option<&mut TaskControlBlock> {
        let handle = self.current?;
        self.tasks[handle.0]
            .as_mut()
            .filter(|t| t.state == TaskState::Running)
    }

    fn outranks_current(&self, priority: u8) -> bool {
        match self.current.and_then(|h| self.tasks[h.0].as_ref()) {
            Some(cur) if cur.state == TaskState::Running => priority > cur.priority(),
            _ => self.state == SystemState::Running,
        }
    }

    fn has_ready_peer(&self, priority: u8) -> bool {
        self.tasks()
            .any(|t| Some(t.handle) != self.current && t.is_ready() && t.priority() == priority)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
