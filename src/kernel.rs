//! # Kernel
//!
//! The process-scoped context object. [`Kernel`] owns the scheduler and the
//! CPU port; tasks receive a `&'static Kernel` (through their parameter or an
//! application context) and call into it for every kernel service.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► Kernel::new(port)          ← Context object, scheduler Starting
//!         ├─► LedBank::new(board pins)   ← configure_output_bank, once
//!         ├─► Kernel::create_static() /
//!         │   Kernel::create_dynamic()   ← Register tasks (×N)
//!         └─► Kernel::start(idle stack)  ← Idle task, first dispatch (no return)
//!               ├─► Configure SysTick, interrupt priorities
//!               └─► Start first task via Port::launch()
//! ```
//!
//! Any failure on this path goes to the fault path: the application raises
//! its setup indicator and calls [`Kernel::halt`], which puts the scheduler in
//! the terminal `Faulted` state.
//!
//! ## Blocking
//!
//! Blocking calls (`delay`, `send`, `receive`) update the scheduler inside a
//! critical section and then pend a context switch. When the task is resumed
//! it re-evaluates its condition, so a blocking call is a loop of
//! scheduler-aware steps.

use core::task::Poll;

use crate::arch::Port;
use crate::config::{ms_to_ticks, IDLE_PRIORITY};
use crate::error::{KernelError, QueueError, Result};
use crate::monitor::{self, StackPolicy, Verdict};
use crate::queue::Queue;
use crate::scheduler::{Scheduler, SystemState};
use crate::serial::SerialPort;
use crate::stack::StackRegion;
use crate::sync::{self, Shared};
use crate::task::{Deadline, TaskConfig, TaskEntry, TaskHandle, TaskState, Timeout};

/// The scheduler as shared with interrupt handlers.
pub type SchedulerCell = Shared<Scheduler>;

/// Kernel context object.
pub struct Kernel<P: Port> {
    scheduler: SchedulerCell,
    port: P,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P) -> Self {
        Self {
            scheduler: sync::shared(Scheduler::new()),
            port,
        }
    }

    /// Run `f` with exclusive access to the scheduler.
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        sync::with(&self.scheduler, f)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    // -----------------------------------------------------------------------
    // Task registration
    // -----------------------------------------------------------------------

    /// Register a task on an already provisioned stack region.
    pub fn create_task(
        &self,
        config: TaskConfig,
        entry: TaskEntry,
        param: usize,
        stack: StackRegion,
    ) -> Result<TaskHandle> {
        let (handle, preempt) = self.with_scheduler(|s| {
            let handle = s.create_task(config, entry, param, stack)?;
            Ok::<_, KernelError>((handle, s.needs_reschedule()))
        })?;
        if preempt {
            self.port.pend_switch();
        }
        Ok(handle)
    }

    /// Register a task whose stack is caller-owned static memory.
    pub fn create_static(
        &self,
        config: TaskConfig,
        entry: TaskEntry,
        param: usize,
        stack: &'static mut [u32],
    ) -> Result<TaskHandle> {
        let region = StackRegion::reserve_static(stack)?;
        self.create_task(config, entry, param, region)
    }

    /// Register a task whose stack is taken from the allocator.
    ///
    /// # Errors
    /// `OutOfMemory` if the heap cannot provide `stack_words` words.
    pub fn create_dynamic(
        &self,
        config: TaskConfig,
        entry: TaskEntry,
        param: usize,
        stack_words: usize,
    ) -> Result<TaskHandle> {
        let region = StackRegion::reserve_dynamic(stack_words)?;
        self.create_task(config, entry, param, region)
    }

    // -----------------------------------------------------------------------
    // Startup and the fault path
    // -----------------------------------------------------------------------

    /// Register the idle task and select the first task to run.
    ///
    /// Returns the first task's initial stack pointer.
    pub fn prepare_start(&self, idle_stack: StackRegion) -> Result<*mut u32> {
        let idle = TaskConfig {
            name: "idle",
            priority: IDLE_PRIORITY,
        };
        let entry = self.port.idle_entry();
        self.with_scheduler(|s| {
            s.create_task(idle, entry, 0, idle_stack)?;
            let first = s.start()?;
            Ok(s.task(first)?.stack_pointer)
        })
    }

    /// Start the scheduler. **Does not return.**
    ///
    /// On failure the kernel halts in the `Faulted` state.
    pub fn start(&'static self, idle_stack: StackRegion) -> ! {
        match self.prepare_start(idle_stack) {
            Ok(first_sp) => {
                crate::log_info!(
                    "scheduler starting with {} tasks",
                    self.with_scheduler(|s| s.task_count())
                );
                self.port.launch(&self.scheduler, first_sp)
            }
            Err(e) => {
                crate::log_error!("scheduler start failed: {}", e);
                self.halt()
            }
        }
    }

    /// Enter the terminal `Faulted` state and stop. Nothing is scheduled
    /// afterwards.
    pub fn halt(&self) -> ! {
        self.with_scheduler(|s| s.fault());
        crate::log_error!("kernel halted");
        loop {
            self.port.wait_for_interrupt();
        }
    }

    pub fn system_state(&self) -> SystemState {
        self.with_scheduler(|s| s.system_state())
    }

    // -----------------------------------------------------------------------
    // Running-task services
    // -----------------------------------------------------------------------

    pub fn current(&self) -> Option<TaskHandle> {
        self.with_scheduler(|s| s.current())
    }

    pub fn state(&self, task: TaskHandle) -> Result<TaskState> {
        self.with_scheduler(|s| s.state_of(task))
    }

    pub fn tick_count(&self) -> u64 {
        self.with_scheduler(|s| s.tick_count())
    }

    /// Suspend the calling task for at least `ticks` ticks. Zero yields.
    pub fn delay(&self, ticks: u32) {
        if self.with_scheduler(|s| s.delay(ticks)).is_ok() {
            self.port.pend_switch();
        }
    }

    pub fn delay_ms(&self, ms: u32) {
        self.delay(ms_to_ticks(ms));
    }

    pub fn yield_now(&self) {
        if self.with_scheduler(|s| s.yield_current()).is_ok() {
            self.port.pend_switch();
        }
    }

    /// Delete `task`. Once this returns the task never runs again.
    pub fn delete(&self, task: TaskHandle) -> Result<()> {
        let is_current = self.with_scheduler(|s| {
            s.delete(task)?;
            Ok::<_, KernelError>(s.current() == Some(task))
        })?;
        if is_current {
            self.port.pend_switch();
        }
        Ok(())
    }

    /// Delete the calling task. **Does not return.**
    pub fn delete_self(&self) -> ! {
        if let Some(me) = self.current() {
            if let Err(e) = self.delete(me) {
                crate::log_error!("self-delete of task {} failed: {}", me.index(), e);
            }
        }
        loop {
            self.port.pend_switch();
            self.port.wait_for_interrupt();
        }
    }

    // -----------------------------------------------------------------------
    // Stack supervision
    // -----------------------------------------------------------------------

    /// Words of `task`'s stack never written so far.
    ///
    /// For the calling task the current stack pointer is folded into the
    /// low-water mark first, so a watermark-measured task sees its own
    /// present depth and not only what the last context switch recorded.
    pub fn headroom(&self, task: TaskHandle) -> Result<usize> {
        let sp = self.port.current_stack_pointer();
        self.with_scheduler(|s| {
            if let Some(sp) = sp.filter(|_| s.current() == Some(task)) {
                s.observe_stack_pointer(task, sp)?;
            }
            monitor::headroom(s.task(task)?)
        })
    }

    /// Self-policing stack check for the calling task.
    ///
    /// Measures the caller's headroom against half its capacity. On a breach
    /// `on_breach(headroom)` runs (to raise the fault indicator) and the task
    /// deletes itself; the call does not return. Otherwise the headroom is
    /// returned.
    pub fn police_stack(&self, on_breach: impl FnOnce(usize)) -> Result<usize> {
        let me = self.current().ok_or(KernelError::NotStarted)?;
        let capacity = self.with_scheduler(|s| s.task(me).map(|t| t.stack_words()))?;
        let headroom = self.headroom(me)?;

        if StackPolicy::half_of(capacity).check(headroom) == Verdict::Breach {
            crate::log_warn!(
                "task {} stack breach: {} of {} words left",
                me.index(),
                headroom,
                capacity
            );
            on_breach(headroom);
            self.delete_self();
        }
        Ok(headroom)
    }

    // -----------------------------------------------------------------------
    // Handoff queue
    // -----------------------------------------------------------------------

    /// Enqueue `value`, blocking while the queue is full for at most
    /// `timeout`.
    pub fn send<T: Copy, const N: usize>(
        &self,
        queue: &Queue<T, N>,
        value: T,
        timeout: Timeout,
    ) -> core::result::Result<(), QueueError> {
        let deadline = self.deadline_after(timeout);
        loop {
            let step = critical_section::with(|cs| {
                let mut s = self.scheduler.borrow_ref_mut(cs);
                let mut q = queue.cell().borrow_ref_mut(cs);
                let step = q.send_step(&mut s, value, deadline);
                (step, s.needs_reschedule())
            });
            match step {
                (Poll::Ready(result), preempt) => {
                    if preempt {
                        self.port.pend_switch();
                    }
                    return result;
                }
                (Poll::Pending, _) => self.port.pend_switch(),
            }
        }
    }

    /// Dequeue the oldest item, blocking while the queue is empty for at most
    /// `timeout`.
    pub fn receive<T: Copy, const N: usize>(
        &self,
        queue: &Queue<T, N>,
        timeout: Timeout,
    ) -> core::result::Result<T, QueueError> {
        let deadline = self.deadline_after(timeout);
        loop {
            let step = critical_section::with(|cs| {
                let mut s = self.scheduler.borrow_ref_mut(cs);
                let mut q = queue.cell().borrow_ref_mut(cs);
                let step = q.receive_step(&mut s, deadline);
                (step, s.needs_reschedule())
            });
            match step {
                (Poll::Ready(result), preempt) => {
                    if preempt {
                        self.port.pend_switch();
                    }
                    return result;
                }
                (Poll::Pending, _) => self.port.pend_switch(),
            }
        }
    }

    fn deadline_after(&self, timeout: Timeout) -> Deadline {
        self.with_scheduler(|s| Deadline::after(s.tick_count(), timeout))
    }

    // -----------------------------------------------------------------------
    // Serial input
    // -----------------------------------------------------------------------

    /// Block the calling task until `serial` yields a byte. Polls once per
    /// tick, sleeping in between.
    pub fn read_byte<S: SerialPort>(&self, serial: &mut S) -> u8 {
        loop {
            if let Some(byte) = serial.poll_byte() {
                return byte;
            }
            self.delay(1);
        }
    }
}
