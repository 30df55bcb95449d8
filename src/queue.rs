//! # Bounded Handoff Queue
//!
//! Fixed-capacity FIFO moving `Copy` values from one producer task to one
//! consumer task.
//!
//! - At most `N` items are ever enqueued.
//! - Items leave in the order they entered, exactly once.
//! - A full queue blocks the sender and an empty queue blocks the receiver,
//!   each up to its deadline.
//! - A send that times out leaves the queue untouched.
//!
//! [`HandoffQueue`] holds the items and implements one *step* of a blocking
//! operation against the scheduler: either the operation completes, or the
//! calling task is marked Blocked and the caller must switch away and retry.
//! [`Queue`] is the `'static`-friendly wrapper the kernel's blocking `send` /
//! `receive` loops operate on; the step always runs inside one critical
//! section together with the scheduler, so no task or interrupt ever sees a
//! half-applied update.

use core::task::Poll;

use heapless::Deque;

use crate::error::QueueError;
use crate::scheduler::Scheduler;
use crate::sync::{self, Shared};
use crate::task::{Deadline, QueueId, WaitReason};

/// Queue storage plus the scheduler-aware step functions.
pub struct HandoffQueue<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T: Copy, const N: usize> Default for HandoffQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> HandoffQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    /// Identity used to match blocked tasks with this queue. Stable as long as
    /// the queue does not move, which holds while anyone is blocked on it.
    #[inline]
    pub fn id(&self) -> QueueId {
        QueueId(self as *const Self as usize)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    /// Append without blocking. Hands the value back if the queue is full.
    pub fn try_send(&mut self, value: T) -> Result<(), T> {
        self.items.push_back(value)
    }

    /// Take the oldest item without blocking.
    pub fn try_receive(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// One attempt of a blocking send by the running task.
    ///
    /// - `Ready(Ok(()))`: enqueued; a receiver waiting for data was woken.
    /// - `Ready(Err(TimedOut))`: full and `deadline` has passed; nothing changed.
    /// - `Pending`: full; the running task is now Blocked waiting for space.
    pub fn send_step(
        &mut self,
        scheduler: &mut Scheduler,
        value: T,
        deadline: Deadline,
    ) -> Poll<Result<(), QueueError>> {
        let id = self.id();
        if self.try_send(value).is_ok() {
            scheduler.wake_one(WaitReason::Data(id));
            return Poll::Ready(Ok(()));
        }
        if deadline.expired(scheduler.tick_count()) {
            return Poll::Ready(Err(QueueError::TimedOut));
        }
        match scheduler.block_current(WaitReason::Space(id), deadline) {
            Ok(()) => Poll::Pending,
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }

    /// One attempt of a blocking receive by the running task.
    ///
    /// Mirrors [`send_step`](Self::send_step): on success a sender waiting for
    /// space is woken.
    pub fn receive_step(
        &mut self,
        scheduler: &mut Scheduler,
        deadline: Deadline,
    ) -> Poll<Result<T, QueueError>> {
        let id = self.id();
        if let Some(value) = self.try_receive() {
            scheduler.wake_one(WaitReason::Space(id));
            return Poll::Ready(Ok(value));
        }
        if deadline.expired(scheduler.tick_count()) {
            return Poll::Ready(Err(QueueError::TimedOut));
        }
        match scheduler.block_current(WaitReason::Data(id), deadline) {
            Ok(()) => Poll::Pending,
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }
}

/// A handoff queue that can live in a `static` or a `StaticCell` and be shared
/// by the producer and consumer tasks.
pub struct Queue<T, const N: usize> {
    inner: Shared<HandoffQueue<T, N>>,
}

impl<T: Copy, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            inner: sync::shared(HandoffQueue::new()),
        }
    }

    pub fn len(&self) -> usize {
        sync::with(&self.inner, |q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn cell(&self) -> &Shared<HandoffQueue<T, N>> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackRegion;
    use crate::task::{TaskConfig, TaskHandle, TaskState};

    extern "C" fn noop(_: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn scheduler_with(priorities: &[u8]) -> (Scheduler, alloc::vec::Vec<TaskHandle>) {
        let mut s = Scheduler::new();
        let handles = priorities
            .iter()
            .map(|&priority| {
                let stack = StackRegion::reserve_dynamic(64).unwrap();
                s.create_task(TaskConfig { name: "t", priority }, noop, 0, stack)
                    .unwrap()
            })
            .collect();
        s.start().unwrap();
        (s, handles)
    }

    #[test]
    fn test_fifo_order() {
        let mut q: HandoffQueue<u8, 4> = HandoffQueue::new();
        for v in [3, 1, 4, 1] {
            q.try_send(v).unwrap();
        }
        assert!(q.is_full());
        assert_eq!(q.try_send(5), Err(5));

        let out: alloc::vec::Vec<u8> = core::iter::from_fn(|| q.try_receive()).collect();
        assert_eq!(out, alloc::vec![3, 1, 4, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_send_blocks_when_full() {
        let (mut s, tasks) = scheduler_with(&[0, 1]);
        let producer = tasks[1];
        let mut q: HandoffQueue<u8, 1> = HandoffQueue::new();

        assert_eq!(q.send_step(&mut s, 1, Deadline::Never), Poll::Ready(Ok(())));
        assert_eq!(q.send_step(&mut s, 2, Deadline::Never), Poll::Pending);
        assert_eq!(s.state_of(producer).unwrap(), TaskState::Blocked);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_retry_before_switch_stays_pending() {
        let (mut s, tasks) = scheduler_with(&[0, 1]);
        let task = tasks[1];
        let mut q: HandoffQueue<u8, 1> = HandoffQueue::new();
        q.try_send(1).unwrap();

        // The pended switch has not happened, so the same task steps again
        assert_eq!(q.send_step(&mut s, 2, Deadline::Never), Poll::Pending);
        assert_eq!(q.send_step(&mut s, 2, Deadline::Never), Poll::Pending);
        assert_eq!(s.state_of(task).unwrap(), TaskState::Blocked);
        assert_eq!(q.len(), 1);

        let mut empty: HandoffQueue<u8, 1> = HandoffQueue::new();
        s.schedule();
        s.yield_current().unwrap();
        s.wake_one(WaitReason::Space(q.id()));
        assert_eq!(s.schedule(), Some(task));
        assert_eq!(empty.receive_step(&mut s, Deadline::Never), Poll::Pending);
        assert_eq!(empty.receive_step(&mut s, Deadline::Never), Poll::Pending);
        assert_eq!(s.state_of(task).unwrap(), TaskState::Blocked);
    }

    #[test]
    fn test_receive_wakes_blocked_sender() {
        let (mut s, tasks) = scheduler_with(&[1, 1]);
        let (producer, consumer) = (tasks[0], tasks[1]);
        let mut q: HandoffQueue<u8, 1> = HandoffQueue::new();

        assert_eq!(s.current(), Some(producer));
        assert!(q.send_step(&mut s, 10, Deadline::Never).is_ready());
        assert!(q.send_step(&mut s, 11, Deadline::Never).is_pending());
        assert_eq!(s.schedule(), Some(consumer));

        assert_eq!(q.receive_step(&mut s, Deadline::Never), Poll::Ready(Ok(10)));
        assert_eq!(s.state_of(producer).unwrap(), TaskState::Ready);

        s.yield_current().unwrap();
        assert_eq!(s.schedule(), Some(producer));
        assert_eq!(q.send_step(&mut s, 11, Deadline::Never), Poll::Ready(Ok(())));
        assert_eq!(q.try_receive(), Some(11));
    }

    #[test]
    fn test_send_timeout_leaves_queue_unchanged() {
        let (mut s, tasks) = scheduler_with(&[0, 1]);
        let producer = tasks[1];
        let mut q: HandoffQueue<u8, 2> = HandoffQueue::new();
        q.try_send(7).unwrap();
        q.try_send(8).unwrap();

        let deadline = Deadline::At(s.tick_count() + 3);
        assert!(q.send_step(&mut s, 9, deadline).is_pending());
        s.schedule();
        for _ in 0..3 {
            s.tick();
        }
        assert_eq!(s.state_of(producer).unwrap(), TaskState::Ready);
        assert_eq!(s.schedule(), Some(producer));

        assert_eq!(
            q.send_step(&mut s, 9, deadline),
            Poll::Ready(Err(QueueError::TimedOut))
        );
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_receive(), Some(7));
        assert_eq!(q.try_receive(), Some(8));
    }

    #[test]
    fn test_zero_timeout_never_blocks() {
        let (mut s, tasks) = scheduler_with(&[1]);
        let mut q: HandoffQueue<u8, 2> = HandoffQueue::new();
        let now = Deadline::At(s.tick_count());

        assert_eq!(
            q.receive_step(&mut s, now),
            Poll::Ready(Err(QueueError::TimedOut))
        );
        assert_eq!(s.state_of(tasks[0]).unwrap(), TaskState::Running);
    }

    #[test]
    fn test_blocking_without_running_task() {
        let mut s = Scheduler::new();
        let mut q: HandoffQueue<u8, 2> = HandoffQueue::new();
        assert_eq!(
            q.receive_step(&mut s, Deadline::Never),
            Poll::Ready(Err(QueueError::Kernel(crate::KernelError::NotStarted)))
        );
    }

    #[test]
    fn test_shared_queue_len() {
        let q: Queue<u8, 4> = Queue::new();
        assert!(q.is_empty());
        sync::with(q.cell(), |inner| inner.try_send(1)).unwrap();
        assert_eq!(q.len(), 1);
    }
}
