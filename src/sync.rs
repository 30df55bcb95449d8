//! # Synchronization Primitives
//!
//! Interrupt-safe shared state for the kernel and its tasks.
//! Every structure touched by more than one task, or by a task and an
//! interrupt handler, lives in a [`Shared`] cell and is only borrowed inside a
//! critical section.
//!
//! On target the critical section comes from `cortex-m`'s single-core
//! implementation (interrupts disabled on entry, restored on exit). Host tests
//! use `critical-section`'s `std` implementation.

use core::cell::RefCell;

use critical_section::Mutex;

/// Mutable state shared across tasks and interrupt handlers.
pub type Shared<T> = Mutex<RefCell<T>>;

/// Create a shared cell. Usable in `static` initializers.
pub const fn shared<T>(value: T) -> Shared<T> {
    Mutex::new(RefCell::new(value))
}

/// Run `f` with exclusive access to the shared value, inside a critical
/// section.
///
/// Keep the closure short: interrupts (and therefore the scheduler tick) are
/// masked for its whole duration.
#[inline]
pub fn with<T, R>(cell: &Shared<T>, f: impl FnOnce(&mut T) -> R) -> R {
    critical_section::with(|cs| f(&mut cell.borrow_ref_mut(cs)))
}
