//! # Demo Applications
//!
//! The three firmware variants, as library code so their task bodies can be
//! exercised on the host:
//!
//! | Module | Tasks | Stacks |
//! |--------|-------|--------|
//! | [`caterpillar`] | LED sweeper on / off | static |
//! | [`serial_leds`] | serial ingress -> queue -> LED consumer | dynamic |
//! | [`stack_guard`] | two self-policing workloads | one static, one dynamic |
//!
//! Task entries receive their application context as the task parameter: the
//! address of a `'static` value that outlives the scheduler.

pub mod caterpillar;
pub mod serial_leds;
pub mod stack_guard;

use crate::arch::Port;
use crate::kernel::Kernel;
use crate::led::{Fault, LedBank, OutputBank};
use crate::sync::{self, Shared};

/// The LED bank as shared between tasks.
pub type SharedLeds<B> = Shared<LedBank<B>>;

/// Setup failed: raise the red pair and halt in the `Faulted` state.
pub fn fatal<P: Port, B: OutputBank>(kernel: &Kernel<P>, leds: &SharedLeds<B>) -> ! {
    sync::with(leds, |l| l.indicate(Fault::Setup));
    kernel.halt()
}

/// Task parameter naming `ctx`.
fn param_of<T>(ctx: &'static T) -> usize {
    ctx as *const T as usize
}

/// Recover the context behind a task parameter.
///
/// # Safety
/// `param` must come from [`param_of`] for the same `T`.
unsafe fn context<T>(param: usize) -> &'static T {
    &*(param as *const T)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::StrictPort;
    use crate::led::leds;
    use crate::led::mock::MockBank;
    use crate::scheduler::SystemState;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_fatal_raises_setup_pair_and_faults() {
        let kernel = Kernel::new(StrictPort::new(0));
        let bank: SharedLeds<MockBank> = sync::shared(LedBank::new(MockBank::default()));

        let parked = catch_unwind(AssertUnwindSafe(|| {
            fatal(&kernel, &bank);
        }));
        assert!(parked.is_err());
        assert_eq!(kernel.system_state(), SystemState::Faulted);
        sync::with(&bank, |l| {
            assert!(l.bank().is_high(leds::RED_1));
            assert!(l.bank().is_high(leds::RED_2));
        });
    }
}
