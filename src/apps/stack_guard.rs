//! # Stack guard
//!
//! Two tasks run the same depth-growing workload: a recursive factorial for
//! `n` in `0..TEST_VALUE`, each level holding a small scratch buffer. After
//! every step a task polices its own stack and blinks its green LED.
//!
//! | Task | Stack | Headroom strategy | Breach indicator |
//! |------|-------|-------------------|------------------|
//! | `guard-static` | 128 words, static | pattern scan | orange pair |
//! | `guard-dynamic` | 256 words, heap | low-water mark | blue pair |
//!
//! On a breach (headroom below half the capacity) the task switches its green
//! LED off, raises its indicator pair and deletes itself. The other task is
//! unaffected.

use core::hint::black_box;

use crate::arch::Port;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::led::{leds, Fault, LedBank, Level, OutputBank};
use crate::stack::Provisioning;
use crate::sync;
use crate::task::TaskConfig;

use super::{context, param_of, SharedLeds};

/// Upper bound (exclusive) of the workload argument.
pub const TEST_VALUE: u32 = 20;

pub const BLINK_MS: u32 = 200;

pub const STATIC_STACK_WORDS: usize = 128;
pub const DYNAMIC_STACK_WORDS: usize = 256;

const PRIORITY: u8 = 1;

/// Recursive factorial. Every level keeps a four-word scratch buffer on the
/// stack so stack depth grows linearly with `n`.
#[inline(never)]
pub fn depth_probe(n: u32) -> u64 {
    let scratch = black_box([n; 4]);
    if n <= 1 {
        return 1;
    }
    u64::from(scratch[3]) * depth_probe(n - 1)
}

/// Switch the task's green LED off and raise its indicator pair.
pub fn signal_breach<B: OutputBank>(leds: &mut LedBank<B>, green: usize, fault: Fault) {
    leds.set(green, Level::Low);
    leds.indicate(fault);
}

/// Per-task context of one guarded workload.
pub struct Guard<P: Port + 'static, B: OutputBank + 'static> {
    kernel: &'static Kernel<P>,
    leds: &'static SharedLeds<B>,
    provisioning: Provisioning,
}

impl<P: Port + 'static, B: OutputBank + 'static> Guard<P, B> {
    pub const fn new(
        kernel: &'static Kernel<P>,
        leds: &'static SharedLeds<B>,
        provisioning: Provisioning,
    ) -> Self {
        Self {
            kernel,
            leds,
            provisioning,
        }
    }

    pub const fn green(&self) -> usize {
        match self.provisioning {
            Provisioning::Static => leds::GREEN_1,
            Provisioning::Dynamic => leds::GREEN_2,
        }
    }

    pub const fn fault(&self) -> Fault {
        match self.provisioning {
            Provisioning::Static => Fault::StaticStack,
            Provisioning::Dynamic => Fault::DynamicStack,
        }
    }

    /// One unit of work: run the workload for `n`, police the stack, blink.
    ///
    /// Does not return if the stack check fails.
    pub fn step(&self, n: u32) -> Result<usize> {
        black_box(depth_probe(black_box(n)));
        let headroom = self.kernel.police_stack(|headroom| {
            crate::log_warn!("headroom {} words, giving up", headroom);
            sync::with(self.leds, |l| signal_breach(l, self.green(), self.fault()));
        })?;
        sync::with(self.leds, |l| l.toggle(self.green()));
        Ok(headroom)
    }

    fn run(&self) -> ! {
        loop {
            for n in 0..TEST_VALUE {
                if let Err(e) = self.step(n) {
                    crate::log_error!("stack check failed: {}", e);
                }
                self.kernel.delay_ms(BLINK_MS);
            }
        }
    }
}

/// Register both guarded tasks. `scan` must be the static-provisioned guard
/// and `mark` the dynamic one.
pub fn spawn<P: Port + 'static, B: OutputBank + 'static>(
    kernel: &'static Kernel<P>,
    scan: &'static Guard<P, B>,
    mark: &'static Guard<P, B>,
    static_stack: &'static mut [u32],
) -> Result<()> {
    kernel.create_static(
        TaskConfig {
            name: "guard-static",
            priority: PRIORITY,
        },
        guard_task::<P, B>,
        param_of(scan),
        static_stack,
    )?;
    kernel.create_dynamic(
        TaskConfig {
            name: "guard-dynamic",
            priority: PRIORITY,
        },
        guard_task::<P, B>,
        param_of(mark),
        DYNAMIC_STACK_WORDS,
    )?;
    Ok(())
}

extern "C" fn guard_task<P: Port + 'static, B: OutputBank + 'static>(param: usize) -> ! {
    let guard = unsafe { context::<Guard<P, B>>(param) };
    guard.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::TestPort;
    use crate::led::mock::MockBank;
    use crate::stack::StackRegion;
    use alloc::boxed::Box;

    fn fixture() -> (
        &'static Kernel<TestPort>,
        &'static SharedLeds<MockBank>,
        &'static Guard<TestPort, MockBank>,
        &'static Guard<TestPort, MockBank>,
    ) {
        let kernel: &'static Kernel<TestPort> = Box::leak(Box::new(Kernel::new(TestPort::default())));
        let leds: &'static SharedLeds<MockBank> =
            Box::leak(Box::new(sync::shared(LedBank::new(MockBank::default()))));
        let scan = Box::leak(Box::new(Guard::new(kernel, leds, Provisioning::Static)));
        let mark = Box::leak(Box::new(Guard::new(kernel, leds, Provisioning::Dynamic)));
        (kernel, leds, scan, mark)
    }

    #[test]
    fn test_depth_probe_is_factorial() {
        assert_eq!(depth_probe(0), 1);
        assert_eq!(depth_probe(5), 120);
        assert_eq!(depth_probe(19), 121_645_100_408_832_000);
    }

    #[test]
    fn test_indicators_by_provisioning() {
        let (_, _, scan, mark) = fixture();
        assert_eq!((scan.green(), scan.fault()), (leds::GREEN_1, Fault::StaticStack));
        assert_eq!((mark.green(), mark.fault()), (leds::GREEN_2, Fault::DynamicStack));
    }

    #[test]
    fn test_signal_breach() {
        let mut ring = LedBank::new(MockBank::default());
        ring.set(leds::GREEN_1, Level::High);
        signal_breach(&mut ring, leds::GREEN_1, Fault::StaticStack);

        assert!(!ring.bank().is_high(leds::GREEN_1));
        assert!(ring.bank().is_high(leds::ORANGE_1));
        assert!(ring.bank().is_high(leds::ORANGE_2));
        assert_eq!(ring.bank().levels.count_ones(), 2);
    }

    #[test]
    fn test_spawn_provisions_both_kinds() {
        let (kernel, _, scan, mark) = fixture();
        let stack = Box::leak(alloc::vec![0u32; STATIC_STACK_WORDS].into_boxed_slice());
        spawn(kernel, scan, mark, stack).unwrap();

        kernel.with_scheduler(|s| {
            let kinds: alloc::vec::Vec<(Provisioning, usize)> =
                s.tasks().map(|t| (t.provisioning(), t.stack_words())).collect();
            assert_eq!(
                kinds,
                [
                    (Provisioning::Static, STATIC_STACK_WORDS),
                    (Provisioning::Dynamic, DYNAMIC_STACK_WORDS),
                ]
            );
        });
    }

    #[test]
    fn test_healthy_step_blinks_green() {
        let (kernel, ring, scan, mark) = fixture();
        let stack = Box::leak(alloc::vec![0u32; STATIC_STACK_WORDS].into_boxed_slice());
        spawn(kernel, scan, mark, stack).unwrap();
        kernel
            .prepare_start(StackRegion::reserve_dynamic(64).unwrap())
            .unwrap();

        // Host stacks never touch the task regions, so headroom stays full
        let headroom = scan.step(3).unwrap();
        assert_eq!(headroom, STATIC_STACK_WORDS - crate::config::FRAME_WORDS);
        assert!(sync::with(ring, |l| l.bank().is_high(leds::GREEN_1)));
        scan.step(4).unwrap();
        assert!(!sync::with(ring, |l| l.bank().is_high(leds::GREEN_1)));
    }
}
