//! Variable-length caterpillar
//!
//! Two equal-priority tasks on static stacks walk the LED ring: one switches
//! the LED under its cursor on every 250 ms, the other switches the LED under
//! its own cursor off every 170 ms. The differing periods make the lit segment
//! grow and shrink.

use crate::arch::Port;
use crate::config::LED_COUNT;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::led::{Level, OutputBank};
use crate::sync;
use crate::task::TaskConfig;

use super::{context, param_of, SharedLeds};

pub const ON_PERIOD_MS: u32 = 250;
pub const OFF_PERIOD_MS: u32 = 170;

/// Words per sweeper stack.
pub const STACK_WORDS: usize = 32;

const PRIORITY: u8 = 1;

/// Wrapping LED position owned by one sweeper.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    next: usize,
}

impl Cursor {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Current LED; moves on to the following one.
    pub fn advance(&mut self) -> usize {
        let led = self.next;
        self.next = (self.next + 1) % LED_COUNT;
        led
    }
}

/// Application context shared by both sweepers.
pub struct Caterpillar<P: Port + 'static, B: OutputBank + 'static> {
    kernel: &'static Kernel<P>,
    leds: &'static SharedLeds<B>,
}

impl<P: Port + 'static, B: OutputBank + 'static> Caterpillar<P, B> {
    pub const fn new(kernel: &'static Kernel<P>, leds: &'static SharedLeds<B>) -> Self {
        Self { kernel, leds }
    }

    /// Register both sweepers on the given static stacks.
    pub fn spawn(
        &'static self,
        on_stack: &'static mut [u32],
        off_stack: &'static mut [u32],
    ) -> Result<()> {
        let param = param_of(self);
        self.kernel.create_static(
            TaskConfig {
                name: "led-on",
                priority: PRIORITY,
            },
            light_task::<P, B>,
            param,
            on_stack,
        )?;
        self.kernel.create_static(
            TaskConfig {
                name: "led-off",
                priority: PRIORITY,
            },
            dim_task::<P, B>,
            param,
            off_stack,
        )?;
        Ok(())
    }

    /// One sweep step: drive the LED under `cursor` and advance it.
    pub fn step(&self, cursor: &mut Cursor, level: Level) -> usize {
        let led = cursor.advance();
        sync::with(self.leds, |l| l.set(led, level));
        led
    }

    fn sweep(&self, level: Level, period_ms: u32) -> ! {
        let mut cursor = Cursor::new();
        loop {
            self.step(&mut cursor, level);
            self.kernel.delay_ms(period_ms);
        }
    }
}

extern "C" fn light_task<P: Port + 'static, B: OutputBank + 'static>(param: usize) -> ! {
    let app = unsafe { context::<Caterpillar<P, B>>(param) };
    app.sweep(Level::High, ON_PERIOD_MS)
}

extern "C" fn dim_task<P: Port + 'static, B: OutputBank + 'static>(param: usize) -> ! {
    let app = unsafe { context::<Caterpillar<P, B>>(param) };
    app.sweep(Level::Low, OFF_PERIOD_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::TestPort;
    use crate::led::mock::MockBank;
    use crate::led::LedBank;
    use crate::stack::Provisioning;
    use alloc::boxed::Box;

    fn leaked_stack() -> &'static mut [u32] {
        Box::leak(alloc::vec![0u32; STACK_WORDS].into_boxed_slice())
    }

    fn app() -> &'static Caterpillar<TestPort, MockBank> {
        let kernel = Box::leak(Box::new(Kernel::new(TestPort::default())));
        let leds = Box::leak(Box::new(sync::shared(LedBank::new(MockBank::default()))));
        Box::leak(Box::new(Caterpillar::new(kernel, leds)))
    }

    #[test]
    fn test_cursor_wraps() {
        let mut cursor = Cursor::new();
        let visited: alloc::vec::Vec<usize> = (0..LED_COUNT + 2).map(|_| cursor.advance()).collect();
        assert_eq!(visited[..LED_COUNT], [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(visited[LED_COUNT..], [0, 1]);
    }

    #[test]
    fn test_spawn_uses_static_stacks() {
        let app = app();
        app.spawn(leaked_stack(), leaked_stack()).unwrap();
        app.kernel.with_scheduler(|s| {
            assert_eq!(s.task_count(), 2);
            assert!(s.tasks().all(|t| t.provisioning() == Provisioning::Static));
            assert!(s.tasks().all(|t| t.priority() == PRIORITY));
        });
    }

    #[test]
    fn test_on_sweep_then_off_sweep() {
        let app = app();
        let (mut on, mut off) = (Cursor::new(), Cursor::new());
        for _ in 0..3 {
            app.step(&mut on, Level::High);
        }
        assert_eq!(sync::with(app.leds, |l| l.bank().levels), 0b0111 << 8);

        app.step(&mut off, Level::Low);
        assert_eq!(sync::with(app.leds, |l| l.bank().levels), 0b0110 << 8);
    }
}
