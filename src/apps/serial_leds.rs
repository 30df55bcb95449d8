//! Serial-controlled LEDs
//!
//! ```text
//!  USART ──poll──► ingress ──send──► [ Queue<Command, 8> ] ──receive──► consumer ──► LEDs
//!                 (decode,                                              (apply)
//!                  drop junk)
//! ```
//!
//! Both tasks run on dynamically provisioned stacks at equal priority. Bytes
//! that are not commands never reach the queue.

use crate::arch::Port;
use crate::command::Command;
use crate::config::COMMAND_QUEUE_CAPACITY;
use crate::error::{QueueError, Result};
use crate::kernel::Kernel;
use crate::led::OutputBank;
use crate::queue::Queue;
use crate::serial::SerialPort;
use crate::sync::{self, Shared};
use crate::task::{TaskConfig, Timeout};

use super::{context, param_of, SharedLeds};

/// Words per task stack.
pub const STACK_WORDS: usize = 128;

const PRIORITY: u8 = 1;

/// Application context: the command queue and the serial port, which the
/// ingress task takes over when it starts.
pub struct SerialLeds<P: Port + 'static, B: OutputBank + 'static, S: SerialPort + 'static> {
    kernel: &'static Kernel<P>,
    leds: &'static SharedLeds<B>,
    queue: Queue<Command, COMMAND_QUEUE_CAPACITY>,
    serial: Shared<Option<S>>,
}

impl<P, B, S> SerialLeds<P, B, S>
where
    P: Port + 'static,
    B: OutputBank + 'static,
    S: SerialPort + 'static,
{
    pub const fn new(kernel: &'static Kernel<P>, leds: &'static SharedLeds<B>, serial: S) -> Self {
        Self {
            kernel,
            leds,
            queue: Queue::new(),
            serial: sync::shared(Some(serial)),
        }
    }

    /// Register the ingress and consumer tasks.
    pub fn spawn(&'static self) -> Result<()> {
        let param = param_of(self);
        self.kernel.create_dynamic(
            TaskConfig {
                name: "serial-in",
                priority: PRIORITY,
            },
            ingress_task::<P, B, S>,
            param,
            STACK_WORDS,
        )?;
        self.kernel.create_dynamic(
            TaskConfig {
                name: "led-ctl",
                priority: PRIORITY,
            },
            consumer_task::<P, B, S>,
            param,
            STACK_WORDS,
        )?;
        Ok(())
    }

    pub fn queue(&self) -> &Queue<Command, COMMAND_QUEUE_CAPACITY> {
        &self.queue
    }

    /// Decode one received byte and queue it. Returns the command, or `None`
    /// if the byte was dropped.
    pub fn forward(&self, byte: u8) -> core::result::Result<Option<Command>, QueueError> {
        let Some(command) = Command::decode(byte) else {
            crate::log_debug!("ignored byte {}", byte);
            return Ok(None);
        };
        self.kernel.send(&self.queue, command, Timeout::Forever)?;
        Ok(Some(command))
    }

    /// Take the next queued command and drive its LED.
    pub fn apply_next(&self) -> core::result::Result<Command, QueueError> {
        let command = self.kernel.receive(&self.queue, Timeout::Forever)?;
        sync::with(self.leds, |l| command.apply(l));
        Ok(command)
    }

    fn ingress(&self) -> ! {
        let Some(mut serial) = sync::with(&self.serial, Option::take) else {
            crate::log_error!("serial port already taken");
            self.kernel.delete_self()
        };
        loop {
            let byte = self.kernel.read_byte(&mut serial);
            if let Err(e) = self.forward(byte) {
                crate::log_warn!("command dropped: {}", e);
            }
        }
    }

    fn consume(&self) -> ! {
        loop {
            if let Err(e) = self.apply_next() {
                crate::log_warn!("receive failed: {}", e);
                self.kernel.yield_now();
            }
        }
    }
}

extern "C" fn ingress_task<P, B, S>(param: usize) -> !
where
    P: Port + 'static,
    B: OutputBank + 'static,
    S: SerialPort + 'static,
{
    let app = unsafe { context::<SerialLeds<P, B, S>>(param) };
    app.ingress()
}

extern "C" fn consumer_task<P, B, S>(param: usize) -> !
where
    P: Port + 'static,
    B: OutputBank + 'static,
    S: SerialPort + 'static,
{
    let app = unsafe { context::<SerialLeds<P, B, S>>(param) };
    app.consume()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::TestPort;
    use crate::led::mock::MockBank;
    use crate::led::LedBank;
    use crate::stack::{Provisioning, StackRegion};
    use alloc::boxed::Box;

    struct Silent;

    impl SerialPort for Silent {
        fn poll_byte(&mut self) -> Option<u8> {
            None
        }
    }

    type App = SerialLeds<TestPort, MockBank, Silent>;

    fn app() -> &'static App {
        let kernel = Box::leak(Box::new(Kernel::new(TestPort::default())));
        let leds = Box::leak(Box::new(sync::shared(LedBank::new(MockBank::default()))));
        Box::leak(Box::new(SerialLeds::new(kernel, leds, Silent)))
    }

    fn started() -> &'static App {
        let app = app();
        app.spawn().unwrap();
        app.kernel
            .prepare_start(StackRegion::reserve_dynamic(64).unwrap())
            .unwrap();
        app
    }

    #[test]
    fn test_spawn_uses_dynamic_stacks() {
        let app = app();
        app.spawn().unwrap();
        app.kernel.with_scheduler(|s| {
            assert_eq!(s.task_count(), 2);
            assert!(s.tasks().all(|t| t.provisioning() == Provisioning::Dynamic));
            assert!(s.tasks().all(|t| t.stack_words() == STACK_WORDS));
        });
    }

    #[test]
    fn test_junk_never_reaches_queue() {
        let app = started();
        for byte in *b"xyz 09\r\n" {
            assert_eq!(app.forward(byte), Ok(None));
        }
        assert!(app.queue().is_empty());
    }

    #[test]
    fn test_commands_applied_in_order() {
        let app = started();
        for byte in *b"AB?a" {
            app.forward(byte).unwrap();
        }
        assert_eq!(app.queue().len(), 3);

        assert_eq!(app.apply_next(), Ok(Command::On(0)));
        assert_eq!(app.apply_next(), Ok(Command::On(1)));
        assert_eq!(sync::with(app.leds, |l| l.bank().levels), 0b11 << 8);
        assert_eq!(app.apply_next(), Ok(Command::Off(0)));
        assert_eq!(sync::with(app.leds, |l| l.bank().levels), 0b10 << 8);
        assert!(app.queue().is_empty());
    }

    #[test]
    fn test_serial_is_taken_once() {
        let app = app();
        assert!(sync::with(&app.serial, Option::take).is_some());
        assert!(sync::with(&app.serial, Option::take).is_none());
    }
}
