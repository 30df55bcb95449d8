//! # GuardOS Configuration
//!
//! Compile-time constants governing the kernel, the stack arena and the
//! LED/command layer. All limits are fixed at compile time.

/// Maximum number of tasks the kernel can manage, including the idle task.
/// This bounds the static TCB table.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. One tick is the unit of every delay and timeout.
pub const TICK_HZ: u32 = 1000;

/// Time slice in ticks shared by tasks of equal priority. When it expires
/// and another Ready task of the same priority exists, the running task is
/// rotated to the back.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// System clock frequency in Hz (STM32F303 on the 8 MHz HSI after reset).
pub const SYSTEM_CLOCK_HZ: u32 = 8_000_000;

/// Word written over every unused stack word before a task first runs.
/// Headroom measurement counts words that still hold this value.
pub const STACK_SENTINEL: u32 = 0xA5A5_A5A5;

/// Words occupied by the initial context frame: 8 software-saved registers
/// (R4–R11) plus the 8-word hardware exception frame.
pub const FRAME_WORDS: usize = 16;

/// Smallest stack region the arena hands out. Anything below this cannot hold
/// the initial frame plus a minimal call chain.
pub const MIN_STACK_WORDS: usize = FRAME_WORDS + 8;

/// Stack size of the idle task in words.
pub const IDLE_STACK_WORDS: usize = 64;

/// Priority of the idle task. Application tasks must use a higher value.
pub const IDLE_PRIORITY: u8 = 0;

/// Number of LEDs in the output bank.
pub const LED_COUNT: usize = 8;

/// Slots in the command handoff queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 8;

/// Size of the heap backing dynamically provisioned stacks, in bytes.
pub const HEAP_SIZE: usize = 4 * 1024;

/// Convert milliseconds to scheduler ticks, rounding down.
#[inline]
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64 * TICK_HZ as u64) / 1000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_ticks_at_1khz() {
        assert_eq!(ms_to_ticks(0), 0);
        assert_eq!(ms_to_ticks(200), 200);
        assert_eq!(ms_to_ticks(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_minimum_stack_holds_frame() {
        assert!(MIN_STACK_WORDS > FRAME_WORDS);
        assert!(IDLE_STACK_WORDS >= MIN_STACK_WORDS);
    }
}
