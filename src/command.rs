//! Single-byte LED commands
//!
//! `'A'..='H'` switch LED 0..7 on, `'a'..='h'` switch it off. Any other byte
//! is not a command and is dropped without error.

use crate::config::LED_COUNT;
use crate::led::{LedBank, Level, OutputBank};

const ON_BASE: u8 = b'A';
const OFF_BASE: u8 = b'a';

/// A decoded command. The payload is the LED offset, always `< LED_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    On(u8),
    Off(u8),
}

impl Command {
    /// Decode one input byte. `None` means the byte is ignored.
    pub fn decode(byte: u8) -> Option<Self> {
        let count = LED_COUNT as u8;
        match byte {
            b if (ON_BASE..ON_BASE + count).contains(&b) => Some(Command::On(b - ON_BASE)),
            b if (OFF_BASE..OFF_BASE + count).contains(&b) => Some(Command::Off(b - OFF_BASE)),
            _ => None,
        }
    }

    pub fn led(self) -> usize {
        match self {
            Command::On(led) | Command::Off(led) => led as usize,
        }
    }

    pub fn level(self) -> Level {
        match self {
            Command::On(_) => Level::High,
            Command::Off(_) => Level::Low,
        }
    }

    /// Drive the addressed LED. Applying the same command twice leaves the
    /// same state as applying it once.
    pub fn apply<B: OutputBank>(self, leds: &mut LedBank<B>) {
        leds.set(self.led(), self.level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::mock::MockBank;

    #[test]
    fn test_decode_on_range() {
        for (i, byte) in (b'A'..=b'H').enumerate() {
            assert_eq!(Command::decode(byte), Some(Command::On(i as u8)));
        }
    }

    #[test]
    fn test_decode_off_range() {
        for (i, byte) in (b'a'..=b'h').enumerate() {
            assert_eq!(Command::decode(byte), Some(Command::Off(i as u8)));
        }
    }

    #[test]
    fn test_decode_ignores_other_bytes() {
        for byte in [b'Z', b'0', b' ', b'I', b'i', b'@', b'`', 0x00, 0xFF] {
            assert_eq!(Command::decode(byte), None, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut leds = LedBank::new(MockBank::default());
        Command::On(3).apply(&mut leds);
        Command::On(3).apply(&mut leds);
        assert!(leds.bank().is_high(3));
        assert_eq!(leds.bank().levels.count_ones(), 1);
    }

    #[test]
    fn test_on_then_off_sequence() {
        let mut leds = LedBank::new(MockBank::default());
        for byte in *b"ABab" {
            Command::decode(byte).unwrap().apply(&mut leds);
        }
        assert_eq!(leds.bank().levels, 0);
    }
}
