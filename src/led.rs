//! LED bank and the GPIO output boundary
//!
//! The kernel never touches pin registers itself. Boards implement
//! [`OutputBank`]; [`LedBank`] maps the eight logical LEDs onto pins and knows
//! which pairs serve as fault indicators.

use crate::config::LED_COUNT;

/// Output level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

/// Pin number within the output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(pub u8);

/// Set of pins within one 16-pin port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinMask(pub u16);

impl PinMask {
    pub const fn of(pins: &[PinId]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < pins.len() {
            mask |= 1 << pins[i].0;
            i += 1;
        }
        Self(mask)
    }

    pub const fn contains(self, pin: PinId) -> bool {
        self.0 & (1 << pin.0) != 0
    }

    pub fn pins(self) -> impl Iterator<Item = PinId> {
        (0..16u8).map(PinId).filter(move |&p| self.contains(p))
    }
}

/// GPIO output boundary.
///
/// Implementations drive real pins and are assumed never to fail.
///
/// # Safety Invariants
///
/// - `configure_output_bank` is called once, before any other method
/// - Only one `OutputBank` instance exists per port
pub trait OutputBank {
    /// Configure `pins` as push-pull outputs, driven low.
    fn configure_output_bank(&mut self, pins: PinMask);

    fn set_pin(&mut self, pin: PinId, level: Level);

    fn toggle_pin(&mut self, pin: PinId);
}

/// Board order of the LEDs (STM32F3 Discovery compass ring, PE8..PE15).
pub mod leds {
    pub const BLUE_1: usize = 0;
    pub const RED_1: usize = 1;
    pub const ORANGE_1: usize = 2;
    pub const GREEN_1: usize = 3;
    pub const BLUE_2: usize = 4;
    pub const RED_2: usize = 5;
    pub const ORANGE_2: usize = 6;
    pub const GREEN_2: usize = 7;
}

/// Pins the LEDs are wired to, indexed by LED offset.
pub const LED_PINS: [PinId; LED_COUNT] = [
    PinId(8),
    PinId(9),
    PinId(10),
    PinId(11),
    PinId(12),
    PinId(13),
    PinId(14),
    PinId(15),
];

/// Which fault an indicator pair reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Task or scheduler setup failed; the system halts.
    Setup,
    /// Stack breach in the statically provisioned task.
    StaticStack,
    /// Stack breach in the dynamically provisioned task.
    DynamicStack,
}

impl Fault {
    /// The two LEDs switched on to report this fault.
    pub const fn indicator_pair(self) -> [usize; 2] {
        match self {
            Fault::Setup => [leds::RED_1, leds::RED_2],
            Fault::StaticStack => [leds::ORANGE_1, leds::ORANGE_2],
            Fault::DynamicStack => [leds::BLUE_1, leds::BLUE_2],
        }
    }
}

/// The eight LEDs, addressed by offset `0..LED_COUNT`.
pub struct LedBank<B: OutputBank> {
    bank: B,
}

impl<B: OutputBank> LedBank<B> {
    /// Configure every LED pin as an output. All LEDs start off.
    pub fn new(mut bank: B) -> Self {
        bank.configure_output_bank(PinMask::of(&LED_PINS));
        for pin in LED_PINS {
            bank.set_pin(pin, Level::Low);
        }
        Self { bank }
    }

    /// Drive LED `led`. Offsets outside the bank are ignored.
    pub fn set(&mut self, led: usize, level: Level) {
        if let Some(&pin) = LED_PINS.get(led) {
            self.bank.set_pin(pin, level);
        }
    }

    pub fn toggle(&mut self, led: usize) {
        if let Some(&pin) = LED_PINS.get(led) {
            self.bank.toggle_pin(pin);
        }
    }

    /// Switch on the indicator pair for `fault`.
    pub fn indicate(&mut self, fault: Fault) {
        for led in fault.indicator_pair() {
            self.set(led, Level::High);
        }
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }
}

/// In-memory output bank for host tests.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockBank {
        pub configured: PinMask,
        pub levels: u16,
        pub writes: usize,
    }

    impl MockBank {
        pub fn is_high(&self, led: usize) -> bool {
            self.levels & (1 << LED_PINS[led].0) != 0
        }
    }

    impl OutputBank for MockBank {
        fn configure_output_bank(&mut self, pins: PinMask) {
            self.configured = pins;
        }

        fn set_pin(&mut self, pin: PinId, level: Level) {
            self.writes += 1;
            match level {
                Level::High => self.levels |= 1 << pin.0,
                Level::Low => self.levels &= !(1 << pin.0),
            }
        }

        fn toggle_pin(&mut self, pin: PinId) {
            self.writes += 1;
            self.levels ^= 1 << pin.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBank;
    use super::*;

    #[test]
    fn test_bank_configured_all_off() {
        let ring = LedBank::new(MockBank::default());
        assert_eq!(ring.bank().configured, PinMask(0xFF00));
        assert_eq!(ring.bank().levels, 0);
        assert_eq!(ring.bank().writes, LED_COUNT);
    }

    #[test]
    fn test_set_and_toggle() {
        let mut ring = LedBank::new(MockBank::default());
        ring.set(leds::GREEN_1, Level::High);
        assert!(ring.bank().is_high(leds::GREEN_1));
        ring.toggle(leds::GREEN_1);
        assert!(!ring.bank().is_high(leds::GREEN_1));
        ring.set(LED_COUNT, Level::High);
        assert_eq!(ring.bank().levels, 0);
    }

    #[test]
    fn test_fault_indicator_pairs() {
        let mut ring = LedBank::new(MockBank::default());
        ring.indicate(Fault::DynamicStack);
        assert!(ring.bank().is_high(leds::BLUE_1));
        assert!(ring.bank().is_high(leds::BLUE_2));
        assert!(!ring.bank().is_high(leds::RED_1));
    }

    #[test]
    fn test_mask_pins() {
        let mask = PinMask::of(&[PinId(1), PinId(15)]);
        assert_eq!(mask, PinMask(0x8002));
        let pins: alloc::vec::Vec<PinId> = mask.pins().collect();
        assert_eq!(pins, alloc::vec![PinId(1), PinId(15)]);
    }
}
