//! # STM32F3 Discovery
//!
//! ```text
//! PE8 ..PE15  LEDs (compass ring), push-pull outputs
//! PC4 / PC5   USART1 TX / RX, AF7, 9600 8N1 from the 8 MHz HSI
//! ```
//!
//! Only the registers the demos touch are modelled. Every access is a
//! volatile read or write of a memory-mapped register.

use core::ptr;

use crate::config::SYSTEM_CLOCK_HZ;
use crate::led::{Level, OutputBank, PinId, PinMask};
use crate::serial::SerialPort;

// ---------------------------------------------------------------------------
// Register map
// ---------------------------------------------------------------------------

const RCC_BASE: usize = 0x4002_1000;
const RCC_AHBENR: usize = RCC_BASE + 0x14;
const RCC_APB2ENR: usize = RCC_BASE + 0x18;
const RCC_AHBENR_IOPCEN: u32 = 1 << 19;
const RCC_AHBENR_IOPEEN: u32 = 1 << 21;
const RCC_APB2ENR_USART1EN: u32 = 1 << 14;

const GPIOC_BASE: usize = 0x4800_0800;
const GPIOE_BASE: usize = 0x4800_1000;
const GPIO_MODER: usize = 0x00;
const GPIO_OTYPER: usize = 0x04;
const GPIO_OSPEEDR: usize = 0x08;
const GPIO_PUPDR: usize = 0x0C;
const GPIO_ODR: usize = 0x14;
const GPIO_BSRR: usize = 0x18;
const GPIO_AFRL: usize = 0x20;

const USART1_BASE: usize = 0x4001_3800;
const USART_CR1: usize = USART1_BASE;
const USART_BRR: usize = USART1_BASE + 0x0C;
const USART_ISR: usize = USART1_BASE + 0x1C;
const USART_ICR: usize = USART1_BASE + 0x20;
const USART_RDR: usize = USART1_BASE + 0x24;
const USART_CR1_UE: u32 = 1 << 0;
const USART_CR1_RE: u32 = 1 << 2;
const USART_CR1_TE: u32 = 1 << 3;
const USART_ISR_ORE: u32 = 1 << 3;
const USART_ISR_RXNE: u32 = 1 << 5;
const USART_ICR_ORECF: u32 = 1 << 3;

const CONSOLE_BAUD: u32 = 9600;
const AF7_USART: u32 = 7;

#[inline]
fn read(addr: usize) -> u32 {
    unsafe { ptr::read_volatile(addr as *const u32) }
}

#[inline]
fn write(addr: usize, value: u32) {
    unsafe { ptr::write_volatile(addr as *mut u32, value) }
}

#[inline]
fn modify(addr: usize, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

/// Two bits per pin (MODER, OSPEEDR, PUPDR).
fn two_bit_field(pins: PinMask, value: u32) -> (u32, u32) {
    pins.pins().fold((0, 0), |(clear, set), pin| {
        let shift = 2 * pin.0 as u32;
        (clear | (0b11 << shift), set | (value << shift))
    })
}

// ---------------------------------------------------------------------------
// GPIOE: LED port
// ---------------------------------------------------------------------------

/// GPIO port E. Exactly one instance may exist.
pub struct GpioE {
    _private: (),
}

impl GpioE {
    /// # Safety
    /// The caller guarantees no other `GpioE` exists.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl OutputBank for GpioE {
    fn configure_output_bank(&mut self, pins: PinMask) {
        modify(RCC_AHBENR, |v| v | RCC_AHBENR_IOPEEN);

        write(GPIOE_BASE + GPIO_BSRR, (pins.0 as u32) << 16);
        let (clear, output) = two_bit_field(pins, 0b01);
        modify(GPIOE_BASE + GPIO_MODER, |v| (v & !clear) | output);
        modify(GPIOE_BASE + GPIO_OTYPER, |v| v & !(pins.0 as u32));
        modify(GPIOE_BASE + GPIO_OSPEEDR, |v| v & !clear);
        modify(GPIOE_BASE + GPIO_PUPDR, |v| v & !clear);
    }

    fn set_pin(&mut self, pin: PinId, level: Level) {
        let bit = 1u32 << pin.0;
        let bsrr = match level {
            Level::High => bit,
            Level::Low => bit << 16,
        };
        write(GPIOE_BASE + GPIO_BSRR, bsrr);
    }

    fn toggle_pin(&mut self, pin: PinId) {
        let level = if read(GPIOE_BASE + GPIO_ODR) & (1 << pin.0) != 0 {
            Level::Low
        } else {
            Level::High
        };
        self.set_pin(pin, level);
    }
}

// ---------------------------------------------------------------------------
// USART1: console
// ---------------------------------------------------------------------------

/// USART1 on PC4 (TX) / PC5 (RX), receive side only.
pub struct Usart1 {
    _private: (),
}

impl Usart1 {
    /// Route PC4/PC5 to USART1 and enable it at 9600 baud.
    ///
    /// # Safety
    /// The caller guarantees no other `Usart1` exists and nothing else drives
    /// PC4/PC5.
    pub unsafe fn init() -> Self {
        modify(RCC_AHBENR, |v| v | RCC_AHBENR_IOPCEN);
        modify(RCC_APB2ENR, |v| v | RCC_APB2ENR_USART1EN);

        let pins = PinMask::of(&[PinId(4), PinId(5)]);
        let (clear, alternate) = two_bit_field(pins, 0b10);
        modify(GPIOC_BASE + GPIO_MODER, |v| (v & !clear) | alternate);
        modify(GPIOC_BASE + GPIO_AFRL, |v| {
            (v & !(0xFF << 16)) | (AF7_USART << 16) | (AF7_USART << 20)
        });

        write(USART_CR1, 0);
        write(USART_BRR, SYSTEM_CLOCK_HZ / CONSOLE_BAUD);
        write(USART_CR1, USART_CR1_UE | USART_CR1_RE | USART_CR1_TE);
        Self { _private: () }
    }
}

impl SerialPort for Usart1 {
    fn poll_byte(&mut self) -> Option<u8> {
        let isr = read(USART_ISR);
        if isr & USART_ISR_ORE != 0 {
            // A byte was lost; clearing the flag lets reception continue.
            write(USART_ICR, USART_ICR_ORECF);
        }
        (isr & USART_ISR_RXNE != 0).then(|| read(USART_RDR) as u8)
    }
}
