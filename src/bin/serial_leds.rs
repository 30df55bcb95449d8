//! # Serial LED Firmware
//!
//! Single-byte commands on USART1 (9600 8N1): `A`..`H` switch an LED on,
//! `a`..`h` switch it off. An ingress task hands decoded commands to the LED
//! task through a bounded queue.

#![no_std]
#![no_main]

use core::mem::MaybeUninit;

use cortex_m::singleton;
use cortex_m_rt::entry;
use defmt_rtt as _;
use embedded_alloc::LlffHeap as Heap;
use panic_halt as _;
use static_cell::StaticCell;

use guardos::apps::serial_leds::SerialLeds;
use guardos::apps::{fatal, SharedLeds};
use guardos::arch::cortex_m4::CortexM4;
use guardos::board::stm32f3::{GpioE, Usart1};
use guardos::config::{HEAP_SIZE, IDLE_STACK_WORDS};
use guardos::kernel::Kernel;
use guardos::led::LedBank;
use guardos::stack::StackRegion;
use guardos::sync;

#[global_allocator]
static HEAP: Heap = Heap::empty();

static KERNEL: StaticCell<Kernel<CortexM4>> = StaticCell::new();
static LEDS: StaticCell<SharedLeds<GpioE>> = StaticCell::new();
static APP: StaticCell<SerialLeds<CortexM4, GpioE, Usart1>> = StaticCell::new();

#[entry]
fn main() -> ! {
    {
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
    }

    guardos::log_info!("guardos serial leds");

    let leds: &'static SharedLeds<GpioE> =
        LEDS.init(sync::shared(LedBank::new(unsafe { GpioE::steal() })));

    let kernel: &'static Kernel<CortexM4> = KERNEL.init(Kernel::new(CortexM4::new()));
    let serial = unsafe { Usart1::init() };
    let app: &'static SerialLeds<CortexM4, GpioE, Usart1> =
        APP.init(SerialLeds::new(kernel, leds, serial));

    if let Err(e) = app.spawn() {
        guardos::log_error!("task creation failed: {}", e);
        fatal(kernel, leds);
    }

    let Some(idle_stack) = singleton!(: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS]) else {
        fatal(kernel, leds)
    };
    match StackRegion::reserve_static(idle_stack) {
        Ok(idle) => kernel.start(idle),
        Err(e) => {
            guardos::log_error!("idle stack rejected: {}", e);
            fatal(kernel, leds)
        }
    }
}
