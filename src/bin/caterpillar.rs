//! # Caterpillar Firmware
//!
//! Two static-stack tasks sweep the LED ring, switching LEDs on every 250 ms
//! and off every 170 ms.

#![no_std]
#![no_main]

use core::mem::MaybeUninit;

use cortex_m::singleton;
use cortex_m_rt::entry;
use defmt_rtt as _;
use embedded_alloc::LlffHeap as Heap;
use panic_halt as _;
use static_cell::StaticCell;

use guardos::apps::caterpillar::{Caterpillar, STACK_WORDS};
use guardos::apps::{fatal, SharedLeds};
use guardos::arch::cortex_m4::CortexM4;
use guardos::board::stm32f3::GpioE;
use guardos::config::{HEAP_SIZE, IDLE_STACK_WORDS};
use guardos::kernel::Kernel;
use guardos::led::LedBank;
use guardos::stack::StackRegion;
use guardos::sync;

#[global_allocator]
static HEAP: Heap = Heap::empty();

static KERNEL: StaticCell<Kernel<CortexM4>> = StaticCell::new();
static LEDS: StaticCell<SharedLeds<GpioE>> = StaticCell::new();
static APP: StaticCell<Caterpillar<CortexM4, GpioE>> = StaticCell::new();

#[entry]
fn main() -> ! {
    {
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
    }

    guardos::log_info!("guardos caterpillar");

    let leds: &'static SharedLeds<GpioE> =
        LEDS.init(sync::shared(LedBank::new(unsafe { GpioE::steal() })));

    let kernel: &'static Kernel<CortexM4> = KERNEL.init(Kernel::new(CortexM4::new()));
    let app: &'static Caterpillar<CortexM4, GpioE> = APP.init(Caterpillar::new(kernel, leds));

    let (Some(on_stack), Some(off_stack), Some(idle_stack)) = (
        singleton!(: [u32; STACK_WORDS] = [0; STACK_WORDS]),
        singleton!(: [u32; STACK_WORDS] = [0; STACK_WORDS]),
        singleton!(: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS]),
    ) else {
        fatal(kernel, leds)
    };

    if let Err(e) = app.spawn(on_stack, off_stack) {
        guardos::log_error!("task creation failed: {}", e);
        fatal(kernel, leds);
    }

    match StackRegion::reserve_static(idle_stack) {
        Ok(idle) => kernel.start(idle),
        Err(e) => {
            guardos::log_error!("idle stack rejected: {}", e);
            fatal(kernel, leds)
        }
    }
}
