//! # Stack Guard Firmware
//!
//! A static-stack task and a heap-stack task run a deepening recursive
//! workload and police their own stack headroom. Green LEDs blink while
//! healthy; a breach lights the orange (static) or blue (dynamic) pair and
//! the offending task deletes itself.

#![no_std]
#![no_main]

use core::mem::MaybeUninit;

use cortex_m::singleton;
use cortex_m_rt::entry;
use defmt_rtt as _;
use embedded_alloc::LlffHeap as Heap;
use panic_halt as _;
use static_cell::StaticCell;

use guardos::apps::stack_guard::{self, Guard, STATIC_STACK_WORDS};
use guardos::apps::{fatal, SharedLeds};
use guardos::arch::cortex_m4::CortexM4;
use guardos::board::stm32f3::GpioE;
use guardos::config::{HEAP_SIZE, IDLE_STACK_WORDS};
use guardos::kernel::Kernel;
use guardos::led::LedBank;
use guardos::stack::{Provisioning, StackRegion};
use guardos::sync;

#[global_allocator]
static HEAP: Heap = Heap::empty();

type Guarded = Guard<CortexM4, GpioE>;

static KERNEL: StaticCell<Kernel<CortexM4>> = StaticCell::new();
static LEDS: StaticCell<SharedLeds<GpioE>> = StaticCell::new();
static SCAN: StaticCell<Guarded> = StaticCell::new();
static MARK: StaticCell<Guarded> = StaticCell::new();

#[entry]
fn main() -> ! {
    {
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
    }

    guardos::log_info!("guardos stack guard");

    let leds: &'static SharedLeds<GpioE> =
        LEDS.init(sync::shared(LedBank::new(unsafe { GpioE::steal() })));

    let kernel: &'static Kernel<CortexM4> = KERNEL.init(Kernel::new(CortexM4::new()));
    let scan: &'static Guarded = SCAN.init(Guard::new(kernel, leds, Provisioning::Static));
    let mark: &'static Guarded = MARK.init(Guard::new(kernel, leds, Provisioning::Dynamic));

    let (Some(guard_stack), Some(idle_stack)) = (
        singleton!(: [u32; STATIC_STACK_WORDS] = [0; STATIC_STACK_WORDS]),
        singleton!(: [u32; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS]),
    ) else {
        fatal(kernel, leds)
    };

    if let Err(e) = stack_guard::spawn(kernel, scan, mark, guard_stack) {
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
