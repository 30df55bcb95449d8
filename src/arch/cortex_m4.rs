//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements [`Port`] with context switching via PendSV, the SysTick
//! scheduler tick, and first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `main` and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV saves and restores R4–R11, which completes the
//! context. The saved PSP is also where the scheduler advances each task's
//! stack low-water mark.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority, so a context switch
//! never preempts an application interrupt handler.
//!
//! The image targets `thumbv7em-none-eabi` (soft-float): there is no FPU
//! context to save.

use core::arch::{asm, global_asm};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::psp;

use super::Port;
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::SchedulerCell;
use crate::sync;
use crate::task::TaskEntry;

/// The scheduler the exception handlers drive. Set once by `launch`.
static SCHEDULER: AtomicPtr<SchedulerCell> = AtomicPtr::new(ptr::null_mut());

/// SYST_CSR.ENABLE
const SYST_CSR_ENABLE: u32 = 1 << 0;
/// SYST_CSR.TICKINT
const SYST_CSR_TICKINT: u32 = 1 << 1;
/// SYST_CSR.CLKSOURCE: core clock
const SYST_CSR_CLKSOURCE: u32 = 1 << 2;

fn scheduler() -> Option<&'static SchedulerCell> {
    // Safety: only ever set from a `&'static SchedulerCell`.
    unsafe { SCHEDULER.load(Ordering::Acquire).as_ref() }
}

/// Cortex-M4 implementation of [`Port`].
///
/// The port is the only user of SysTick, PendSV and the PSP. Building one
/// touches no hardware; SysTick is programmed by [`Port::launch`].
pub struct CortexM4 {
    _private: (),
}

impl CortexM4 {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for CortexM4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for CortexM4 {
    #[inline]
    fn pend_switch(&self) {
        SCB::set_pendsv();
        // PendSV is taken before the caller's next instruction
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    #[inline]
    fn wait_for_interrupt(&self) {
        cortex_m::asm::wfi();
    }

    fn current_stack_pointer(&self) -> Option<*const u32> {
        Some(psp::read() as *const u32)
    }

    fn idle_entry(&self) -> TaskEntry {
        idle_task
    }

    fn launch(&self, scheduler: &'static SchedulerCell, first_sp: *mut u32) -> ! {
        cortex_m::interrupt::disable();
        SCHEDULER.store(scheduler as *const _ as *mut _, Ordering::Release);
        set_interrupt_priorities();
        configure_systick();
        unsafe { start_first_task(first_sp) }
    }
}

/// Runs whenever nothing else is Ready.
extern "C" fn idle_task(_: usize) -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Program SysTick for `TICK_HZ` from the core clock, interrupt enabled.
fn configure_systick() {
    // Safety: SysTick belongs to the port, and interrupts are still disabled.
    unsafe {
        let syst = &*SYST::PTR;
        syst.csr.write(0);
        syst.rvr.write(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
        syst.cvr.write(0);
        syst.csr
            .write(SYST_CSR_CLKSOURCE | SYST_CSR_TICKINT | SYST_CSR_ENABLE);
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
fn set_interrupt_priorities() {
    // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
    // Bits [23:16] = PendSV priority
    // Bits [31:24] = SysTick priority
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = ptr::read_volatile(SHPR3);
        ptr::write_volatile(SHPR3, val | (0xFF << 16) | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to PSP and branch into the first task as if its initial
/// frame had been popped by an exception return.
///
/// # Safety
/// Called once, with interrupts disabled, with a stack pointer produced by
/// `StackRegion::init_frame`.
unsafe fn start_first_task(sp: *mut u32) -> ! {
    asm!(
        "ldr r1, [r0, #32]",   // R0 slot: task parameter
        "ldr r2, [r0, #56]",   // PC slot: entry point
        "ldr lr, [r0, #52]",   // LR slot: exit trap
        "adds r0, #64",        // Discard the whole 16-word frame
        "msr psp, r0",
        "movs r3, #2",         // CONTROL.SPSEL = 1
        "msr control, r3",
        "isb",
        "mov r0, r1",
        "orr r2, r2, #1",      // Thumb state for bx
        "cpsie i",
        "bx r2",
        in("r0") sp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

// 1. Save R4–R11 onto the outgoing task's stack (PSP)
// 2. Hand the resulting PSP to the scheduler and get the incoming task's PSP
// 3. Restore R4–R11 from the incoming task's stack
// 4. Exception return; the hardware pops the rest of the frame
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    cpsid i",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    push {{r3, lr}}",
    "    bl guardos_switch_context",
    "    pop {{r3, lr}}",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    cpsie i",
    "    bx lr",
    ".size PendSV, . - PendSV",
);

/// Record the outgoing stack pointer, pick the next task and return its stack
/// pointer. If nothing else can run the outgoing task resumes.
#[no_mangle]
extern "C" fn guardos_switch_context(psp: *mut u32) -> *mut u32 {
    let Some(cell) = scheduler() else {
        return psp;
    };
    sync::with(cell, |s| {
        s.save_context(psp);
        s.schedule()
            .and_then(|next| s.task(next).ok())
            .map_or(psp, |tcb| tcb.stack_pointer)
    })
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Scheduler tick, at `TICK_HZ`. Pends PendSV when a switch is due.
#[no_mangle]
extern "C" fn SysTick() {
    if let Some(cell) = scheduler() {
        if sync::with(cell, |s| s.tick()) {
            SCB::set_pendsv();
        }
    }
}
