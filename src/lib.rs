//! # GuardOS
//!
//! A small fixed-priority preemptive RTOS kernel for ARM Cortex-M4
//! microcontrollers, built around stack-headroom supervision.
//!
//! ## Overview
//!
//! A fixed set of tasks runs on one core. Each task owns a stack region that
//! is either caller-provided static memory or taken from the heap. Tasks hand
//! values to each other through bounded queues and periodically measure how
//! much of their own stack has never been touched; a task whose headroom
//! drops below half its capacity raises a fault indicator and removes itself
//! before it can corrupt its neighbours.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │        Applications (apps/) · Firmware (src/bin/)       │
//! ├────────────────────────────────────────────────────────┤
//! │               Kernel context (kernel.rs)               │
//! │  create · delay · delete · headroom · send · receive   │
//! ├──────────────┬──────────────┬──────────────┬───────────┤
//! │  Scheduler   │ Handoff queue│  Monitor     │ Commands  │
//! │ scheduler.rs │ queue.rs     │  monitor.rs  │ command.rs│
//! ├──────────────┴──────────────┴──────────────┼───────────┤
//! │   Task model (task.rs) · Stack arena (stack.rs)        │
//! ├────────────────────────────────────────────┬───────────┤
//! │  Arch port (arch/): PendSV · SysTick       │ Board I/O │
//! │  first-task launch · idle                  │ led/serial│
//! ├────────────────────────────────────────────┴───────────┤
//! │             ARM Cortex-M4 hardware (Thumb-2)           │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **Fixed task table**: `[Option<TaskControlBlock>; MAX_TASKS]`, slots never reused
//! - **Static stacks**: `&'static mut [u32]` handed over by the application
//! - **Dynamic stacks**: `alloc` with fallible reservation, released on deletion
//! - **Critical sections**: every shared structure sits in a
//!   `critical_section::Mutex<RefCell<_>>`
//!
//! ## Host Testing
//!
//! Everything above the arch port is plain Rust and is tested on the host:
//! `cargo test` runs the unit tests and the `tests/` simulation suite. The
//! Cortex-M4 port and the board drivers are only compiled for bare-metal ARM.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod apps;
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod board;
pub mod command;
pub mod config;
pub mod error;
pub mod kernel;
pub mod led;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod scheduler;
pub mod serial;
pub mod stack;
pub mod sync;
pub mod task;

pub use error::{KernelError, QueueError, Result};
