//! Board support
//!
//! Register-level drivers for the boards the demo applications run on. Each
//! board implements [`OutputBank`](crate::led::OutputBank) for its LED port
//! and [`SerialPort`](crate::serial::SerialPort) for its console UART.

pub mod stm32f3;
