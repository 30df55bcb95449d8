//! Serial input boundary
//!
//! One byte is one command; there is no framing. Boards only implement a
//! non-blocking poll. Tasks get a blocking read through
//! [`Kernel::read_byte`](crate::kernel::Kernel::read_byte), which suspends
//! for a tick between polls instead of spinning.

/// Byte source implemented by the board's UART driver.
pub trait SerialPort {
    /// Return the next received byte, or `None` if nothing is pending.
    fn poll_byte(&mut self) -> Option<u8>;
}

impl<S: SerialPort + ?Sized> SerialPort for &mut S {
    fn poll_byte(&mut self) -> Option<u8> {
        (**self).poll_byte()
    }
}
