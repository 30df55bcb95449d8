//! Logging abstraction
//!
//! Unified logging macros that work across targets:
//! - Firmware (`defmt` feature): forwards to `defmt`, transported by `defmt-rtt`
//! - Host tests: `println!` with a level prefix
//! - Anything else: no-op; the arguments are still type-checked and count as
//!   used
//!
//! The kernel logs lifecycle events only (task creation and deletion, stack
//! breaches, startup, faults). Nothing is logged from the tick or PendSV path.

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::error!($($arg)*);

        #[cfg(test)]
        println!("[ERROR] {}", format!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::warn!($($arg)*);

        #[cfg(test)]
        println!("[WARN] {}", format!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::info!($($arg)*);

        #[cfg(test)]
        println!("[INFO] {}", format!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(all(feature = "defmt", not(test)))]
        ::defmt::debug!($($arg)*);

        #[cfg(test)]
        println!("[DEBUG] {}", format!($($arg)*));

        #[cfg(not(any(feature = "defmt", test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}
