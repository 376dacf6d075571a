//! Internal logging macros.
//!
//! The engine logs through `log` on hosted targets or `defmt` on embedded
//! ones, selected by the crate features of the same names. With neither
//! feature enabled the macros compile to nothing.

#![allow(unused_macros)]

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! mq_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(feature = "defmt")]
macro_rules! mq_debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! mq_debug {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! mq_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(feature = "defmt")]
macro_rules! mq_warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! mq_warn {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}
