//! This file ensures that defmt is optional, falling back to `log` or to stubs
//! if neither is available

#![macro_use]
#![allow(unused_macros)]

#[cfg(feature = "defmt")]
pub use defmt::bitflags;

#[cfg(not(feature = "defmt"))]
pub use bitflags::bitflags;

macro_rules! debug {
    ($($item:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($item)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::debug!($($item)*);
    }};
}

macro_rules! info {
    ($($item:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::info!($($item)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::info!($($item)*);
    }};
}

macro_rules! warn {
    ($($item:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::warn!($($item)*);
        #[cfg(all(feature = "log", not(feature = "defmt")))]
        log::warn!($($item)*);
    }};
}
