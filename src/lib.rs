#![cfg_attr(not(test), no_std)]

//! Platform-agnostic drivers for SPI chips that share one register protocol:
//! INA229 (power monitor), MCP23S17 (I/O expander) and LTC6810 (battery monitor).
//!
//! Every register access is a [`frame::Frame`] (or an LTC6810 command). Any number of
//! them can be packed into a single bus transfer with [`transaction::transact`], which
//! slices the response back into per-frame results. The LTC6810 additionally protects
//! commands and data with the 15-bit packet error code from [`pec`].

pub(crate) mod fmt;

#[macro_use]
pub mod registers;

pub mod bus;
pub mod frame;
pub mod pec;
pub mod transaction;

pub mod ina229;
pub mod ltc6810;
pub mod mcp23s17;

#[cfg(test)]
pub(crate) mod mock;

pub use bus::{BitOrder, Buffer, BusConfig, BusRequirements, SpiTransport, Transport};
pub use frame::{Echo, Frame, Header, Kind};
pub use registers::{Access, Register};
pub use transaction::{transact, Operation};

/// Bus configuration rejected while constructing a device handle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// SPI mode number (`CPOL << 1 | CPHA`) not supported by the chip
    UnsupportedMode(u8),
    /// Clock rate in Hz outside of the supported range
    UnsupportedSpeed(u32),
    UnsupportedBitOrder,
    UnsupportedWordSize(u8),
    /// Chip address does not fit the address field
    InvalidAddress(u8),
}

/// The response does not line up with what was transmitted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramingError {
    /// The batch does not fit into a single transfer buffer
    Overflow,
    /// The transport returned a different number of bytes than it was given
    LengthMismatch { sent: usize, received: usize },
    /// Operations encoded a different number of bytes than they declared
    EncodedLength { expected: usize, encoded: usize },
    /// A frame was handed a response slice of the wrong size
    SliceLength { expected: usize, received: usize },
    /// A byte clocked in under the control byte was expected to be zero
    EchoNotZero(u8),
    /// Register width (in bits) is not a whole number of bytes between 8 and 64
    UnsupportedWidth(u8),
    /// The value to write does not fit the register
    ValueTooWide,
    NotWritable,
    NotReadable,
}

/// Errors a single operation can detect in its slice of the response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    Framing(FramingError),
    Pec { computed: u16, received: u16 },
}

impl From<FramingError> for ProtocolError {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

/// Chip error type
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The underlying bus failed
    Transport(E),
    Framing(FramingError),
    /// Packet error code mismatch, the data was corrupted on the wire
    Pec { computed: u16, received: u16 },
    /// A reset, alert or interrupt line could not be driven or sampled
    Gpio,
    /// The chip did not report completion within the retry budget
    PollTimeout,
}

impl<E> From<FramingError> for Error<E> {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

impl<E> From<ProtocolError> for Error<E> {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Framing(e) => Self::Framing(e),
            ProtocolError::Pec { computed, received } => Self::Pec { computed, received },
        }
    }
}
