//! The bus side of the protocol: configuration checks and the transfer primitive

use core::ops::RangeInclusive;

use embedded_hal::spi::{Mode, Phase, Polarity, SpiDevice};
use heapless::Vec;

use crate::ConfigError;

/// Largest single transfer, in bytes. Fits a read of every register a driver
/// knows about, the INA229 map being the largest at 70 bytes
pub const MAX_TRANSFER_LEN: usize = 128;

/// Transmit / receive buffer of one transfer
pub type Buffer = Vec<u8, MAX_TRANSFER_LEN>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// How the bus was set up by the platform
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub mode: Mode,
    pub max_speed_hz: u32,
    pub bit_order: BitOrder,
    pub bits_per_word: u8,
    /// Platform specific flags, none of the drivers know about any of them
    pub extra_flags: u32,
}

impl BusConfig {
    /// MSB-first, 8-bit words, no extra flags
    pub const fn new(mode: Mode, max_speed_hz: u32) -> Self {
        Self {
            mode,
            max_speed_hz,
            bit_order: BitOrder::MsbFirst,
            bits_per_word: 8,
            extra_flags: 0,
        }
    }
}

/// Returns the conventional mode number, `CPOL << 1 | CPHA`
pub const fn mode_number(mode: Mode) -> u8 {
    let cpol = matches!(mode.polarity, Polarity::IdleHigh) as u8;
    let cpha = matches!(mode.phase, Phase::CaptureOnSecondTransition) as u8;

    cpol << 1 | cpha
}

/// What a chip accepts from the bus
pub struct BusRequirements {
    pub modes: &'static [Mode],
    pub speed_hz: RangeInclusive<u32>,
    pub bit_order: BitOrder,
    pub bits_per_word: u8,
}

impl BusRequirements {
    /// Checks the configuration, in the order mode, speed, bit order, word size
    pub fn validate(&self, config: &BusConfig) -> Result<(), ConfigError> {
        if !self.modes.contains(&config.mode) {
            return Err(ConfigError::UnsupportedMode(mode_number(config.mode)));
        }

        if !self.speed_hz.contains(&config.max_speed_hz) {
            return Err(ConfigError::UnsupportedSpeed(config.max_speed_hz));
        }

        if config.bit_order != self.bit_order {
            return Err(ConfigError::UnsupportedBitOrder);
        }

        if config.bits_per_word != self.bits_per_word {
            return Err(ConfigError::UnsupportedWordSize(config.bits_per_word));
        }

        if config.extra_flags != 0 {
            warn!("unknown spi extra flags 0x{:x}", config.extra_flags);
        }

        Ok(())
    }
}

/// Synchronous full-duplex byte transfer
pub trait Transport {
    type Error;

    /// The configuration the bus runs with
    fn config(&self) -> BusConfig;

    /// Clocks out `buf` and replaces it with the bytes clocked in at the same time.
    /// The length must not change; the caller treats a different length as a framing error.
    fn transfer(&mut self, buf: &mut Buffer) -> Result<(), Self::Error>;
}

/// [`Transport`] on top of an `embedded-hal` SPI device, which owns the chip select
pub struct SpiTransport<D> {
    device: D,
    config: BusConfig,
}

impl<D: SpiDevice> SpiTransport<D> {
    /// `config` has to describe how the platform actually configured `device`
    pub fn new(device: D, config: BusConfig) -> Self {
        Self { device, config }
    }

    pub fn release(self) -> D {
        self.device
    }
}

impl<D: SpiDevice> Transport for SpiTransport<D> {
    type Error = D::Error;

    fn config(&self) -> BusConfig {
        self.config
    }

    fn transfer(&mut self, buf: &mut Buffer) -> Result<(), Self::Error> {
        self.device.transfer_in_place(buf)
    }
}
