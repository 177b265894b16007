//! Texas Instruments INA229 85-V, 20-bit power/energy/charge monitor with SPI interface
//!
//! Every frame starts with a control byte `address << 2 | R/W` and the chip
//! answers with a zero byte under it. Several frames can share a transfer.

use embedded_hal::{
    delay::DelayNs,
    digital::InputPin,
    spi::{MODE_0, MODE_3},
};

use crate::{
    bus::{BitOrder, BusRequirements, Transport},
    fmt::bitflags,
    frame::{Echo, Frame, Header},
    registers::Register,
    transaction::transact,
    ConfigError, Error,
};

pub const BUS: BusRequirements = BusRequirements {
    modes: &[MODE_0, MODE_3],
    speed_hz: 0..=10_000_000,
    bit_order: BitOrder::MsbFirst,
    bits_per_word: 8,
};

const ADDRESS_OFFSET: u8 = 2;
const READ_BIT: u8 = 1;

const POLL_RETRIES: u32 = 10;
const POLL_PERIOD_US: u32 = 1_000;

/// The register map
pub mod registers {
    use crate::registers::Register;

    define_register!(CONFIG, 0x00, 16, ReadWrite, "Configuration");
    define_register!(ADC_CONFIG, 0x01, 16, ReadWrite, "ADC Configuration");
    define_register!(SHUNT_CAL, 0x02, 16, ReadWrite, "Shunt Calibration");
    define_register!(SHUNT_TEMPCO, 0x03, 16, ReadWrite, "Shunt Temperature Coefficient");
    define_register!(VSHUNT, 0x04, 24, Read, "Shunt Voltage Measurement");
    define_register!(VBUS, 0x05, 24, Read, "Bus Voltage Measurement");
    define_register!(DIETEMP, 0x06, 16, Read, "Temperature Measurement");
    define_register!(CURRENT, 0x07, 24, Read, "Current Result");
    define_register!(POWER, 0x08, 24, Read, "Power Result");
    define_register!(ENERGY, 0x09, 40, Read, "Energy Result");
    define_register!(CHARGE, 0x0A, 40, Read, "Charge Result");
    define_register!(DIAG_ALRT, 0x0B, 16, ReadWrite, "Diagnostic Flags and Alert");
    define_register!(SOVL, 0x0C, 16, ReadWrite, "Shunt Overvoltage Threshold");
    define_register!(SUVL, 0x0D, 16, ReadWrite, "Shunt Undervoltage Threshold");
    define_register!(BOVL, 0x0E, 16, ReadWrite, "Bus Overvoltage Threshold");
    define_register!(BUVL, 0x0F, 16, ReadWrite, "Bus Undervoltage Threshold");
    define_register!(TEMP_LIMIT, 0x10, 16, ReadWrite, "Temperature Over-Limit Threshold");
    define_register!(PWR_LIMIT, 0x11, 16, ReadWrite, "Power Over-Limit Threshold");
    define_register!(MANUFACTURER_ID, 0x3E, 16, Read, "Manufacturer ID");
    define_register!(DEVICE_ID, 0x3F, 16, Read, "Device ID");

    pub const ALL: [Register; 20] = [
        CONFIG,
        ADC_CONFIG,
        SHUNT_CAL,
        SHUNT_TEMPCO,
        VSHUNT,
        VBUS,
        DIETEMP,
        CURRENT,
        POWER,
        ENERGY,
        CHARGE,
        DIAG_ALRT,
        SOVL,
        SUVL,
        BOVL,
        BUVL,
        TEMP_LIMIT,
        PWR_LIMIT,
        MANUFACTURER_ID,
        DEVICE_ID,
    ];
}

use self::registers::*;

bitflags! {
    /// Single-bit fields of the CONFIG register. CONVDLY (bits 13..6) is not covered
    pub struct ConfigFlags: u16 {
        const RST = 1 << 15;
        const RSTACC = 1 << 14;
        const TEMPCOMP = 1 << 5;
        const ADCRANGE = 1 << 4;
    }
}

bitflags! {
    /// Contents of the DIAG_ALRT register
    pub struct DiagFlags: u16 {
        const ALATCH = 1 << 15;
        const CNVR = 1 << 14;
        const SLOWALERT = 1 << 13;
        const APOL = 1 << 12;
        const ENERGYOF = 1 << 11;
        const CHARGEOF = 1 << 10;
        const MATHOF = 1 << 9;
        const TMPOL = 1 << 7;
        const SHNTOL = 1 << 6;
        const SHNTUL = 1 << 5;
        const BUSOL = 1 << 4;
        const BUSUL = 1 << 3;
        const POL = 1 << 2;
        const CNVRF = 1 << 1;
        const MEMSTAT = 1 << 0;
    }
}

/// Shunt full-scale range selected by CONFIG.ADCRANGE
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcRange {
    /// ±163.84 mV
    Wide,
    /// ±40.96 mV
    Narrow,
}

const TI_MANUFACTURER_ID: u16 = 0x5449;
const INA229_DIE_ID: u16 = 0x229;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipType {
    Ina229 { revision: u8 },
    Unknown { manufacturer: u16, device: u16 },
}

impl ChipType {
    fn identify(manufacturer: u16, device: u16) -> Self {
        match (manufacturer, device >> 4) {
            (TI_MANUFACTURER_ID, INA229_DIE_ID) => Self::Ina229 {
                revision: (device & 0xf) as u8,
            },
            _ => Self::Unknown {
                manufacturer,
                device,
            },
        }
    }
}

fn header(register: &Register, read: bool) -> Header {
    let rw = if read { READ_BIT } else { 0 };
    Header::control(register.address << ADDRESS_OFFSET | rw, Echo::Zero)
}

pub fn read_frame(register: Register) -> Frame {
    Frame::read(header(&register, true), register)
}

pub fn write_frame(register: Register, value: u64) -> Frame {
    Frame::write(header(&register, false), register, value)
}

/// Chip handle
pub struct Ina229<T, A, D> {
    transport: T,
    alert: A,
    delay: D,
}

impl<T, A, D> Ina229<T, A, D>
where
    T: Transport,
    A: InputPin,
    D: DelayNs,
{
    /// Creates the driver instance, rejecting a bus the chip cannot talk on
    pub fn new(transport: T, alert: A, delay: D) -> Result<Self, ConfigError> {
        BUS.validate(&transport.config())?;

        Ok(Self {
            transport,
            alert,
            delay,
        })
    }

    pub fn release(self) -> (T, A, D) {
        (self.transport, self.alert, self.delay)
    }

    pub fn read(&mut self, register: Register) -> Result<u64, Error<T::Error>> {
        let [value] = transact(&mut self.transport, &[read_frame(register)])?;
        Ok(value)
    }

    /// Writes the register and returns what the chip clocked out meanwhile
    pub fn write(&mut self, register: Register, value: u64) -> Result<u64, Error<T::Error>> {
        let [echo] = transact(&mut self.transport, &[write_frame(register, value)])?;
        Ok(echo)
    }

    /// Reads all given registers in a single transfer
    pub fn read_many<const N: usize>(
        &mut self,
        registers: [Register; N],
    ) -> Result<[u64; N], Error<T::Error>> {
        transact(&mut self.transport, &registers.map(read_frame))
    }

    /// Resets all registers to their defaults
    pub fn reset(&mut self) -> Result<(), Error<T::Error>> {
        info!("ina229: reset");

        let config = self.read(CONFIG)?;
        self.write(CONFIG, config | ConfigFlags::RST.bits() as u64)?;

        Ok(())
    }

    pub fn config(&mut self) -> Result<ConfigFlags, Error<T::Error>> {
        let raw = self.read(CONFIG)?;
        Ok(ConfigFlags::from_bits_truncate(raw as u16))
    }

    pub fn adc_range(&mut self) -> Result<AdcRange, Error<T::Error>> {
        let range = if self.config()?.contains(ConfigFlags::ADCRANGE) {
            AdcRange::Narrow
        } else {
            AdcRange::Wide
        };

        Ok(range)
    }

    pub fn diagnostics(&mut self) -> Result<DiagFlags, Error<T::Error>> {
        let raw = self.read(DIAG_ALRT)?;
        Ok(DiagFlags::from_bits_truncate(raw as u16))
    }

    /// Polls the conversion-ready flag, returning the diagnostic flags it was seen with
    pub fn wait_conversion_ready(&mut self) -> Result<DiagFlags, Error<T::Error>> {
        for _ in 0..POLL_RETRIES {
            self.delay.delay_us(POLL_PERIOD_US);

            let flags = self.diagnostics()?;
            if flags.contains(DiagFlags::CNVRF) {
                return Ok(flags);
            }
        }

        warn!("ina229: conversion not ready after {} polls", POLL_RETRIES);
        Err(Error::PollTimeout)
    }

    /// Tries to communicate with the chip and reads its identification
    pub fn probe(&mut self) -> Result<ChipType, Error<T::Error>> {
        let [manufacturer, device] = self.read_many([MANUFACTURER_ID, DEVICE_ID])?;
        let chip = ChipType::identify(manufacturer as u16, device as u16);

        debug!("ina229: manufacturer 0x{:x}, device 0x{:x}", manufacturer, device);

        Ok(chip)
    }

    /// ALERT is an active-low open-drain output
    pub fn alert_active(&mut self) -> Result<bool, Error<T::Error>> {
        self.alert.is_low().map_err(|_| Error::Gpio)
    }
}
