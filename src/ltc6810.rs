//! Analog Devices LTC6810 6-cell battery stack monitor
//!
//! Every command is two command bytes followed by their PEC. Commands that move
//! a register group carry six data bytes and a second PEC covering only the data.
//! The chip needs chip select to toggle between commands, so each one is its
//! own transfer.

use byteorder::{ByteOrder, LittleEndian};
use embedded_hal::{delay::DelayNs, spi::MODE_3};

use crate::{
    bus::{BitOrder, Buffer, BusRequirements, Transport},
    frame::FILLER,
    pec,
    transaction::{transact, Operation},
    ConfigError, Error, FramingError, ProtocolError,
};

pub const BUS: BusRequirements = BusRequirements {
    modes: &[MODE_3],
    speed_hz: 3_000_000..=3_500_000,
    bit_order: BitOrder::MsbFirst,
    bits_per_word: 8,
};

/// 11-bit command codes
pub mod commands {
    pub const WRCFG: u16 = 0x001;
    pub const RDCFG: u16 = 0x002;
    pub const RDCVA: u16 = 0x004;
    pub const RDCVB: u16 = 0x006;
    pub const CLRCELL: u16 = 0x711;
    pub const PLADC: u16 = 0x714;
    /// Base of ADCV, combined with MD, DCP and CH
    pub const ADCV: u16 = 0x260;
}

const ADDRESS_MODE: u8 = 1 << 7;
const ADDRESS_OFFSET: u8 = 3;
const MAX_ADDRESS: u8 = 0xf;

const COMMAND_LEN: usize = 2;
const PEC_LEN: usize = 2;
const GROUP_LEN: usize = 6;

const MD_OFFSET: u16 = 7;

/// PLADC keeps SDO low until the conversion is done
const POLL_RETRIES: u32 = 10;
const POLL_PERIOD_US: u32 = 100;

/// CFGR0 bit selecting the alternate set of ADC modes
const ADCOPT: u8 = 1 << 0;

/// A validated 4-bit chip address
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u8);

impl Address {
    pub fn new(address: u8) -> Result<Self, ConfigError> {
        if address > MAX_ADDRESS {
            return Err(ConfigError::InvalidAddress(address));
        }

        Ok(Self(address))
    }
}

/// Who a command is meant for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    Broadcast,
    Address(Address),
}

impl Target {
    /// CMD0 and CMD1 for a command code
    pub fn command_bytes(self, code: u16) -> [u8; COMMAND_LEN] {
        let [mut cmd0, cmd1] = code.to_be_bytes();

        if let Target::Address(Address(address)) = self {
            cmd0 |= ADDRESS_MODE | address << ADDRESS_OFFSET;
        }

        [cmd0, cmd1]
    }
}

/// Six bytes of a register group, as they appear on the wire
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterGroup(pub [u8; GROUP_LEN]);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    /// Command only, e.g. starting a conversion
    None,
    /// Clock in a register group and its PEC
    Read,
    Write(RegisterGroup),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    pub target: Target,
    pub code: u16,
    pub payload: Payload,
}

impl Command {
    pub const fn new(target: Target, code: u16, payload: Payload) -> Self {
        Self {
            target,
            code,
            payload,
        }
    }
}

fn encode_command(target: Target, code: u16, tx: &mut Buffer) -> Result<(), FramingError> {
    let command = target.command_bytes(code);

    tx.extend_from_slice(&command)
        .and_then(|_| tx.extend_from_slice(&pec::pec_bytes(&command)))
        .map_err(|_| FramingError::Overflow)
}

fn check_len(expected: usize, rx: &[u8]) -> Result<(), FramingError> {
    if rx.len() != expected {
        return Err(FramingError::SliceLength {
            expected,
            received: rx.len(),
        });
    }

    Ok(())
}

impl Operation for Command {
    type Output = RegisterGroup;

    fn transmitted_byte_count(&self) -> usize {
        match self.payload {
            Payload::None => COMMAND_LEN + PEC_LEN,
            Payload::Read | Payload::Write(_) => COMMAND_LEN + PEC_LEN + GROUP_LEN + PEC_LEN,
        }
    }

    fn encode(&self, tx: &mut Buffer) -> Result<(), ProtocolError> {
        encode_command(self.target, self.code, tx)?;

        let data = match self.payload {
            Payload::None => Ok(()),
            Payload::Read => tx.extend_from_slice(&[FILLER; GROUP_LEN + PEC_LEN]),
            Payload::Write(RegisterGroup(data)) => tx
                .extend_from_slice(&data)
                .and_then(|_| tx.extend_from_slice(&pec::pec_bytes(&data))),
        };

        data.map_err(|_| FramingError::Overflow)?;
        Ok(())
    }

    fn parse(&self, rx: &[u8]) -> Result<RegisterGroup, ProtocolError> {
        check_len(self.transmitted_byte_count(), rx)?;

        match self.payload {
            Payload::Read => {
                let (data, code) = rx[COMMAND_LEN + PEC_LEN..].split_at(GROUP_LEN);
                pec::verify(data, [code[0], code[1]])?;

                let mut group = RegisterGroup::default();
                group.0.copy_from_slice(data);
                Ok(group)
            }
            // SDO is not driven while the chip is listening
            Payload::None | Payload::Write(_) => Ok(RegisterGroup::default()),
        }
    }
}

/// One PLADC poll: the command, then a byte clocked while the chip reports its state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollAdc {
    pub target: Target,
}

impl Operation for PollAdc {
    /// Whether the conversion has finished
    type Output = bool;

    fn transmitted_byte_count(&self) -> usize {
        COMMAND_LEN + PEC_LEN + 1
    }

    fn encode(&self, tx: &mut Buffer) -> Result<(), ProtocolError> {
        encode_command(self.target, commands::PLADC, tx)?;
        tx.push(FILLER).map_err(|_| FramingError::Overflow)?;

        Ok(())
    }

    fn parse(&self, rx: &[u8]) -> Result<bool, ProtocolError> {
        check_len(self.transmitted_byte_count(), rx)?;

        // any high bit means SDO was released during the byte
        Ok(rx[COMMAND_LEN + PEC_LEN] != 0)
    }
}

/// ADC modes (MD bits together with CFGR0.ADCOPT)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcMode {
    /// 27 kHz, fast
    Khz27,
    Khz14,
    /// 7 kHz, normal
    Khz7,
    Khz3,
    Khz2,
    Khz1,
    Hz422,
    /// 26 Hz, filtered
    Hz26,
}

#[derive(Copy, Clone)]
struct AdcTiming {
    md: u8,
    adcopt: bool,
    /// Total conversion time of all cells
    all_cells_us: u32,
    /// Total conversion time of a single cell
    cell_us: u32,
}

/// In [`AdcMode`] order
#[rustfmt::skip]
const ADC_TIMINGS: [AdcTiming; 8] = [
    AdcTiming { md: 0b01, adcopt: false, all_cells_us: 524, cell_us: 200 },
    AdcTiming { md: 0b01, adcopt: true, all_cells_us: 699, cell_us: 229 },
    AdcTiming { md: 0b10, adcopt: false, all_cells_us: 1_200, cell_us: 404 },
    AdcTiming { md: 0b10, adcopt: true, all_cells_us: 1_900, cell_us: 520 },
    AdcTiming { md: 0b11, adcopt: true, all_cells_us: 3_300, cell_us: 753 },
    AdcTiming { md: 0b00, adcopt: true, all_cells_us: 6_100, cell_us: 1_200 },
    AdcTiming { md: 0b00, adcopt: false, all_cells_us: 12_000, cell_us: 2_100 },
    AdcTiming { md: 0b11, adcopt: false, all_cells_us: 201_000, cell_us: 34_000 },
];

impl AdcMode {
    const fn timing(self) -> AdcTiming {
        ADC_TIMINGS[self as usize]
    }

    pub const fn md(self) -> u8 {
        self.timing().md
    }

    /// The CFGR0.ADCOPT value this mode needs
    pub const fn adcopt(self) -> bool {
        self.timing().adcopt
    }

    /// Minimum time to wait after starting a conversion
    pub const fn conversion_time_us(self, cells: Cells) -> u32 {
        match cells {
            Cells::All => self.timing().all_cells_us,
            _ => self.timing().cell_us,
        }
    }
}

/// The CH field of ADCV
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cells {
    All = 0,
    Cell1 = 1,
    Cell2 = 2,
    Cell3 = 3,
    Cell4 = 4,
    Cell5 = 5,
    Cell6 = 6,
}

/// ADCV with discharge not permitted
pub const fn adcv(mode: AdcMode, cells: Cells) -> u16 {
    commands::ADCV | (mode.md() as u16) << MD_OFFSET | cells as u16
}

/// Cell voltage LSB
pub const MICROVOLTS_PER_LSB: u32 = 100;

pub const fn microvolts(code: u16) -> u32 {
    code as u32 * MICROVOLTS_PER_LSB
}

/// Raw codes of one cell voltage register group
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellVoltageGroup {
    pub first: u16,
    pub second: u16,
    pub third: u16,
}

impl From<RegisterGroup> for CellVoltageGroup {
    fn from(group: RegisterGroup) -> Self {
        let raw = &group.0;

        Self {
            first: LittleEndian::read_u16(&raw[0..2]),
            second: LittleEndian::read_u16(&raw[2..4]),
            third: LittleEndian::read_u16(&raw[4..6]),
        }
    }
}

/// Raw codes of all six cells
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellVoltages {
    pub c1: u16,
    pub c2: u16,
    pub c3: u16,
    pub c4: u16,
    pub c5: u16,
    pub c6: u16,
}

/// Chip handle
pub struct Ltc6810<T, D> {
    transport: T,
    delay: D,
}

impl<T, D> Ltc6810<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Creates the driver instance, rejecting a bus the chip cannot talk on
    pub fn new(transport: T, delay: D) -> Result<Self, ConfigError> {
        BUS.validate(&transport.config())?;

        Ok(Self { transport, delay })
    }

    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    fn command(&mut self, command: Command) -> Result<RegisterGroup, Error<T::Error>> {
        let [group] = transact(&mut self.transport, &[command])?;
        Ok(group)
    }

    pub fn read_config(&mut self, target: Target) -> Result<RegisterGroup, Error<T::Error>> {
        self.command(Command::new(target, commands::RDCFG, Payload::Read))
    }

    pub fn write_config(
        &mut self,
        target: Target,
        config: RegisterGroup,
    ) -> Result<(), Error<T::Error>> {
        self.command(Command::new(target, commands::WRCFG, Payload::Write(config)))?;
        Ok(())
    }

    /// Updates CFGR0.ADCOPT so that the MD bits select `mode`
    pub fn select_adc_mode(
        &mut self,
        target: Target,
        mode: AdcMode,
    ) -> Result<(), Error<T::Error>> {
        let mut config = self.read_config(target)?;

        if mode.adcopt() {
            config.0[0] |= ADCOPT;
        } else {
            config.0[0] &= !ADCOPT;
        }

        self.write_config(target, config)
    }

    /// Resets the cell voltage registers to 0xFF
    pub fn clear_cells(&mut self, target: Target) -> Result<(), Error<T::Error>> {
        self.command(Command::new(target, commands::CLRCELL, Payload::None))?;
        Ok(())
    }

    pub fn start_cell_conversion(
        &mut self,
        target: Target,
        mode: AdcMode,
        cells: Cells,
    ) -> Result<(), Error<T::Error>> {
        debug!("ltc6810: starting cell conversion, md {}", mode.md());

        self.command(Command::new(target, adcv(mode, cells), Payload::None))?;
        Ok(())
    }

    /// Single PLADC poll
    pub fn conversion_done(&mut self, target: Target) -> Result<bool, Error<T::Error>> {
        let [done] = transact(&mut self.transport, &[PollAdc { target }])?;
        Ok(done)
    }

    /// Sleeps for the conversion time of `mode`, then polls until the chip reports completion
    pub fn wait_conversion(
        &mut self,
        target: Target,
        mode: AdcMode,
        cells: Cells,
    ) -> Result<(), Error<T::Error>> {
        self.delay.delay_us(mode.conversion_time_us(cells));

        for _ in 0..POLL_RETRIES {
            if self.conversion_done(target)? {
                return Ok(());
            }

            self.delay.delay_us(POLL_PERIOD_US);
        }

        warn!("ltc6810: conversion still running after {} polls", POLL_RETRIES);
        Err(Error::PollTimeout)
    }

    pub fn convert_cell_voltages(
        &mut self,
        target: Target,
        mode: AdcMode,
        cells: Cells,
    ) -> Result<(), Error<T::Error>> {
        self.start_cell_conversion(target, mode, cells)?;
        self.wait_conversion(target, mode, cells)
    }

    /// Cells 1 to 3
    pub fn read_cell_voltages_a(
        &mut self,
        target: Target,
    ) -> Result<CellVoltageGroup, Error<T::Error>> {
        let group = self.command(Command::new(target, commands::RDCVA, Payload::Read))?;
        Ok(group.into())
    }

    /// Cells 4 to 6
    pub fn read_cell_voltages_b(
        &mut self,
        target: Target,
    ) -> Result<CellVoltageGroup, Error<T::Error>> {
        let group = self.command(Command::new(target, commands::RDCVB, Payload::Read))?;
        Ok(group.into())
    }

    /// Both cell voltage groups, one transfer each
    pub fn read_cell_voltages(&mut self, target: Target) -> Result<CellVoltages, Error<T::Error>> {
        let a = self.read_cell_voltages_a(target)?;
        let b = self.read_cell_voltages_b(target)?;

        Ok(CellVoltages {
            c1: a.first,
            c2: a.second,
            c3: a.third,
            c4: b.first,
            c5: b.second,
            c6: b.third,
        })
    }
}
