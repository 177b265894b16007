//! Microchip MCP23S17 16-bit I/O expander with SPI interface
//!
//! A frame is the opcode `0100 A2 A1 A0 R/W`, the register address and the data.
//! The chip does not drive SO while the opcode and address are clocked in, so
//! those two response bytes are ignored.

use byteorder::{BigEndian, ByteOrder};
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::{MODE_0, MODE_3},
};

use crate::{
    bus::{BitOrder, BusRequirements, Transport},
    fmt::bitflags,
    frame::{Echo, Frame, Header},
    registers::{Access, Register},
    transaction::transact,
    ConfigError, Error, FramingError,
};

pub const BUS: BusRequirements = BusRequirements {
    modes: &[MODE_0, MODE_3],
    speed_hz: 0..=10_000_000,
    bit_order: BitOrder::MsbFirst,
    bits_per_word: 8,
};

const OPCODE: u8 = 0b0100;
const OPCODE_OFFSET: u8 = 4;
const HARDWARE_ADDRESS_OFFSET: u8 = 1;
const READ_BIT: u8 = 1;
const MAX_HARDWARE_ADDRESS: u8 = 0b111;

/// Minimum RESET low time is 1 us
const RESET_PULSE_US: u32 = 1;

const MAX_RAW_LEN: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A = 0,
    B = 1,
}

/// Register address layout, selected by IOCON.BANK
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bank {
    /// BANK = 0, the A and B registers of a pair are adjacent (power-on default)
    Paired,
    /// BANK = 1, all port A registers first, port B registers from 0x10
    Separated,
}

/// Register kinds, each present once per port
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    Iodir = 0,
    Ipol,
    Gpinten,
    Defval,
    Intcon,
    Iocon,
    Gppu,
    Intf,
    Intcap,
    Gpio,
    Olat,
}

const NAMES: [[&str; 3]; 11] = [
    ["IODIR", "IODIRA", "IODIRB"],
    ["IPOL", "IPOLA", "IPOLB"],
    ["GPINTEN", "GPINTENA", "GPINTENB"],
    ["DEFVAL", "DEFVALA", "DEFVALB"],
    ["INTCON", "INTCONA", "INTCONB"],
    ["IOCON", "IOCON", "IOCON"],
    ["GPPU", "GPPUA", "GPPUB"],
    ["INTF", "INTFA", "INTFB"],
    ["INTCAP", "INTCAPA", "INTCAPB"],
    ["GPIO", "GPIOA", "GPIOB"],
    ["OLAT", "OLATA", "OLATB"],
];

impl Reg {
    pub const ALL: [Reg; 11] = [
        Reg::Iodir,
        Reg::Ipol,
        Reg::Gpinten,
        Reg::Defval,
        Reg::Intcon,
        Reg::Iocon,
        Reg::Gppu,
        Reg::Intf,
        Reg::Intcap,
        Reg::Gpio,
        Reg::Olat,
    ];

    pub const fn address(self, port: Port, bank: Bank) -> u8 {
        match bank {
            Bank::Paired => 2 * self as u8 + port as u8,
            Bank::Separated => self as u8 + 0x10 * port as u8,
        }
    }

    const fn access(self) -> Access {
        match self {
            Reg::Intf | Reg::Intcap => Access::Read,
            _ => Access::ReadWrite,
        }
    }

    /// The 8-bit register of one port
    pub const fn register(self, port: Port, bank: Bank) -> Register {
        let name = NAMES[self as usize][1 + port as usize];
        Register::new(self.address(port, bank), 8, name, self.access())
    }

    /// Both ports as one 16-bit register, port A first. Only valid with [`Bank::Paired`]
    /// and sequential addressing
    pub const fn pair(self) -> Register {
        let name = NAMES[self as usize][0];
        Register::new(self.address(Port::A, Bank::Paired), 16, name, self.access())
    }
}

bitflags! {
    /// Contents of the IOCON register
    pub struct IoCon: u8 {
        const BANK = 1 << 7;
        const MIRROR = 1 << 6;
        const SEQOP = 1 << 5;
        const DISSLW = 1 << 4;
        const HAEN = 1 << 3;
        const ODR = 1 << 2;
        const INTPOL = 1 << 1;
    }
}

/// Chip handle. The hardware address is only honoured by the chip once IOCON.HAEN is set
pub struct Mcp23s17<T, R, I, D> {
    transport: T,
    reset: R,
    int_a: I,
    int_b: I,
    delay: D,
    hardware_address: u8,
    iocon: IoCon,
}

impl<T, R, I, D> Mcp23s17<T, R, I, D>
where
    T: Transport,
    R: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    /// Creates the driver instance. The chip is assumed to be in its power-on state
    pub fn new(
        transport: T,
        reset: R,
        int_a: I,
        int_b: I,
        delay: D,
        hardware_address: u8,
    ) -> Result<Self, ConfigError> {
        BUS.validate(&transport.config())?;

        if hardware_address > MAX_HARDWARE_ADDRESS {
            return Err(ConfigError::InvalidAddress(hardware_address));
        }

        Ok(Self {
            transport,
            reset,
            int_a,
            int_b,
            delay,
            hardware_address,
            iocon: IoCon::empty(),
        })
    }

    pub fn release(self) -> (T, R, I, I, D) {
        (self.transport, self.reset, self.int_a, self.int_b, self.delay)
    }

    pub fn bank(&self) -> Bank {
        if self.iocon.contains(IoCon::BANK) {
            Bank::Separated
        } else {
            Bank::Paired
        }
    }

    fn header(&self, address: u8, read: bool) -> Header {
        let rw = if read { READ_BIT } else { 0 };
        let address_bits = self.hardware_address << HARDWARE_ADDRESS_OFFSET;
        let opcode = OPCODE << OPCODE_OFFSET | address_bits | rw;

        Header::addressed(opcode, address, Echo::Ignore)
    }

    pub fn read_frame(&self, register: Register) -> Frame {
        Frame::read(self.header(register.address, true), register)
    }

    pub fn write_frame(&self, register: Register, value: u64) -> Frame {
        Frame::write(self.header(register.address, false), register, value)
    }

    pub fn read(&mut self, reg: Reg, port: Port) -> Result<u8, Error<T::Error>> {
        let frame = self.read_frame(reg.register(port, self.bank()));
        let [value] = transact(&mut self.transport, &[frame])?;

        Ok(value as u8)
    }

    /// Writes one port register, returning the byte clocked out by the chip meanwhile
    pub fn write(&mut self, reg: Reg, port: Port, value: u8) -> Result<u8, Error<T::Error>> {
        let register = reg.register(port, self.bank());
        let frame = self.write_frame(register, value as u64);
        let [echo] = transact(&mut self.transport, &[frame])?;

        self.track_iocon(register.address, value);
        Ok(echo as u8)
    }

    /// Keeps the local IOCON copy in step with a byte written to `address`.
    /// Both IOCON addresses of the current bank map to the same register
    fn track_iocon(&mut self, address: u8, value: u8) {
        let bank = self.bank();
        let iocon_a = Reg::Iocon.address(Port::A, bank);
        let iocon_b = Reg::Iocon.address(Port::B, bank);

        if address == iocon_a || address == iocon_b {
            self.iocon = IoCon::from_bits_truncate(value);
            debug!("mcp23s17: iocon now 0x{:x}", value);
        }
    }

    pub fn write_iocon(&mut self, iocon: IoCon) -> Result<(), Error<T::Error>> {
        self.write(Reg::Iocon, Port::A, iocon.bits())?;
        Ok(())
    }

    /// Reads a register of both ports in a single transfer, port A in the high byte
    pub fn read_pair(&mut self, reg: Reg) -> Result<u16, Error<T::Error>> {
        if self.sequential_pairs() {
            let frame = self.read_frame(reg.pair());
            let [value] = transact(&mut self.transport, &[frame])?;
            return Ok(value as u16);
        }

        let [a, b] = self.read_many([(reg, Port::A), (reg, Port::B)])?;
        Ok(u16::from_be_bytes([a, b]))
    }

    /// Writes a register of both ports in a single transfer, port A from the high byte
    pub fn write_pair(&mut self, reg: Reg, value: u16) -> Result<(), Error<T::Error>> {
        let [a, b] = value.to_be_bytes();
        let bank = self.bank();
        let address_a = reg.address(Port::A, bank);
        let address_b = reg.address(Port::B, bank);

        if self.sequential_pairs() {
            let frame = self.write_frame(reg.pair(), value as u64);
            transact(&mut self.transport, &[frame])?;
        } else {
            let frames = [
                self.write_frame(reg.register(Port::A, bank), a as u64),
                self.write_frame(reg.register(Port::B, bank), b as u64),
            ];
            transact(&mut self.transport, &frames)?;
        }

        self.track_iocon(address_a, a);
        self.track_iocon(address_b, b);
        Ok(())
    }

    fn sequential_pairs(&self) -> bool {
        self.bank() == Bank::Paired && !self.iocon.contains(IoCon::SEQOP)
    }

    /// Reads any set of port registers in a single transfer
    pub fn read_many<const N: usize>(
        &mut self,
        regs: [(Reg, Port); N],
    ) -> Result<[u8; N], Error<T::Error>> {
        let bank = self.bank();
        let frames = regs.map(|(reg, port)| self.read_frame(reg.register(port, bank)));
        let values = transact(&mut self.transport, &frames)?;

        Ok(values.map(|v| v as u8))
    }

    /// Sequential read of up to 8 bytes starting at `address`
    pub fn read_raw(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Error<T::Error>> {
        let len = buf.len();
        let frame = self.read_frame(raw_register(address, len)?);
        let [value] = transact(&mut self.transport, &[frame])?;

        BigEndian::write_uint(buf, value, len);
        Ok(())
    }

    /// Sequential write of up to 8 bytes starting at `address`
    pub fn write_raw(&mut self, address: u8, data: &[u8]) -> Result<(), Error<T::Error>> {
        let register = raw_register(address, data.len())?;
        let frame = self.write_frame(register, BigEndian::read_uint(data, data.len()));
        transact(&mut self.transport, &[frame])?;

        // the address pointer only advances with SEQOP clear
        let sequential = !self.iocon.contains(IoCon::SEQOP);
        for (offset, byte) in data.iter().enumerate() {
            let at = if sequential {
                address.wrapping_add(offset as u8)
            } else {
                address
            };
            self.track_iocon(at, *byte);
        }

        Ok(())
    }

    /// Pulses the active-low RESET line. All registers return to their power-on values
    pub fn hardware_reset(&mut self) -> Result<(), Error<T::Error>> {
        info!("mcp23s17: hardware reset");

        self.reset.set_low().map_err(|_| Error::Gpio)?;
        self.delay.delay_us(RESET_PULSE_US);
        self.reset.set_high().map_err(|_| Error::Gpio)?;

        self.iocon = IoCon::empty();
        Ok(())
    }

    /// Samples INTA / INTB. The lines are active-low unless IOCON.INTPOL is set,
    /// open-drain outputs (IOCON.ODR) are always active-low
    pub fn interrupt_pending(&mut self, port: Port) -> Result<bool, Error<T::Error>> {
        let active_high = self.iocon.contains(IoCon::INTPOL) && !self.iocon.contains(IoCon::ODR);
        let pin = match port {
            Port::A => &mut self.int_a,
            Port::B => &mut self.int_b,
        };

        let high = pin.is_high().map_err(|_| Error::Gpio)?;
        Ok(high == active_high)
    }
}

fn raw_register(address: u8, len: usize) -> Result<Register, FramingError> {
    if len == 0 || len > MAX_RAW_LEN {
        return Err(FramingError::UnsupportedWidth((len * 8).min(u8::MAX as usize) as u8));
    }

    Ok(Register::new(address, (len * 8) as u8, "raw", Access::ReadWrite))
}
