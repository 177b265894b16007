//! One logical register read or write, as it travels on the wire

use byteorder::{BigEndian, ByteOrder};

use crate::{
    bus::Buffer, registers::Register, transaction::Operation, FramingError, ProtocolError,
};

/// Clocked out while the chip is sending data back
pub const FILLER: u8 = 0xff;

const MAX_HEADER_LEN: usize = 2;
const MAX_DATA_LEN: usize = 8;

/// What the chip sends back while the header is being clocked out
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Echo {
    /// Must read back as zero
    Zero,
    /// Don't care, the chip is not driving its output yet
    Ignore,
}

/// Control byte(s) preceding the data of a frame. The layout is chip specific
/// and built by the chip module.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    bytes: [u8; MAX_HEADER_LEN],
    len: u8,
    echo: Echo,
}

impl Header {
    /// A single control byte
    pub const fn control(control: u8, echo: Echo) -> Self {
        Self {
            bytes: [control, 0],
            len: 1,
            echo,
        }
    }

    /// A control (opcode) byte followed by a register address byte
    pub const fn addressed(control: u8, address: u8, echo: Echo) -> Self {
        Self {
            bytes: [control, address],
            len: 2,
            echo,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub const fn echo(&self) -> Echo {
        self.echo
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    Read,
    Write(u64),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub header: Header,
    pub register: Register,
    pub kind: Kind,
}

impl Frame {
    pub const fn read(header: Header, register: Register) -> Self {
        Self {
            header,
            register,
            kind: Kind::Read,
        }
    }

    pub const fn write(header: Header, register: Register, value: u64) -> Self {
        Self {
            header,
            register,
            kind: Kind::Write(value),
        }
    }

    pub fn control_byte(&self) -> u8 {
        self.header.bytes[0]
    }

    pub fn data_byte_count(&self) -> usize {
        self.register.byte_count()
    }

    fn header_len(&self) -> usize {
        self.header.len as usize
    }

    fn check(&self) -> Result<(), FramingError> {
        let width = self.register.width;
        if width == 0 || width % 8 != 0 || self.data_byte_count() > MAX_DATA_LEN {
            return Err(FramingError::UnsupportedWidth(width));
        }

        match self.kind {
            Kind::Read if !self.register.is_readable() => Err(FramingError::NotReadable),
            Kind::Write(_) if !self.register.is_writable() => Err(FramingError::NotWritable),
            Kind::Write(value) if width < 64 && value >> width != 0 => {
                Err(FramingError::ValueTooWide)
            }
            _ => Ok(()),
        }
    }

    /// Data region as clocked out: filler for reads, the big-endian value for writes
    pub fn data_bytes(&self) -> Result<heapless::Vec<u8, MAX_DATA_LEN>, FramingError> {
        self.check()?;

        let count = self.data_byte_count();
        let mut data = heapless::Vec::new();

        let filled = match self.kind {
            Kind::Read => data.resize(count, FILLER),
            Kind::Write(value) => {
                let mut raw = [0u8; MAX_DATA_LEN];
                BigEndian::write_uint(&mut raw, value, count);
                data.extend_from_slice(&raw[..count])
            }
        };
        filled.map_err(|_| FramingError::Overflow)?;

        Ok(data)
    }
}

impl Operation for Frame {
    type Output = u64;

    fn transmitted_byte_count(&self) -> usize {
        self.header_len() + self.data_byte_count()
    }

    fn encode(&self, tx: &mut Buffer) -> Result<(), ProtocolError> {
        let data = self.data_bytes()?;

        tx.extend_from_slice(self.header.as_bytes())
            .and_then(|_| tx.extend_from_slice(&data))
            .map_err(|_| FramingError::Overflow)?;

        Ok(())
    }

    fn parse(&self, rx: &[u8]) -> Result<u64, ProtocolError> {
        let expected = self.transmitted_byte_count();
        if rx.len() != expected {
            return Err(FramingError::SliceLength {
                expected,
                received: rx.len(),
            }
            .into());
        }

        self.check()?;

        let (echo, data) = rx.split_at(self.header_len());
        if self.header.echo == Echo::Zero {
            if let Some(&byte) = echo.iter().find(|&&b| b != 0) {
                return Err(FramingError::EchoNotZero(byte).into());
            }
        }

        Ok(BigEndian::read_uint(data, data.len()))
    }
}
