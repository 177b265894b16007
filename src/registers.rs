//! Register descriptors shared by all chips

/// Which directions a register supports
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

/// An immutable description of one chip register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register {
    pub address: u8,
    /// Width in bits
    pub width: u8,
    pub name: &'static str,
    pub access: Access,
}

impl Register {
    pub const fn new(address: u8, width: u8, name: &'static str, access: Access) -> Self {
        Self {
            address,
            width,
            name,
            access,
        }
    }

    /// Number of data bytes the register occupies on the wire
    pub const fn byte_count(&self) -> usize {
        self.width as usize / 8
    }

    pub const fn is_readable(&self) -> bool {
        !matches!(self.access, Access::Write)
    }

    pub const fn is_writable(&self) -> bool {
        !matches!(self.access, Access::Read)
    }
}

/// Declares a register constant in a chip's register table
macro_rules! define_register {
    ($name:ident, $address:expr, $width:expr, $access:ident, $desc:expr) => {
        #[doc = $desc]
        pub const $name: $crate::registers::Register = $crate::registers::Register::new(
            $address,
            $width,
            $desc,
            $crate::registers::Access::$access,
        );
    };
}
