//! Packet error code used by the LTC681x family to protect commands and data.
//!
//! This is a 15-bit CRC computed bit by bit, MSB first, through a shift register
//! seeded with `0b000_0000_0001_0000`. The chip appends the result shifted left by
//! one (the LSB of the transmitted code is always zero).

use crate::ProtocolError;

const WIDTH: u32 = 15;
const MASK: u16 = (1 << WIDTH) - 1;
const SEED: u16 = 1 << 4;

/// Shift register stages that take the feedback bit (datasheet, "PEC calculation")
const TAPS: [u32; 7] = [0, 3, 4, 7, 8, 10, 14];

const fn polynomial() -> u16 {
    let mut poly = 0;
    let mut i = 0;

    while i < TAPS.len() {
        poly |= 1 << TAPS[i];
        i += 1;
    }

    poly
}

const POLYNOMIAL: u16 = polynomial();

/// Computes the 16-bit code as transmitted on the wire
pub fn pec15(data: &[u8]) -> u16 {
    let mut pec = SEED;

    for byte in data {
        for bit in (0..8).rev() {
            let din = (*byte as u16 >> bit) & 1;
            let feedback = din ^ (pec >> (WIDTH - 1)) & 1;

            pec = (pec << 1) & MASK;
            if feedback != 0 {
                pec ^= POLYNOMIAL;
            }
        }
    }

    pec << 1
}

/// The code split into its two wire bytes, PEC0 first
pub fn pec_bytes(data: &[u8]) -> [u8; 2] {
    pec15(data).to_be_bytes()
}

/// Checks a received code against the data it covers
pub fn verify(data: &[u8], received: [u8; 2]) -> Result<(), ProtocolError> {
    let computed = pec15(data);
    let received = u16::from_be_bytes(received);

    if computed != received {
        warn!("pec mismatch: computed 0x{:x}, received 0x{:x}", computed, received);
        return Err(ProtocolError::Pec { computed, received });
    }

    Ok(())
}
