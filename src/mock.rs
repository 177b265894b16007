//! Test doubles for the bus, GPIO lines and delays

use std::{collections::VecDeque, vec::Vec};

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, InputPin, OutputPin},
    spi::{Mode, MODE_0},
};

use crate::bus::{Buffer, BusConfig, Transport};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusFault;

/// Records every transfer and answers with scripted responses, or zeros once the
/// script runs out
pub struct MockTransport {
    pub config: BusConfig,
    pub transfers: Vec<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_config(BusConfig::new(MODE_0, 1_000_000))
    }

    pub fn with_mode(mode: Mode, max_speed_hz: u32) -> Self {
        Self::with_config(BusConfig::new(mode, max_speed_hz))
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            transfers: Vec::new(),
            responses: VecDeque::new(),
            fail: false,
        }
    }

    pub fn respond(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    pub fn fail_next(&mut self) {
        self.fail = true;
    }
}

impl Transport for MockTransport {
    type Error = BusFault;

    fn config(&self) -> BusConfig {
        self.config
    }

    fn transfer(&mut self, buf: &mut Buffer) -> Result<(), BusFault> {
        self.transfers.push(buf.to_vec());

        if self.fail {
            self.fail = false;
            return Err(BusFault);
        }

        match self.responses.pop_front() {
            Some(response) => {
                buf.clear();
                buf.extend_from_slice(&response).unwrap();
            }
            None => buf.iter_mut().for_each(|b| *b = 0),
        }

        Ok(())
    }
}

/// A GPIO line that remembers every level it was driven to
#[derive(Default)]
pub struct MockPin {
    pub high: bool,
    pub history: Vec<bool>,
}

impl MockPin {
    pub fn new(high: bool) -> Self {
        Self {
            high,
            history: Vec::new(),
        }
    }
}

impl ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.history.push(true);
        Ok(())
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

/// Sums up requested delays instead of sleeping
#[derive(Default)]
pub struct MockDelay {
    pub total_ns: u64,
    pub calls: usize,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
        self.calls += 1;
    }
}
