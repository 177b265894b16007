//! Drivers talking through `SpiTransport` to simulated chips

use core::convert::Infallible;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, InputPin},
    spi::{self, Operation, SpiDevice, MODE_0, MODE_3},
};

use iclib::{
    ina229::{self, registers::*, ChipType, Ina229},
    ltc6810::{self, Address, AdcMode, Cells, Ltc6810, RegisterGroup, Target},
    pec, transact, Access, Buffer, BusConfig, Echo, Error, Frame, FramingError, Header, Register,
    SpiTransport, Transport,
};

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct Released;

impl ErrorType for Released {
    type Error = Infallible;
}

impl InputPin for Released {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(false)
    }
}

/// Hands every in-place transfer to `exchange`
trait Chip {
    fn exchange(&mut self, buf: &mut [u8]);
}

struct Device<C> {
    chip: C,
    transfer_lens: Vec<usize>,
}

impl<C> Device<C> {
    fn new(chip: C) -> Self {
        Self {
            chip,
            transfer_lens: Vec::new(),
        }
    }
}

impl<C> spi::ErrorType for Device<C> {
    type Error = Infallible;
}

impl<C: Chip> SpiDevice for Device<C> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        for op in operations {
            match op {
                Operation::TransferInPlace(buf) => {
                    self.transfer_lens.push(buf.len());
                    self.chip.exchange(buf);
                }
                _ => panic!("drivers only use in-place transfers"),
            }
        }

        Ok(())
    }
}

/// Sends every byte straight back
struct Echoing;

impl Transport for Echoing {
    type Error = Infallible;

    fn config(&self) -> BusConfig {
        BusConfig::new(MODE_0, 1_000_000)
    }

    fn transfer(&mut self, _buf: &mut Buffer) -> Result<(), Infallible> {
        Ok(())
    }
}

#[test]
fn written_values_parse_back_from_echo() {
    let header = Header::addressed(0x40, 0x12, Echo::Ignore);

    for width in [8, 16, 24, 40, 64] {
        let register = Register::new(0x12, width, "test", Access::ReadWrite);
        let max = u64::MAX >> (64 - width as u32);

        for value in [0, 1, 0xa5 & max, max >> 1, max] {
            let frames = [
                Frame::write(header, register, value),
                Frame::write(header, register, max - value),
            ];
            assert_eq!(transact(&mut Echoing, &frames), Ok([value, max - value]));
        }
    }
}

/// Register file answering frames back to back
struct SimulatedIna229 {
    registers: [u64; 0x40],
}

impl SimulatedIna229 {
    fn new() -> Self {
        let mut registers = [0; 0x40];
        registers[MANUFACTURER_ID.address as usize] = 0x5449;
        registers[DEVICE_ID.address as usize] = 0x2291;
        registers[VBUS.address as usize] = 0x0a_bcde;
        registers[ENERGY.address as usize] = 0x12_3456_789a;

        Self { registers }
    }
}

impl Chip for SimulatedIna229 {
    fn exchange(&mut self, buf: &mut [u8]) {
        let mut at = 0;

        while at < buf.len() {
            let control = buf[at];
            let address = (control >> 2) as usize;
            let register = ALL
                .into_iter()
                .find(|r| r.address as usize == address)
                .expect("unknown register");
            let len = register.byte_count();

            buf[at] = 0;
            let data = &mut buf[at + 1..at + 1 + len];
            if control & 1 == 1 {
                BigEndian::write_uint(data, self.registers[address], len);
            } else {
                self.registers[address] = BigEndian::read_uint(data, len);
                data.fill(0);
            }

            at += 1 + len;
        }
    }
}

fn ina229() -> Ina229<SpiTransport<Device<SimulatedIna229>>, Released, NoDelay> {
    let device = Device::new(SimulatedIna229::new());
    let transport = SpiTransport::new(device, BusConfig::new(MODE_3, 5_000_000));

    Ina229::new(transport, Released, NoDelay).unwrap()
}

#[test]
fn ina229_writes_read_back() {
    let mut chip = ina229();

    for register in ALL.iter().filter(|r| r.is_writable()) {
        for value in [0, 1, 0x00ff, 0x1234, 0x8000, 0xffff] {
            assert_eq!(chip.write(*register, value), Ok(0), "{}", register.name);
            assert_eq!(chip.read(*register), Ok(value), "{}", register.name);
        }
    }
}

#[test]
fn ina229_batch_is_one_transfer() {
    let mut chip = ina229();

    let values = chip.read_many([CONFIG, VBUS, ENERGY, DEVICE_ID]).unwrap();
    assert_eq!(values, [0, 0x0a_bcde, 0x12_3456_789a, 0x2291]);

    let (transport, _, _) = chip.release();
    assert_eq!(transport.release().transfer_lens, [3 + 4 + 6 + 3]);
}

#[test]
fn ina229_reads_whole_map_at_once() {
    let mut chip = ina229();

    let values = chip.read_many(ALL).unwrap();
    assert_eq!(values[9], 0x12_3456_789a);
    assert_eq!(values[19], 0x2291);

    let (transport, _, _) = chip.release();
    assert_eq!(transport.release().transfer_lens, [70]);
}

#[test]
fn ina229_probe_and_reset() {
    let mut chip = ina229();

    assert_eq!(chip.probe(), Ok(ChipType::Ina229 { revision: 1 }));
    assert_eq!(chip.alert_active(), Ok(false));

    chip.reset().unwrap();
    assert!(chip.config().unwrap().contains(ina229::ConfigFlags::RST));
}

#[test]
fn ina229_rejects_before_transfer() {
    let mut chip = ina229();

    assert_eq!(
        chip.write(VBUS, 1),
        Err(Error::Framing(FramingError::NotWritable))
    );
    assert_eq!(
        chip.write(CONFIG, 0x1_0000),
        Err(Error::Framing(FramingError::ValueTooWide))
    );

    let (transport, _, _) = chip.release();
    assert!(transport.release().transfer_lens.is_empty());
}

#[test]
fn ina229_rejects_unsupported_mode() {
    let device = Device::new(SimulatedIna229::new());
    let transport = SpiTransport::new(device, BusConfig::new(spi::MODE_1, 1_000_000));

    assert!(Ina229::new(transport, Released, NoDelay).is_err());
}

/// Single chip that checks every PEC it is sent and protects everything it returns
struct SimulatedLtc6810 {
    address: u8,
    config: [u8; 6],
    cells: [u16; 6],
    conversions: usize,
}

impl SimulatedLtc6810 {
    fn new(address: u8) -> Self {
        Self {
            address,
            config: [0; 6],
            cells: [0xffff; 6],
            conversions: 0,
        }
    }

    fn reply(data: [u8; 6], out: &mut [u8]) {
        out[..6].copy_from_slice(&data);
        out[6..8].copy_from_slice(&pec::pec_bytes(&data));
    }

    fn cell_group(&self, first: usize) -> [u8; 6] {
        let mut data = [0; 6];
        for (i, chunk) in data.chunks_mut(2).enumerate() {
            LittleEndian::write_u16(chunk, self.cells[first + i]);
        }
        data
    }
}

impl Chip for SimulatedLtc6810 {
    fn exchange(&mut self, buf: &mut [u8]) {
        let (command, rest) = buf.split_at_mut(4);

        assert_eq!(
            pec::pec15(&command[..2]),
            u16::from_be_bytes([command[2], command[3]])
        );
        if command[0] & 0x80 != 0 {
            assert_eq!((command[0] >> 3) & 0xf, self.address);
        }

        let code = u16::from_be_bytes([command[0] & 0x07, command[1]]);
        command.fill(0xff);

        match code {
            ltc6810::commands::WRCFG => {
                let (data, code) = rest.split_at(6);
                assert_eq!(pec::pec_bytes(data), [code[0], code[1]]);
                self.config.copy_from_slice(data);
            }
            ltc6810::commands::RDCFG => Self::reply(self.config, rest),
            ltc6810::commands::RDCVA => Self::reply(self.cell_group(0), rest),
            ltc6810::commands::RDCVB => Self::reply(self.cell_group(3), rest),
            ltc6810::commands::CLRCELL => self.cells = [0xffff; 6],
            ltc6810::commands::PLADC => rest[0] = 0xff,
            adcv if adcv & !0x187 == ltc6810::commands::ADCV => {
                self.cells = [36_000, 36_500, 37_000, 37_500, 38_000, 38_500];
                self.conversions += 1;
            }
            other => panic!("unexpected command 0x{:x}", other),
        }
    }
}

fn ltc6810(address: u8) -> Ltc6810<SpiTransport<Device<SimulatedLtc6810>>, NoDelay> {
    let device = Device::new(SimulatedLtc6810::new(address));
    let transport = SpiTransport::new(device, BusConfig::new(MODE_3, 3_200_000));

    Ltc6810::new(transport, NoDelay).unwrap()
}

#[test]
fn ltc6810_config_round_trip() {
    let target = Target::Address(Address::new(3).unwrap());
    let mut chip = ltc6810(3);
    let config = RegisterGroup([0xf8, 0x00, 0x00, 0x12, 0x00, 0x00]);

    chip.write_config(target, config).unwrap();
    assert_eq!(chip.read_config(target), Ok(config));

    chip.select_adc_mode(target, AdcMode::Khz14).unwrap();
    assert_eq!(chip.read_config(target).unwrap().0[0], 0xf9);
}

#[test]
fn ltc6810_measures_cells() {
    let target = Target::Address(Address::new(0).unwrap());
    let mut chip = ltc6810(0);

    chip.clear_cells(target).unwrap();
    chip.convert_cell_voltages(target, AdcMode::Khz7, Cells::All)
        .unwrap();

    let cells = chip.read_cell_voltages(target).unwrap();
    assert_eq!(cells.c1, 36_000);
    assert_eq!(cells.c6, 38_500);
    assert_eq!(ltc6810::microvolts(cells.c1), 3_600_000);

    let (transport, _) = chip.release();
    let device = transport.release();
    assert_eq!(device.chip.conversions, 1);
    // CLRCELL, ADCV, PLADC, RDCVA, RDCVB
    assert_eq!(device.transfer_lens, [4, 4, 5, 12, 12]);
}

#[test]
fn ltc6810_only_talks_mode_3() {
    let device = Device::new(SimulatedLtc6810::new(0));
    let transport = SpiTransport::new(device, BusConfig::new(MODE_0, 3_200_000));

    assert!(Ltc6810::new(transport, NoDelay).is_err());
}
