//! SX1276/SX1278 register-level driver (RFM95 / RFM96 modules).
//!
//! Talks to the modem over any `embedded_hal` SPI device and registers the
//! receive-event action on the DIO0 line through an [`InterruptLine`].
//!
//! # Register access
//!
//! A single-byte access is a two-byte frame: the register address with bit 7
//! set for writes (clear for reads), followed by the value.
//!
//! # Mode changes
//!
//! LoRa mode can only be entered from sleep, so [`LoRaChip::begin`] goes
//! through sleep first. All other configuration is written in standby.

use super::chip::{ChipError, InterruptTrigger, IrqAction, LoRaChip};
use super::config::{bandwidth_code, RadioConfig, BANDWIDTHS_KHZ};
use super::variant::Band;
use embedded_hal::spi::{Operation, SpiDevice};
use log::{debug, warn};
use std::fmt;

// Registers (LoRa page)
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_OP_MODE: u8 = 0x01;
const REG_FRF_MSB: u8 = 0x06;
const REG_FRF_MID: u8 = 0x07;
const REG_FRF_LSB: u8 = 0x08;
const REG_PA_CONFIG: u8 = 0x09;
const REG_OCP: u8 = 0x0B;
const REG_LNA: u8 = 0x0C;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PREAMBLE_MSB: u8 = 0x20;
const REG_PREAMBLE_LSB: u8 = 0x21;
const REG_MODEM_CONFIG_3: u8 = 0x26;
const REG_DETECT_OPTIMIZE: u8 = 0x31;
const REG_DETECTION_THRESHOLD: u8 = 0x37;
const REG_SYNC_WORD: u8 = 0x39;
const REG_DIO_MAPPING_1: u8 = 0x40;
const REG_VERSION: u8 = 0x42;
const REG_PA_DAC: u8 = 0x4D;

const WRITE_FLAG: u8 = 0x80;

/// Version register value of SX1276/77/78/79 silicon.
const CHIP_VERSION: u8 = 0x12;

// RegOpMode
const LONG_RANGE_MODE: u8 = 0x80;
const MODE_MASK: u8 = 0x07;
const MODE_SLEEP: u8 = 0x00;
const MODE_STANDBY: u8 = 0x01;
const MODE_RX_CONTINUOUS: u8 = 0x05;

// RegModemConfig1 / 2 / 3
const BANDWIDTH_MASK: u8 = 0xF0;
const CODING_RATE_MASK: u8 = 0x0E;
const IMPLICIT_HEADER: u8 = 0x01;
const SPREADING_FACTOR_MASK: u8 = 0xF0;
const RX_PAYLOAD_CRC_ON: u8 = 0x04;
const LOW_DATA_RATE_OPTIMIZE: u8 = 0x08;
const AGC_AUTO_ON: u8 = 0x04;

// RegDioMapping1: DIO0 bits 7-6, 00 = RxDone in receive mode
const DIO0_MASK: u8 = 0xC0;
const DIO0_RX_DONE: u8 = 0x00;

// RegPaConfig / RegPaDac
const PA_SELECT_BOOST: u8 = 0x80;
const PA_MAX_POWER: u8 = 0x70;
const PA_DAC_DEFAULT: u8 = 0x84;
const PA_DAC_HIGH_POWER: u8 = 0x87;

// RegOcp
const OCP_ON: u8 = 0x20;

// RegLna: boost on the HF port
const LNA_BOOST_HF: u8 = 0x03;

/// Symbol time above which low data rate optimization is required (ms).
const LDRO_SYMBOL_TIME_MS: f32 = 16.0;

/// Crystal frequency divided by 2^19, inverted: Frf = MHz * 2^14.
const FRF_PER_MHZ: f64 = 16384.0;

/// Line the modem raises on receive events (DIO0).
///
/// Implemented for the platform GPIO driver; `attach` must arrange for
/// `action` to run from the GPIO interrupt.
pub trait InterruptLine {
    type Error: fmt::Debug;

    fn attach(&mut self, action: IrqAction, trigger: InterruptTrigger) -> Result<(), Self::Error>;

    fn detach(&mut self) -> Result<(), Self::Error>;
}

/// SX127x modem on an SPI bus with its DIO0 line.
pub struct Sx127x<SPI, DIO> {
    spi: SPI,
    dio0: DIO,
    band: Band,
    // Tracked for the low data rate optimization decision
    bandwidth_khz: f32,
    spreading_factor: u8,
}

impl<SPI, DIO> Sx127x<SPI, DIO> {
    /// Wrap a modem of the given band. No bus traffic until `begin`.
    pub fn new(spi: SPI, dio0: DIO, band: Band) -> Self {
        Self {
            spi,
            dio0,
            band,
            // Power-on defaults
            bandwidth_khz: 125.0,
            spreading_factor: 7,
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Release the bus and interrupt line.
    pub fn release(self) -> (SPI, DIO) {
        (self.spi, self.dio0)
    }
}

impl<SPI, DIO> Sx127x<SPI, DIO>
where
    SPI: SpiDevice,
    DIO: InterruptLine,
{
    fn read_register(&mut self, reg: u8) -> Result<u8, ChipError> {
        let mut value = [0u8];
        self.spi
            .transaction(&mut [
                Operation::Write(&[reg & !WRITE_FLAG]),
                Operation::Read(&mut value),
            ])
            .map_err(|_| ChipError::Bus)?;
        Ok(value[0])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), ChipError> {
        self.spi
            .write(&[reg | WRITE_FLAG, value])
            .map_err(|_| ChipError::Bus)
    }

    /// Read-modify-write of the bits selected by `mask`.
    fn modify_register(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), ChipError> {
        let current = self.read_register(reg)?;
        self.write_register(reg, (current & !mask) | (value & mask))
    }

    fn set_mode(&mut self, mode: u8) -> Result<(), ChipError> {
        self.modify_register(REG_OP_MODE, MODE_MASK, mode)
    }

    fn update_low_data_rate_optimize(&mut self) -> Result<(), ChipError> {
        let symbol_ms = (1u32 << self.spreading_factor) as f32 / self.bandwidth_khz;
        let ldro = if symbol_ms > LDRO_SYMBOL_TIME_MS {
            LOW_DATA_RATE_OPTIMIZE
        } else {
            0
        };
        self.write_register(REG_MODEM_CONFIG_3, ldro | AGC_AUTO_ON)
    }
}

impl<SPI, DIO> LoRaChip for Sx127x<SPI, DIO>
where
    SPI: SpiDevice,
    DIO: InterruptLine,
{
    fn begin(&mut self, config: &RadioConfig) -> Result<(), ChipError> {
        let version = self.read_register(REG_VERSION)?;
        if version != CHIP_VERSION {
            return Err(ChipError::ChipNotFound { version });
        }

        self.set_mode(MODE_SLEEP)?;
        self.modify_register(REG_OP_MODE, LONG_RANGE_MODE, LONG_RANGE_MODE)?;
        self.set_mode(MODE_STANDBY)?;

        self.write_register(REG_FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, 0x00)?;
        self.modify_register(REG_LNA, LNA_BOOST_HF, LNA_BOOST_HF)?;
        self.modify_register(REG_MODEM_CONFIG_1, IMPLICIT_HEADER, 0)?;

        self.set_frequency(config.frequency_mhz)?;
        self.set_bandwidth(config.bandwidth_khz)?;
        self.set_spreading_factor(config.spreading_factor)?;
        self.set_coding_rate(config.coding_rate)?;
        self.set_sync_word(config.sync_word)?;
        self.set_current_limit(config.current_limit_ma)?;
        self.set_preamble_length(config.preamble_length)?;
        self.set_output_power(config.power_dbm)?;

        debug!(
            "{} ready: {} MHz, SF{}, {} kHz",
            self.band.part_name(),
            config.frequency_mhz,
            config.spreading_factor,
            config.bandwidth_khz
        );
        Ok(())
    }

    fn set_frequency(&mut self, mhz: f32) -> Result<(), ChipError> {
        if !self.band.frequency_range().contains(&mhz) {
            return Err(ChipError::InvalidFrequency);
        }
        let frf = (mhz as f64 * FRF_PER_MHZ) as u32;
        self.write_register(REG_FRF_MSB, (frf >> 16) as u8)?;
        self.write_register(REG_FRF_MID, (frf >> 8) as u8)?;
        self.write_register(REG_FRF_LSB, frf as u8)
    }

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), ChipError> {
        let code = bandwidth_code(khz).ok_or(ChipError::InvalidBandwidth)?;
        self.modify_register(REG_MODEM_CONFIG_1, BANDWIDTH_MASK, code << 4)?;
        self.bandwidth_khz = BANDWIDTHS_KHZ[code as usize];
        self.update_low_data_rate_optimize()
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ChipError> {
        if !(6..=12).contains(&sf) {
            return Err(ChipError::InvalidSpreadingFactor);
        }
        // SF6 only works with implicit header and its own detection settings
        let (optimize, threshold, header) = if sf == 6 {
            (0x05, 0x0C, IMPLICIT_HEADER)
        } else {
            (0x03, 0x0A, 0)
        };
        self.modify_register(REG_MODEM_CONFIG_2, SPREADING_FACTOR_MASK, sf << 4)?;
        self.modify_register(REG_MODEM_CONFIG_1, IMPLICIT_HEADER, header)?;
        self.modify_register(REG_DETECT_OPTIMIZE, 0x07, optimize)?;
        self.write_register(REG_DETECTION_THRESHOLD, threshold)?;
        self.spreading_factor = sf;
        self.update_low_data_rate_optimize()
    }

    fn set_coding_rate(&mut self, cr: u8) -> Result<(), ChipError> {
        if !(5..=8).contains(&cr) {
            return Err(ChipError::InvalidCodingRate);
        }
        self.modify_register(REG_MODEM_CONFIG_1, CODING_RATE_MASK, (cr - 4) << 1)
    }

    fn set_sync_word(&mut self, sync_word: u8) -> Result<(), ChipError> {
        self.write_register(REG_SYNC_WORD, sync_word)
    }

    fn set_output_power(&mut self, dbm: i8) -> Result<(), ChipError> {
        // RFM9x modules only route the PA_BOOST pin
        let (dac, level) = match dbm {
            2..=17 => (PA_DAC_DEFAULT, dbm - 2),
            18..=20 => (PA_DAC_HIGH_POWER, dbm - 5),
            _ => return Err(ChipError::InvalidOutputPower),
        };
        self.write_register(REG_PA_DAC, dac)?;
        self.write_register(REG_PA_CONFIG, PA_SELECT_BOOST | PA_MAX_POWER | level as u8)
    }

    fn set_current_limit(&mut self, ma: u8) -> Result<(), ChipError> {
        let trim = match ma {
            0 => return self.modify_register(REG_OCP, OCP_ON, 0),
            45..=120 => (ma - 45) / 5,
            121..=240 => ((ma as u16 + 30) / 10) as u8,
            _ => return Err(ChipError::InvalidCurrentLimit),
        };
        self.write_register(REG_OCP, OCP_ON | trim)
    }

    fn set_preamble_length(&mut self, symbols: u16) -> Result<(), ChipError> {
        if symbols < 6 {
            return Err(ChipError::InvalidPreambleLength);
        }
        self.write_register(REG_PREAMBLE_MSB, (symbols >> 8) as u8)?;
        self.write_register(REG_PREAMBLE_LSB, symbols as u8)
    }

    fn set_crc(&mut self, enabled: bool) -> Result<(), ChipError> {
        let value = if enabled { RX_PAYLOAD_CRC_ON } else { 0 };
        self.modify_register(REG_MODEM_CONFIG_2, RX_PAYLOAD_CRC_ON, value)
    }

    fn standby(&mut self) -> Result<(), ChipError> {
        self.set_mode(MODE_STANDBY)
    }

    fn start_receive(&mut self) -> Result<(), ChipError> {
        self.set_mode(MODE_STANDBY)?;
        self.modify_register(REG_DIO_MAPPING_1, DIO0_MASK, DIO0_RX_DONE)?;
        self.write_register(REG_IRQ_FLAGS, 0xFF)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, 0x00)?;
        self.write_register(REG_FIFO_ADDR_PTR, 0x00)?;
        self.set_mode(MODE_RX_CONTINUOUS)
    }

    fn sleep(&mut self) -> Result<(), ChipError> {
        self.set_mode(MODE_SLEEP)
    }

    fn set_interrupt_action(&mut self, action: IrqAction, trigger: InterruptTrigger) {
        if let Err(e) = self.dio0.attach(action, trigger) {
            warn!("Failed to attach DIO0 interrupt: {:?}", e);
        }
    }

    fn clear_interrupt_action(&mut self) {
        if let Err(e) = self.dio0.detach() {
            warn!("Failed to detach DIO0 interrupt: {:?}", e);
        }
    }
}
