//! Command surface shared by the RFM95 and RFM96 parts.
//!
//! Both parts accept the same commands; they only differ in which
//! frequencies `set_frequency` accepts. Every command reports success or a
//! [`ChipError`]; the interrupt registration calls are fire-and-forget.

use super::config::RadioConfig;
use std::fmt;

/// Action invoked from interrupt context when the receive-event line fires.
///
/// Must not block or allocate.
pub type IrqAction = Box<dyn FnMut() + Send + 'static>;

/// Condition on the interrupt line that triggers the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptTrigger {
    /// Low to high transition.
    RisingEdge,
    /// High to low transition.
    FallingEdge,
    /// Line held high.
    HighLevel,
    /// Line held low.
    LowLevel,
}

/// LoRa chip command set.
pub trait LoRaChip {
    /// Reset the modem into LoRa mode and apply every parameter in `config`.
    ///
    /// `config.power_dbm` is sent as-is; callers apply the power ceiling.
    fn begin(&mut self, config: &RadioConfig) -> Result<(), ChipError>;

    fn set_frequency(&mut self, mhz: f32) -> Result<(), ChipError>;

    fn set_bandwidth(&mut self, khz: f32) -> Result<(), ChipError>;

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), ChipError>;

    /// Coding rate denominator (5 = 4/5 ... 8 = 4/8).
    fn set_coding_rate(&mut self, cr: u8) -> Result<(), ChipError>;

    fn set_sync_word(&mut self, sync_word: u8) -> Result<(), ChipError>;

    fn set_output_power(&mut self, dbm: i8) -> Result<(), ChipError>;

    /// Over-current protection limit in mA; 0 disables protection.
    fn set_current_limit(&mut self, ma: u8) -> Result<(), ChipError>;

    fn set_preamble_length(&mut self, symbols: u16) -> Result<(), ChipError>;

    /// Enable or disable payload CRC generation and checking.
    fn set_crc(&mut self, enabled: bool) -> Result<(), ChipError>;

    fn standby(&mut self) -> Result<(), ChipError>;

    /// Enter continuous receive.
    ///
    /// Clears any stale interrupt flags left in the chip.
    fn start_receive(&mut self) -> Result<(), ChipError>;

    fn sleep(&mut self) -> Result<(), ChipError>;

    /// Register `action` to run when the receive-event line meets `trigger`.
    ///
    /// Replaces any previously registered action.
    fn set_interrupt_action(&mut self, action: IrqAction, trigger: InterruptTrigger);

    /// Remove the registered action. Safe to call when none is registered.
    fn clear_interrupt_action(&mut self);
}

/// Status reported by a failed chip command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipError {
    /// Bus transfer failed.
    Bus,
    /// Version register did not identify a supported part.
    ChipNotFound { version: u8 },
    /// Frequency outside the part's band.
    InvalidFrequency,
    InvalidBandwidth,
    InvalidSpreadingFactor,
    InvalidCodingRate,
    InvalidOutputPower,
    InvalidCurrentLimit,
    InvalidPreambleLength,
}

impl fmt::Display for ChipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "bus error"),
            Self::ChipNotFound { version } => {
                write!(f, "chip not found (version register 0x{:02X})", version)
            }
            Self::InvalidFrequency => write!(f, "frequency not supported by this part"),
            Self::InvalidBandwidth => write!(f, "invalid bandwidth"),
            Self::InvalidSpreadingFactor => write!(f, "invalid spreading factor"),
            Self::InvalidCodingRate => write!(f, "invalid coding rate"),
            Self::InvalidOutputPower => write!(f, "invalid output power"),
            Self::InvalidCurrentLimit => write!(f, "invalid current limit"),
            Self::InvalidPreambleLength => write!(f, "invalid preamble length"),
        }
    }
}

impl std::error::Error for ChipError {}
