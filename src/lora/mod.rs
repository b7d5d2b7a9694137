//! LoRa radio support.
//!
//! This module contains:
//! - [`config`]: Region channel plans, modem presets and standard parameters
//! - [`chip`]: Command set shared by the RFM95 and RFM96 parts
//! - [`variant`]: Chip variant selection from the base frequency
//! - [`irq`]: Receive-event interrupt bridge
//! - [`iface`]: Radio state controller
//! - [`sx127x`]: SX1276/SX1278 register-level driver
//! - [`sim`]: Simulated chip for host runs and tests
//! - [`esp32`]: Pin wiring and GPIO interrupts (ESP32 only)

mod chip;
mod config;
mod iface;
mod irq;
mod sim;
mod sx127x;
mod variant;

#[cfg(feature = "esp32")]
mod esp32;

pub use chip::{ChipError, InterruptTrigger, IrqAction, LoRaChip};
pub use config::{
    bandwidth_code, ConfigError, ModemPreset, RadioConfig, Region, BANDWIDTHS_KHZ,
    CURRENT_LIMIT_MA, MIN_POWER_DBM, MIN_PREAMBLE_LENGTH, POWER_CEILING_DBM, PREAMBLE_LENGTH,
    SYNC_WORD, TX_POWER,
};
pub use iface::{
    ChipFault, ConfigStep, InitError, PendingTransmission, RadioState, Rf95Interface,
};
pub use irq::{InterruptBridge, RxSignal};
pub use sim::{ChipCall, ChipOp, SimChip, SimHandle};
pub use sx127x::{InterruptLine, Sx127x};
pub use variant::{Band, ChipVariant, BAND_SPLIT_MHZ};

#[cfg(feature = "esp32")]
pub use esp32::{hardware_reset, reset_module, EspSx127x, Rfm9xPins};
