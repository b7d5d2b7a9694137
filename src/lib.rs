//! RFM95/RFM96 LoRa radio interface for ESP32 mesh nodes.
//!
//! This library contains the radio state machine and its platform-independent
//! pieces, which can be tested on the host machine without ESP32 hardware.

pub mod lora;

// Re-export commonly used items
pub use lora::{
    Band, ChipError, ConfigError, InitError, LoRaChip, ModemPreset, PendingTransmission,
    RadioConfig, RadioState, Region, Rf95Interface,
};
