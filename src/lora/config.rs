//! LoRa region and modem configuration.
//!
//! The operating frequency comes from the region's channel plan, the modem
//! shape (bandwidth, spreading factor, coding rate) from a [`ModemPreset`].
//! Everything else uses fixed network-wide defaults.

use super::variant::Band;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frequency band region.
///
/// Determines the base frequency (channel 0) and channel plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// US 902-928 MHz band
    Us915,
    /// EU 433 MHz band
    Eu433,
    /// EU 863-870 MHz band
    Eu868,
    /// China 470-510 MHz band
    Cn470,
    /// Japan 920-923 MHz band
    Jp920,
    /// Australia / New Zealand 915-928 MHz band
    Anz915,
}

impl Region {
    /// Frequency of channel 0 in MHz.
    pub fn base_frequency_mhz(self) -> f32 {
        match self {
            Self::Us915 => 903.08,
            Self::Eu433 => 433.175,
            Self::Eu868 => 865.20,
            Self::Cn470 => 470.0,
            Self::Jp920 => 920.0,
            Self::Anz915 => 916.0,
        }
    }

    /// Spacing between adjacent channels in MHz.
    pub fn channel_spacing_mhz(self) -> f32 {
        match self {
            Self::Us915 => 2.16,
            Self::Eu433 => 0.2,
            Self::Eu868 => 0.3,
            Self::Cn470 => 2.0,
            Self::Jp920 => 0.5,
            Self::Anz915 => 0.5,
        }
    }

    /// Number of channels in the plan.
    pub fn num_channels(self) -> u8 {
        match self {
            Self::Us915 => 13,
            Self::Eu433 => 8,
            Self::Eu868 => 10,
            Self::Cn470 => 20,
            Self::Jp920 => 10,
            Self::Anz915 => 20,
        }
    }

    /// Center frequency of `channel` in MHz.
    pub fn channel_frequency_mhz(self, channel: u8) -> Result<f32, ConfigError> {
        if channel >= self.num_channels() {
            return Err(ConfigError::InvalidChannel {
                channel,
                max: self.num_channels() - 1,
            });
        }
        Ok(self.base_frequency_mhz() + self.channel_spacing_mhz() * channel as f32)
    }
}

impl Default for Region {
    fn default() -> Self {
        #[cfg(feature = "region-eu433")]
        return Self::Eu433;
        #[cfg(feature = "region-eu868")]
        return Self::Eu868;
        #[cfg(feature = "region-cn470")]
        return Self::Cn470;
        #[cfg(feature = "region-jp920")]
        return Self::Jp920;
        #[cfg(feature = "region-anz915")]
        return Self::Anz915;
        #[cfg(not(any(
            feature = "region-eu433",
            feature = "region-eu868",
            feature = "region-cn470",
            feature = "region-jp920",
            feature = "region-anz915"
        )))]
        Self::Us915
    }
}

/// Modem shape shared by every node on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModemPreset {
    /// 125 kHz, CR 4/5, SF7
    #[default]
    ShortFast,
    /// 500 kHz, CR 4/5, SF7
    MediumFast,
    /// 31.25 kHz, CR 4/8, SF9
    LongSlow,
    /// 125 kHz, CR 4/8, SF12
    VeryLongSlow,
}

impl ModemPreset {
    /// Bandwidth in kHz.
    pub fn bandwidth_khz(self) -> f32 {
        match self {
            Self::ShortFast | Self::VeryLongSlow => 125.0,
            Self::MediumFast => 500.0,
            Self::LongSlow => 31.25,
        }
    }

    /// Spreading factor.
    pub fn spreading_factor(self) -> u8 {
        match self {
            Self::ShortFast | Self::MediumFast => 7,
            Self::LongSlow => 9,
            Self::VeryLongSlow => 12,
        }
    }

    /// Coding rate denominator (5 = 4/5).
    pub fn coding_rate(self) -> u8 {
        match self {
            Self::ShortFast | Self::MediumFast => 5,
            Self::LongSlow | Self::VeryLongSlow => 8,
        }
    }
}

// ==================== Standard Parameters ====================

/// Highest output power the RFM9x parts accept, in dBm.
pub const POWER_CEILING_DBM: i8 = 20;

/// Lowest output power reachable on the PA_BOOST pin, in dBm.
pub const MIN_POWER_DBM: i8 = 2;

/// Default requested TX power in dBm.
pub const TX_POWER: i8 = 17;

/// Sync word (0x12 for a private network).
pub const SYNC_WORD: u8 = 0x12;

/// Preamble length in symbols.
pub const PREAMBLE_LENGTH: u16 = 32;

/// Shortest preamble the modem can lock on to.
pub const MIN_PREAMBLE_LENGTH: u16 = 6;

/// Over-current protection limit in mA.
pub const CURRENT_LIMIT_MA: u8 = 100;

/// Bandwidths supported by the modem, in kHz, indexed by register code.
pub const BANDWIDTHS_KHZ: [f32; 10] = [
    7.8, 10.4, 15.6, 20.8, 31.25, 41.7, 62.5, 125.0, 250.0, 500.0,
];

/// Register code for a bandwidth in kHz, if the modem supports it.
pub fn bandwidth_code(khz: f32) -> Option<u8> {
    BANDWIDTHS_KHZ
        .iter()
        .position(|&bw| (bw - khz).abs() < 0.01)
        .map(|i| i as u8)
}

/// Complete parameter set pushed to the chip.
///
/// `power_dbm` holds the requested power; the ceiling is only applied when
/// the value is handed to the chip (see [`RadioConfig::with_power_ceiling`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Region whose channel 0 decides the chip variant.
    pub region: Region,
    /// Operating frequency in MHz.
    pub frequency_mhz: f32,
    /// Bandwidth in kHz.
    pub bandwidth_khz: f32,
    /// Spreading factor (6-12).
    pub spreading_factor: u8,
    /// Coding rate denominator (5-8).
    pub coding_rate: u8,
    /// Sync word.
    pub sync_word: u8,
    /// Requested TX power in dBm.
    pub power_dbm: i8,
    /// Over-current protection limit in mA (0 disables).
    pub current_limit_ma: u8,
    /// Preamble length in symbols.
    pub preamble_length: u16,
}

impl RadioConfig {
    /// Build a configuration for a region channel and modem preset.
    pub fn new(
        region: Region,
        channel: u8,
        preset: ModemPreset,
        power_dbm: i8,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            region,
            frequency_mhz: region.channel_frequency_mhz(channel)?,
            bandwidth_khz: preset.bandwidth_khz(),
            spreading_factor: preset.spreading_factor(),
            coding_rate: preset.coding_rate(),
            sync_word: SYNC_WORD,
            power_dbm,
            current_limit_ma: CURRENT_LIMIT_MA,
            preamble_length: PREAMBLE_LENGTH,
        };
        config.validate()?;
        Ok(config)
    }

    /// Channel 0 of `region` with the default preset and power.
    pub fn for_region(region: Region) -> Self {
        Self {
            region,
            frequency_mhz: region.base_frequency_mhz(),
            bandwidth_khz: ModemPreset::default().bandwidth_khz(),
            spreading_factor: ModemPreset::default().spreading_factor(),
            coding_rate: ModemPreset::default().coding_rate(),
            sync_word: SYNC_WORD,
            power_dbm: TX_POWER,
            current_limit_ma: CURRENT_LIMIT_MA,
            preamble_length: PREAMBLE_LENGTH,
        }
    }

    /// Frequency used to pick the chip variant.
    pub fn base_frequency_mhz(&self) -> f32 {
        self.region.base_frequency_mhz()
    }

    /// Power actually sent to the chip.
    pub fn effective_power_dbm(&self) -> i8 {
        self.power_dbm.min(POWER_CEILING_DBM)
    }

    /// Copy of this configuration with the power ceiling applied.
    pub fn with_power_ceiling(&self) -> Self {
        Self {
            power_dbm: self.effective_power_dbm(),
            ..*self
        }
    }

    /// Validate configuration values.
    ///
    /// Power above the ceiling is accepted here; it is clamped on its way to
    /// the chip.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frequency_mhz.is_finite() || self.frequency_mhz <= 0.0 {
            return Err(ConfigError::InvalidFrequency(self.frequency_mhz));
        }
        if bandwidth_code(self.bandwidth_khz).is_none() {
            return Err(ConfigError::InvalidBandwidth(self.bandwidth_khz));
        }
        if !(6..=12).contains(&self.spreading_factor) {
            return Err(ConfigError::InvalidSpreadingFactor(self.spreading_factor));
        }
        if !(5..=8).contains(&self.coding_rate) {
            return Err(ConfigError::InvalidCodingRate(self.coding_rate));
        }
        if self.power_dbm < MIN_POWER_DBM {
            return Err(ConfigError::PowerTooLow(self.power_dbm));
        }
        if self.current_limit_ma != 0 && !(45..=240).contains(&self.current_limit_ma) {
            return Err(ConfigError::InvalidCurrentLimit(self.current_limit_ma));
        }
        if self.preamble_length < MIN_PREAMBLE_LENGTH {
            return Err(ConfigError::InvalidPreambleLength(self.preamble_length));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), plus checks that the chip built for
    /// `band` can serve this configuration.
    ///
    /// The variant is fixed once the chip exists, so a region from the other
    /// band or an operating frequency the part cannot tune to is rejected.
    pub fn validate_for_band(&self, band: Band) -> Result<(), ConfigError> {
        self.validate()?;
        if Band::for_base_frequency(self.base_frequency_mhz()) != band {
            return Err(ConfigError::RegionOutOfBand {
                region: self.region,
                band,
            });
        }
        if !band.frequency_range().contains(&self.frequency_mhz) {
            return Err(ConfigError::FrequencyOutOfBand {
                frequency_mhz: self.frequency_mhz,
                band,
            });
        }
        Ok(())
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::for_region(Region::default())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Frequency is not a positive finite value.
    InvalidFrequency(f32),
    /// Bandwidth is not one the modem supports.
    InvalidBandwidth(f32),
    /// Spreading factor outside 6-12.
    InvalidSpreadingFactor(u8),
    /// Coding rate denominator outside 5-8.
    InvalidCodingRate(u8),
    /// Requested power below the PA_BOOST minimum.
    PowerTooLow(i8),
    /// Current limit neither 0 nor within 45-240 mA.
    InvalidCurrentLimit(u8),
    /// Preamble too short to lock on to.
    InvalidPreambleLength(u16),
    /// Channel number outside the region's plan.
    InvalidChannel { channel: u8, max: u8 },
    /// Region's base frequency selects the other chip variant.
    RegionOutOfBand { region: Region, band: Band },
    /// Operating frequency the fitted part cannot tune to.
    FrequencyOutOfBand { frequency_mhz: f32, band: Band },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFrequency(mhz) => write!(f, "invalid frequency: {} MHz", mhz),
            Self::InvalidBandwidth(khz) => write!(f, "unsupported bandwidth: {} kHz", khz),
            Self::InvalidSpreadingFactor(sf) => {
                write!(f, "spreading factor must be 6-12, got {}", sf)
            }
            Self::InvalidCodingRate(cr) => write!(f, "coding rate must be 5-8, got {}", cr),
            Self::PowerTooLow(dbm) => write!(
                f,
                "power {} dBm below minimum of {} dBm",
                dbm, MIN_POWER_DBM
            ),
            Self::InvalidCurrentLimit(ma) => {
                write!(f, "current limit must be 0 or 45-240 mA, got {}", ma)
            }
            Self::InvalidPreambleLength(len) => write!(
                f,
                "preamble must be at least {} symbols, got {}",
                MIN_PREAMBLE_LENGTH, len
            ),
            Self::InvalidChannel { channel, max } => {
                write!(f, "channel {} out of range (max {})", channel, max)
            }
            Self::RegionOutOfBand { region, band } => write!(
                f,
                "region {:?} is not served by the fitted {}",
                region,
                band.part_name()
            ),
            Self::FrequencyOutOfBand {
                frequency_mhz,
                band,
            } => write!(
                f,
                "{} MHz is outside the {} range",
                frequency_mhz,
                band.part_name()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
