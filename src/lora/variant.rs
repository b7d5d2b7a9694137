//! Chip variant selection.
//!
//! The RFM96 (SX1278) covers the low band and the RFM95 (SX1276) the high
//! band. They share one command set, so the choice is made once from the
//! configured base frequency and never revisited.

use std::ops::RangeInclusive;

/// Base frequencies below this select the low-band part.
pub const BAND_SPLIT_MHZ: f32 = 530.0;

/// Frequency band covered by a chip variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// RFM96 / SX1278
    Low,
    /// RFM95 / SX1276
    High,
}

impl Band {
    /// Band for a configured base frequency. NaN selects the high band.
    pub fn for_base_frequency(mhz: f32) -> Self {
        if mhz < BAND_SPLIT_MHZ {
            Self::Low
        } else {
            Self::High
        }
    }

    /// Frequencies the part can tune to, in MHz.
    pub fn frequency_range(self) -> RangeInclusive<f32> {
        match self {
            Self::Low => 137.0..=525.0,
            Self::High => 862.0..=1020.0,
        }
    }

    /// Module part number.
    pub fn part_name(self) -> &'static str {
        match self {
            Self::Low => "RFM96",
            Self::High => "RFM95",
        }
    }
}

/// The chip handle, tagged with the variant it was built as.
#[derive(Debug)]
pub enum ChipVariant<C> {
    LowBand(C),
    HighBand(C),
}

impl<C> ChipVariant<C> {
    /// Select the variant for `base_mhz` and build its chip with `make`.
    ///
    /// `make` runs exactly once, with the selected band.
    pub fn select(base_mhz: f32, make: impl FnOnce(Band) -> C) -> Self {
        match Band::for_base_frequency(base_mhz) {
            Band::Low => Self::LowBand(make(Band::Low)),
            Band::High => Self::HighBand(make(Band::High)),
        }
    }

    pub fn band(&self) -> Band {
        match self {
            Self::LowBand(_) => Band::Low,
            Self::HighBand(_) => Band::High,
        }
    }

    pub fn chip(&self) -> &C {
        match self {
            Self::LowBand(chip) | Self::HighBand(chip) => chip,
        }
    }

    pub fn chip_mut(&mut self) -> &mut C {
        match self {
            Self::LowBand(chip) | Self::HighBand(chip) => chip,
        }
    }
}
