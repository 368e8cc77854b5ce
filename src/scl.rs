/// Sentinel-2 Scene Classification Layer (SCL) classes and pixel masks.
///
/// Every image is masked twice, in `MASK_SEQUENCE` order: first cloud,
/// cloud-shadow and snow pixels are dropped, then everything that is not
/// water is dropped. Each mask only narrows the surviving set, so the
/// result is their logical AND: non-cloudy water pixels.

use std::fmt;

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SclClass {
    NoData = 0,
    SaturatedOrDefective = 1,
    DarkAreaPixels = 2,
    CloudShadows = 3,
    Vegetation = 4,
    NotVegetated = 5,
    Water = 6,
    Unclassified = 7,
    CloudMediumProbability = 8,
    CloudHighProbability = 9,
    ThinCirrus = 10,
    Snow = 11,
}

impl SclClass {
    pub const ALL: [SclClass; 12] = [
        SclClass::NoData,
        SclClass::SaturatedOrDefective,
        SclClass::DarkAreaPixels,
        SclClass::CloudShadows,
        SclClass::Vegetation,
        SclClass::NotVegetated,
        SclClass::Water,
        SclClass::Unclassified,
        SclClass::CloudMediumProbability,
        SclClass::CloudHighProbability,
        SclClass::ThinCirrus,
        SclClass::Snow,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    /// Maps a raw SCL pixel value to its class. Non-integral or
    /// out-of-range values have no class.
    pub fn from_value(value: f64) -> Option<SclClass> {
        if value.fract() != 0.0 || !(0.0..=11.0).contains(&value) {
            return None;
        }
        SclClass::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for SclClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SclClass::NoData => "no data",
            SclClass::SaturatedOrDefective => "saturated/defective",
            SclClass::DarkAreaPixels => "dark area",
            SclClass::CloudShadows => "cloud shadow",
            SclClass::Vegetation => "vegetation",
            SclClass::NotVegetated => "not vegetated",
            SclClass::Water => "water",
            SclClass::Unclassified => "unclassified",
            SclClass::CloudMediumProbability => "cloud medium probability",
            SclClass::CloudHighProbability => "cloud high probability",
            SclClass::ThinCirrus => "thin cirrus",
            SclClass::Snow => "snow",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------------------------------------------------------
// Masks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    /// Pixels of the listed classes are removed.
    Exclude,
    /// Only pixels of the listed classes survive.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SclMask {
    pub name: &'static str,
    pub mode: MaskMode,
    pub classes: &'static [SclClass],
}

impl SclMask {
    pub fn cloud_shadow_snow() -> Self {
        SclMask {
            name: "cloud_shadow_snow",
            mode: MaskMode::Exclude,
            classes: &[
                SclClass::CloudMediumProbability,
                SclClass::CloudHighProbability,
                SclClass::ThinCirrus,
                SclClass::CloudShadows,
                SclClass::Snow,
            ],
        }
    }

    pub fn water() -> Self {
        SclMask {
            name: "water",
            mode: MaskMode::Keep,
            classes: &[SclClass::Water],
        }
    }

    /// Whether a pixel with the given SCL value survives this mask.
    /// Pixels without a valid SCL value never match a class.
    pub fn keeps(&self, scl_value: Option<f64>) -> bool {
        let matched = scl_value
            .and_then(SclClass::from_value)
            .is_some_and(|class| self.classes.contains(&class));
        match self.mode {
            MaskMode::Exclude => !matched && scl_value.is_some(),
            MaskMode::Keep => matched,
        }
    }

    pub fn class_values(&self) -> Vec<u8> {
        self.classes.iter().map(|c| c.value()).collect()
    }
}

/// Masks applied to every image, in order.
pub fn mask_sequence() -> [SclMask; 2] {
    [SclMask::cloud_shadow_snow(), SclMask::water()]
}
