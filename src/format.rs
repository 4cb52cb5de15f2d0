//! Sample formats, channel layouts and the host's requested output format.
//!
//! Responsibilities:
//! - Name the in-memory sample containers the pipeline moves around (`SampleFormat`)
//! - Bucket a requested bit depth onto one of those containers
//! - Parse the host's encoding names (`PCM_SIGNED`, `PCM_UNSIGNED`, `PCM_FLOAT`)
//! - Rescale microseconds into a stream time base

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::{Error, Result};

/// In-memory sample container.
///
/// 24-bit audio travels in `S32` containers (left-justified) until the encoder narrows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Pick the narrowest container able to hold `bits` per sample.
    ///
    /// Depths wider than 64 bits fall back to `F64` with a warning.
    pub fn for_bits(bits: u32, float: bool) -> Self {
        match (bits, float) {
            (0..=8, false) => Self::U8,
            (9..=16, false) => Self::S16,
            (0..=32, true) => Self::F32,
            (17..=32, false) => Self::S32,
            (33..=64, _) => Self::F64,
            _ => {
                warn!(bits, "unsupported output bit depth; falling back to 64-bit float");
                Self::F64
            }
        }
    }
}

/// Channel layout as a speaker bitmask.
///
/// The bit assignment follows the usual WAVE/`WAVEFORMATEXTENSIBLE` speaker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelLayout(u64);

impl ChannelLayout {
    pub const FRONT_LEFT: u64 = 0x1;
    pub const FRONT_RIGHT: u64 = 0x2;
    pub const FRONT_CENTER: u64 = 0x4;

    pub const UNKNOWN: Self = Self(0);
    pub const MONO: Self = Self(Self::FRONT_CENTER);
    pub const STEREO: Self = Self(Self::FRONT_LEFT | Self::FRONT_RIGHT);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn channel_count(self) -> u32 {
        self.0.count_ones()
    }

    /// The default layout for a channel count, if one is defined.
    pub fn default_for(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(Self::MONO),
            2 => Some(Self::STEREO),
            _ => None,
        }
    }
}

/// Sample encoding the host asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Encoding {
    PcmSigned,
    PcmUnsigned,
    PcmFloat,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::PcmSigned => "PCM_SIGNED",
            Self::PcmUnsigned => "PCM_UNSIGNED",
            Self::PcmFloat => "PCM_FLOAT",
        }
    }

    pub fn is_float(self) -> bool {
        self == Self::PcmFloat
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PCM_SIGNED" => Ok(Self::PcmSigned),
            "PCM_UNSIGNED" => Ok(Self::PcmUnsigned),
            "PCM_FLOAT" => Ok(Self::PcmFloat),
            other => Err(Error::unsupported(format!("unknown encoding {other:?}"))),
        }
    }
}

/// The output format a host requests for decoded audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetFormat {
    pub sample_rate: f32,
    pub bits: u32,
    pub channels: u32,
    pub big_endian: bool,
    pub encoding: Encoding,
}

/// Rational time base of a stream's timestamps (`numer / denom` seconds per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub numer: u32,
    pub denom: u32,
}

impl TimeBase {
    pub const MICROS: Self = Self {
        numer: 1,
        denom: 1_000_000,
    };

    pub fn new(numer: u32, denom: u32) -> Self {
        Self { numer, denom }
    }

    /// Convert microseconds into ticks of this time base, rounding to nearest.
    pub fn from_micros(self, micros: u64) -> u64 {
        if self.numer == 0 {
            return 0;
        }
        let num = micros as u128 * self.denom as u128;
        let den = 1_000_000u128 * self.numer as u128;
        ((num + den / 2) / den) as u64
    }

    /// Convert ticks of this time base into microseconds, rounding to nearest.
    pub fn to_micros(self, ticks: u64) -> u64 {
        if self.denom == 0 {
            return 0;
        }
        let num = ticks as u128 * self.numer as u128 * 1_000_000;
        let den = self.denom as u128;
        ((num + den / 2) / den) as u64
    }
}
