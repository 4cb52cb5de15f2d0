//! PCM re-encoding of resampler output.
//!
//! Responsibilities:
//! - Choose the PCM codec for a (container, bit depth, byte order, signedness) request
//! - Decide whether that codec is a plain copy of the resampler's output
//! - Narrow, re-sign and byte-swap interleaved samples (`PcmEncoder`)

use crate::format::SampleFormat;
use crate::{Error, Result};

/// A raw PCM codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmCodec {
    /// Bits per encoded sample: 8, 16, 24, 32 or 64.
    pub bits: u32,
    pub signed: bool,
    pub float: bool,
    pub big_endian: bool,
}

impl PcmCodec {
    pub fn bytes_per_sample(self) -> usize {
        (self.bits / 8) as usize
    }

    /// Codec name in the usual `pcm_<type><bits><endianness>` form.
    pub fn name(self) -> String {
        let kind = if self.float {
            'f'
        } else if self.signed {
            's'
        } else {
            'u'
        };
        if self.bits == 8 {
            return format!("pcm_{kind}8");
        }
        let order = if self.big_endian { "be" } else { "le" };
        format!("pcm_{kind}{}{order}", self.bits)
    }

    /// Whether this codec's byte layout equals the resampler's interleaved output in `format`.
    ///
    /// The resampler writes little-endian, signed samples (unsigned for 8-bit) at full container
    /// width; anything else needs an encoder.
    pub fn is_plain_copy_of(self, format: SampleFormat) -> bool {
        if self.bits != format.bits() || self.float != format.is_float() {
            return false;
        }
        match format {
            SampleFormat::U8 => !self.signed,
            SampleFormat::F32 | SampleFormat::F64 => !self.big_endian,
            SampleFormat::S16 | SampleFormat::S32 => self.signed && !self.big_endian,
        }
    }
}

/// Pick the PCM codec for samples held in `format`.
///
/// `bits` only matters for `S32` containers, where 24 selects the packed 3-byte codecs. Byte order
/// is ignored for 8-bit codecs and signedness for float codecs.
pub fn find_encoder(format: SampleFormat, bits: u32, big_endian: bool, signed: bool) -> PcmCodec {
    let (bits, float) = match format {
        SampleFormat::U8 => (8, false),
        SampleFormat::S16 => (16, false),
        SampleFormat::S32 if bits == 24 => (24, false),
        SampleFormat::S32 => (32, false),
        SampleFormat::F32 => (32, true),
        SampleFormat::F64 => (64, true),
    };

    PcmCodec {
        bits,
        signed: signed || float,
        float,
        big_endian: big_endian && bits > 8,
    }
}

/// Turns interleaved resampler output into the host's byte layout.
pub trait Encoder: Send {
    fn codec(&self) -> PcmCodec;

    /// Encode `frames` interleaved frames. May return an empty buffer while it accumulates input.
    fn encode(&mut self, input: &[u8], frames: usize) -> Result<Vec<u8>>;
}

/// Stateless PCM encoder: one output sample per input sample, no buffering.
#[derive(Debug)]
pub struct PcmEncoder {
    codec: PcmCodec,
    container: SampleFormat,
    channels: usize,
}

impl PcmEncoder {
    pub fn new(codec: PcmCodec, container: SampleFormat, channels: usize) -> Result<Self> {
        if codec.float != container.is_float() {
            return Err(Error::unsupported(format!(
                "cannot encode {container:?} samples as {}",
                codec.name()
            )));
        }
        Ok(Self {
            codec,
            container,
            channels,
        })
    }
}

impl Encoder for PcmEncoder {
    fn codec(&self) -> PcmCodec {
        self.codec
    }

    fn encode(&mut self, input: &[u8], frames: usize) -> Result<Vec<u8>> {
        let in_width = self.container.bytes_per_sample();
        let samples = frames * self.channels;
        if input.len() < samples * in_width {
            return Err(Error::io(format!(
                "encoder expected {} bytes, got {}",
                samples * in_width,
                input.len()
            )));
        }

        let mut out = Vec::with_capacity(samples * self.codec.bytes_per_sample());
        for raw in input.chunks_exact(in_width).take(samples) {
            self.encode_sample(raw, &mut out);
        }
        Ok(out)
    }
}

impl PcmEncoder {
    fn encode_sample(&self, raw: &[u8], out: &mut Vec<u8>) {
        let codec = self.codec;
        match self.container {
            SampleFormat::U8 => {
                let v = raw[0];
                out.push(if codec.signed { v ^ 0x80 } else { v });
            }
            SampleFormat::S16 => {
                let mut v = u16::from_le_bytes([raw[0], raw[1]]);
                if !codec.signed {
                    v ^= 0x8000;
                }
                push_ordered(out, &v.to_le_bytes(), codec.big_endian);
            }
            SampleFormat::S32 if codec.bits == 24 => {
                let v = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) >> 8;
                let mut v = v as u32 & 0x00ff_ffff;
                if !codec.signed {
                    v ^= 0x0080_0000;
                }
                push_ordered(out, &v.to_le_bytes()[..3], codec.big_endian);
            }
            SampleFormat::S32 => {
                let mut v = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if !codec.signed {
                    v ^= 0x8000_0000;
                }
                push_ordered(out, &v.to_le_bytes(), codec.big_endian);
            }
            SampleFormat::F32 | SampleFormat::F64 => push_ordered(out, raw, codec.big_endian),
        }
    }
}

fn push_ordered(out: &mut Vec<u8>, le_bytes: &[u8], big_endian: bool) {
    if big_endian {
        out.extend(le_bytes.iter().rev());
    } else {
        out.extend_from_slice(le_bytes);
    }
}
