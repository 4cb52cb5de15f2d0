// src/decode.rs

//! Decoded audio and the decoder seam.
//!
//! A decoder is fed the remaining bytes of a packet and reports how many it consumed, so one
//! packet may carry several access units. Per-packet failures are reported as
//! [`crate::Error::Decode`]; the pump logs and skips them instead of aborting the stream.

use crate::Result;
use crate::demux::Packet;
use crate::format::SampleFormat;

/// Decoded samples, typed by container.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// A block of decoded audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: FrameData,
    /// `true` when `data` holds each channel contiguously, `false` for interleaved samples.
    pub planar: bool,
    pub channels: usize,
    pub frames: usize,
    pub sample_rate: u32,
}

impl Frame {
    pub fn format(&self) -> SampleFormat {
        match self.data {
            FrameData::U8(_) => SampleFormat::U8,
            FrameData::S16(_) => SampleFormat::S16,
            FrameData::S32(_) => SampleFormat::S32,
            FrameData::F32(_) => SampleFormat::F32,
            FrameData::F64(_) => SampleFormat::F64,
        }
    }

    /// Sample `frame` of `channel`, normalized to `[-1.0, 1.0)`.
    pub fn sample(&self, channel: usize, frame: usize) -> f64 {
        let i = if self.planar {
            channel * self.frames + frame
        } else {
            frame * self.channels + channel
        };

        match &self.data {
            FrameData::U8(v) => (v[i] as f64 - 128.0) / 128.0,
            FrameData::S16(v) => v[i] as f64 / 32_768.0,
            FrameData::S32(v) => v[i] as f64 / 2_147_483_648.0,
            FrameData::F32(v) => v[i] as f64,
            FrameData::F64(v) => v[i],
        }
    }
}

/// Outcome of one decode call.
#[derive(Debug)]
pub struct DecodeStep {
    /// Bytes of the packet window the decoder used.
    pub consumed: usize,
    /// The decoded frame, if this call completed one.
    pub frame: Option<Frame>,
}

pub trait Decoder: Send {
    /// Decode from `data`, the not-yet-consumed tail of `packet`.
    fn decode(&mut self, packet: &Packet, data: &[u8]) -> Result<DecodeStep>;

    /// Drop all internal state, e.g. after a seek.
    fn reset(&mut self);
}
