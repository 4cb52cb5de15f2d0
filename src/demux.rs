// src/demux.rs

//! Container-level types and the demuxer seam.
//!
//! Responsibilities:
//! - Describe a container's elementary streams (`StreamInfo`)
//! - Carry compressed packets (`Packet`) and a consumption cursor over one (`PacketCursor`)
//! - Define what the pipeline needs from a container reader (`Demuxer`)

use crate::Result;
use crate::decode::Decoder;
use crate::format::{ChannelLayout, SampleFormat, TimeBase};

/// Highest probe confidence a demuxer can report.
pub const PROBE_SCORE_MAX: u32 = 100;

/// Codec tag marking rights-managed (encrypted) AAC streams.
pub const CODEC_TAG_DRMS: u32 = u32::from_le_bytes(*b"drms");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Other,
}

/// Everything the pipeline knows about one elementary stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Position of this stream in [`Demuxer::streams`]; packets refer to it.
    pub index: usize,
    pub kind: StreamKind,
    /// Short codec name (`"pcm_s16le"`, `"flac"`, ...).
    pub codec: String,
    pub codec_tag: Option<u32>,
    /// Container the decoder hands samples out in.
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: ChannelLayout,
    pub bits_per_coded_sample: Option<u32>,
    pub bits_per_raw_sample: Option<u32>,
    pub big_endian: bool,
    pub is_pcm: bool,
    pub time_base: TimeBase,
    /// Number of codec frames in the stream, when the container records it.
    pub frame_count: Option<u64>,
    /// Samples per codec frame for compressed codecs.
    pub samples_per_frame: Option<u32>,
    pub bit_rate: Option<u64>,
}

impl StreamInfo {
    pub fn is_audio(&self) -> bool {
        self.kind == StreamKind::Audio
    }

    pub fn is_drm_protected(&self) -> bool {
        self.codec_tag == Some(CODEC_TAG_DRMS)
    }
}

/// One compressed packet as read from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    /// Presentation timestamp in the stream's time base.
    pub ts: u64,
    /// Duration in the stream's time base.
    pub duration: u64,
    pub data: Vec<u8>,
}

/// A packet together with how much of its payload the decoder has consumed so far.
///
/// The packet bytes are never moved; the cursor only tracks the remaining window.
#[derive(Debug)]
pub struct PacketCursor {
    packet: Packet,
    offset: usize,
}

impl PacketCursor {
    pub fn new(packet: Packet) -> Self {
        Self { packet, offset: 0 }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn remaining(&self) -> &[u8] {
        &self.packet.data[self.offset..]
    }

    pub fn remaining_len(&self) -> usize {
        self.packet.data.len() - self.offset
    }

    /// Mark `consumed` more bytes as decoded, saturating at the end of the payload.
    pub fn advance(&mut self, consumed: usize) {
        self.offset = (self.offset + consumed).min(self.packet.data.len());
    }

    /// Drop whatever is left of the payload.
    pub fn discard(&mut self) {
        self.offset = self.packet.data.len();
    }

    pub fn is_drained(&self) -> bool {
        self.remaining_len() == 0
    }
}

/// A container reader positioned somewhere inside one source.
pub trait Demuxer: Send {
    /// Confidence of the container probe, `0..=PROBE_SCORE_MAX`.
    fn probe_score(&self) -> u32;

    fn streams(&self) -> &[StreamInfo];

    /// The stream a player would pick by default. The first audio stream unless overridden.
    fn best_audio_stream(&self) -> Option<usize> {
        self.streams().iter().find(|s| s.is_audio()).map(|s| s.index)
    }

    /// Container-level duration in microseconds, when known.
    fn duration_micros(&self) -> Option<u64>;

    fn is_seekable(&self) -> bool;

    /// Read the next packet of any stream. `Ok(None)` means end of input.
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// Reposition to `ts` (stream time base) on `stream_index`.
    ///
    /// `backward` asks for the nearest sync point at or before `ts`. Returns the timestamp the
    /// reader actually landed on, which is never after the next packet read.
    fn seek(&mut self, stream_index: usize, ts: u64, backward: bool) -> Result<u64>;

    /// Build a decoder bound to the codec parameters of `stream_index`.
    fn open_decoder(&self, stream_index: usize) -> Result<Box<dyn Decoder>>;
}
