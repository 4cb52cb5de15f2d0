//! A scripted in-memory backend for unit tests.
//!
//! Packets carry interleaved little-endian `i16` samples; the decoder hands them back as
//! interleaved `S16` frames. Every handle the backend creates is recorded in a shared [`Ledger`]
//! so tests can assert on leaks, release order, seeks and decode calls.

use std::sync::{Arc, Mutex};

use crate::backend::MediaBackend;
use crate::decode::{DecodeStep, Decoder, Frame, FrameData};
use crate::demux::{Demuxer, PROBE_SCORE_MAX, Packet, StreamInfo, StreamKind};
use crate::encode::{Encoder, PcmCodec};
use crate::format::{ChannelLayout, SampleFormat, TimeBase};
use crate::opts::OpenOpts;
use crate::resample::{Resampler, ResamplerConfig};
use crate::source::Source;
use crate::{Error, Result};

#[derive(Default)]
struct LedgerState {
    live: usize,
    releases: Vec<&'static str>,
    seeks: Vec<(u64, bool)>,
    reads: Vec<u64>,
    decode_calls: usize,
    drain_calls: usize,
}

#[derive(Clone, Default)]
pub(crate) struct Ledger(Arc<Mutex<LedgerState>>);

impl Ledger {
    fn with<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn acquire(&self) {
        self.with(|s| s.live += 1);
    }

    fn release(&self, what: &'static str) {
        self.with(|s| {
            s.live -= 1;
            s.releases.push(what);
        });
    }

    pub(crate) fn live(&self) -> usize {
        self.with(|s| s.live)
    }

    pub(crate) fn releases(&self) -> Vec<&'static str> {
        self.with(|s| s.releases.clone())
    }

    pub(crate) fn seeks(&self) -> Vec<(u64, bool)> {
        self.with(|s| s.seeks.clone())
    }

    pub(crate) fn last_read_ts(&self) -> Option<u64> {
        self.with(|s| s.reads.last().copied())
    }

    pub(crate) fn decode_calls(&self) -> usize {
        self.with(|s| s.decode_calls)
    }

    /// Resampler calls without input, i.e. end-of-input drains.
    pub(crate) fn drain_calls(&self) -> usize {
        self.with(|s| s.drain_calls)
    }
}

/// Releases its ledger slot on drop.
struct Handle {
    ledger: Ledger,
    what: &'static str,
}

impl Handle {
    fn new(ledger: &Ledger, what: &'static str) -> Self {
        ledger.acquire();
        Self {
            ledger: ledger.clone(),
            what,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.ledger.release(self.what);
    }
}

#[derive(Clone)]
struct Script {
    probe_score: u32,
    streams: Vec<StreamInfo>,
    packets: Vec<Packet>,
    access_unit_bytes: Option<usize>,
    corrupt_ts: Vec<u64>,
    failing_decode_call: Option<usize>,
    seekable: bool,
    priming_encoder: bool,
    resampler_delay: usize,
}

#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    script: Script,
    ledger: Ledger,
}

impl ScriptedBackend {
    pub(crate) fn new(streams: Vec<StreamInfo>, packets: Vec<Packet>) -> Self {
        Self {
            script: Script {
                probe_score: PROBE_SCORE_MAX,
                streams,
                packets,
                access_unit_bytes: None,
                corrupt_ts: Vec::new(),
                failing_decode_call: None,
                seekable: true,
                priming_encoder: false,
                resampler_delay: 0,
            },
            ledger: Ledger::default(),
        }
    }

    pub(crate) fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    pub(crate) fn with_probe_score(mut self, score: u32) -> Self {
        self.script.probe_score = score;
        self
    }

    /// Decode packets in slices of `bytes` instead of whole.
    pub(crate) fn with_access_unit_bytes(mut self, bytes: usize) -> Self {
        self.script.access_unit_bytes = Some(bytes);
        self
    }

    /// Packets with these timestamps fail to decode.
    pub(crate) fn with_corrupt_ts(mut self, ts: &[u64]) -> Self {
        self.script.corrupt_ts = ts.to_vec();
        self
    }

    /// The `call`-th decode call (1-based, counted across packets) fails.
    pub(crate) fn with_failing_decode_call(mut self, call: usize) -> Self {
        self.script.failing_decode_call = Some(call);
        self
    }

    pub(crate) fn with_seekable(mut self, seekable: bool) -> Self {
        self.script.seekable = seekable;
        self
    }

    /// Encoders return nothing for their first call, like a codec filling its first block.
    pub(crate) fn with_priming_encoder(mut self) -> Self {
        self.script.priming_encoder = true;
        self
    }

    /// Resamplers report `frames` more delay than they hold.
    pub(crate) fn with_resampler_delay(mut self, frames: usize) -> Self {
        self.script.resampler_delay = frames;
        self
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_input(&self, _source: Source, _opts: &OpenOpts) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(ScriptedDemuxer {
            script: self.script.clone(),
            ledger: self.ledger.clone(),
            next: 0,
            _handle: Handle::new(&self.ledger, "demuxer"),
        }))
    }

    fn new_resampler(&self, config: &ResamplerConfig) -> Result<Box<dyn Resampler>> {
        let inner = crate::resample::DefaultResampler::new(config)?;
        Ok(Box::new(TrackedResampler {
            inner,
            extra_delay: self.script.resampler_delay,
            ledger: self.ledger.clone(),
            _handle: Handle::new(&self.ledger, "resampler"),
        }))
    }

    fn new_encoder(&self, codec: PcmCodec, config: &ResamplerConfig) -> Result<Box<dyn Encoder>> {
        let inner = crate::encode::PcmEncoder::new(codec, config.out_format, config.out_channels)?;
        Ok(Box::new(TrackedEncoder {
            inner,
            priming: self.script.priming_encoder,
            _handle: Handle::new(&self.ledger, "encoder"),
        }))
    }
}

struct ScriptedDemuxer {
    script: Script,
    ledger: Ledger,
    next: usize,
    _handle: Handle,
}

impl Demuxer for ScriptedDemuxer {
    fn probe_score(&self) -> u32 {
        self.script.probe_score
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.script.streams
    }

    fn duration_micros(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        self.script.seekable
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let packet = self.script.packets.get(self.next).cloned();
        if let Some(p) = &packet {
            self.next += 1;
            self.ledger.with(|s| s.reads.push(p.ts));
        }
        Ok(packet)
    }

    fn seek(&mut self, stream_index: usize, ts: u64, backward: bool) -> Result<u64> {
        self.ledger.with(|s| s.seeks.push((ts, backward)));
        if !self.script.seekable {
            return Err(Error::io("scripted source is not seekable"));
        }

        let landing = self
            .script
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream_index == stream_index && p.ts <= ts)
            .last()
            .map_or((0, 0), |(i, p)| (i, p.ts));
        self.next = landing.0;
        Ok(landing.1)
    }

    fn open_decoder(&self, stream_index: usize) -> Result<Box<dyn Decoder>> {
        let stream = &self.script.streams[stream_index];
        Ok(Box::new(ScriptedDecoder {
            channels: stream.channels as usize,
            sample_rate: stream.sample_rate,
            access_unit_bytes: self.script.access_unit_bytes,
            corrupt_ts: self.script.corrupt_ts.clone(),
            failing_call: self.script.failing_decode_call,
            ledger: self.ledger.clone(),
            _handle: Handle::new(&self.ledger, "decoder"),
        }))
    }
}

struct ScriptedDecoder {
    channels: usize,
    sample_rate: u32,
    access_unit_bytes: Option<usize>,
    corrupt_ts: Vec<u64>,
    failing_call: Option<usize>,
    ledger: Ledger,
    _handle: Handle,
}

impl Decoder for ScriptedDecoder {
    fn decode(&mut self, packet: &Packet, data: &[u8]) -> Result<DecodeStep> {
        let call = self.ledger.with(|s| {
            s.decode_calls += 1;
            s.decode_calls
        });
        if self.failing_call == Some(call) {
            return Err(Error::Decode(format!("scripted failure on decode call {call}")));
        }
        if self.corrupt_ts.contains(&packet.ts) {
            return Err(Error::Decode(format!("scripted corruption at ts {}", packet.ts)));
        }

        let consumed = self.access_unit_bytes.unwrap_or(data.len()).min(data.len());
        let samples: Vec<i16> = data[..consumed]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let frames = samples.len() / self.channels;

        let frame = (frames > 0).then(|| Frame {
            data: FrameData::S16(samples),
            planar: false,
            channels: self.channels,
            frames,
            sample_rate: self.sample_rate,
        });
        Ok(DecodeStep { consumed, frame })
    }

    fn reset(&mut self) {}
}

struct TrackedResampler<T> {
    inner: T,
    extra_delay: usize,
    ledger: Ledger,
    _handle: Handle,
}

impl<T: Resampler> Resampler for TrackedResampler<T> {
    fn config(&self) -> &ResamplerConfig {
        self.inner.config()
    }

    fn delay(&self) -> usize {
        self.inner.delay() + self.extra_delay
    }

    fn convert(
        &mut self,
        input: Option<&Frame>,
        max_out_frames: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        if input.is_none() {
            self.ledger.with(|s| s.drain_calls += 1);
        }
        self.inner.convert(input, max_out_frames, out)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

struct TrackedEncoder<T> {
    inner: T,
    priming: bool,
    _handle: Handle,
}

impl<T: Encoder> Encoder for TrackedEncoder<T> {
    fn codec(&self) -> PcmCodec {
        self.inner.codec()
    }

    fn encode(&mut self, input: &[u8], frames: usize) -> Result<Vec<u8>> {
        if self.priming {
            self.priming = false;
            return Ok(Vec::new());
        }
        self.inner.encode(input, frames)
    }
}

/// A PCM audio stream description with `bits` coded bits per sample.
pub(crate) fn pcm_stream(index: usize, channels: u32, sample_rate: u32, bits: u32) -> StreamInfo {
    let sample_format = if bits > 16 {
        SampleFormat::S32
    } else {
        SampleFormat::S16
    };
    StreamInfo {
        index,
        kind: StreamKind::Audio,
        codec: format!("pcm_s{bits}le"),
        codec_tag: None,
        sample_format,
        sample_rate,
        channels,
        channel_layout: ChannelLayout::default_for(channels).unwrap_or_default(),
        bits_per_coded_sample: Some(bits),
        bits_per_raw_sample: Some(bits),
        big_endian: false,
        is_pcm: true,
        time_base: TimeBase::new(1, sample_rate),
        frame_count: None,
        samples_per_frame: None,
        bit_rate: Some(sample_rate as u64 * bits as u64 * channels as u64),
    }
}

/// A packet of interleaved `i16` samples lasting one tick per frame.
pub(crate) fn pcm_packet(
    stream_index: usize,
    ts: u64,
    channels: usize,
    samples: &[i16],
) -> Packet {
    Packet {
        stream_index,
        ts,
        duration: (samples.len() / channels) as u64,
        data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}
