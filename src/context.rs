//! Per-source decoding state and its lifecycle.
//!
//! A `StreamContext` owns every handle of one open source: demuxer, decoder, resampler and the
//! optional PCM encoder, plus the pending packet and the progress counters. It is created by
//! [`StreamContext::open`], reconfigured with [`StreamContext::configure_output_format`],
//! driven by [`StreamContext::fill`] and torn down by [`StreamContext::close`] (or on drop).
//!
//! Teardown releases encoder, decoder, resampler and demuxer in that order, exactly once, no
//! matter how far `open` got.

use tracing::{debug, warn};

use crate::backend::MediaBackend;
use crate::backends::symphonia::SymphoniaBackend;
use crate::decode::Decoder;
use crate::demux::{Demuxer, PacketCursor, StreamInfo};
use crate::encode::{Encoder, find_encoder};
use crate::format::{ChannelLayout, Encoding, SampleFormat, TargetFormat};
use crate::opts::OpenOpts;
use crate::resample::{Dither, Resampler, ResamplerConfig};
use crate::source::Source;
use crate::{Error, Result};

pub struct StreamContext<B: MediaBackend = SymphoniaBackend> {
    pub(crate) backend: B,
    pub(crate) opts: OpenOpts,

    pub(crate) demuxer: Option<Box<dyn Demuxer>>,
    pub(crate) stream_index: usize,
    pub(crate) stream: StreamInfo,
    pub(crate) decoder: Option<Box<dyn Decoder>>,
    pub(crate) resampler: Option<Box<dyn Resampler>>,
    pub(crate) config: ResamplerConfig,
    pub(crate) encoder: Option<Box<dyn Encoder>>,

    pub(crate) pending: Option<PacketCursor>,
    pub(crate) scratch: Vec<u8>,

    pub(crate) decoded_samples: u64,
    pub(crate) resampled_bytes: u64,
    pub(crate) timestamp: u64,
    pub(crate) sink_capacity: usize,

    // A frame was decoded since the last drain, so the resampler may hold delayed output.
    pub(crate) got_frame: bool,
    pub(crate) consecutive_decode_failures: usize,
}

impl StreamContext<SymphoniaBackend> {
    /// Open `source` with the built-in Symphonia backend.
    pub fn open_default(source: Source, opts: &OpenOpts) -> Result<Self> {
        Self::open(SymphoniaBackend::default(), source, opts)
    }
}

impl<B: MediaBackend> StreamContext<B> {
    /// Open `source`, select an audio stream and prepare a pass-through pipeline.
    ///
    /// Errors:
    /// - `NotFound` / `Io` from the backend when the source cannot be read
    /// - `Unsupported` when the probe score is below `opts.min_probe_score`, no audio stream
    ///   exists, the stream is rights-managed or no decoder is available
    /// - `IndexOutOfRange` when `opts.stream_index` exceeds the number of audio streams
    pub fn open(backend: B, source: Source, opts: &OpenOpts) -> Result<Self> {
        debug!(?source, "opening audio source");
        let demuxer = backend.open_input(source, opts)?;

        let score = demuxer.probe_score();
        if score < opts.min_probe_score {
            return Err(Error::unsupported(format!(
                "container probe score {score} below minimum {}",
                opts.min_probe_score
            )));
        }

        let stream_index = select_audio_stream(demuxer.as_ref(), opts.stream_index)?;
        let stream = demuxer.streams()[stream_index].clone();
        if stream.is_drm_protected() {
            return Err(Error::unsupported("audio stream is DRM-protected"));
        }

        let config = ResamplerConfig::passthrough(&stream);
        let mut ctx = Self {
            backend,
            opts: opts.clone(),
            demuxer: Some(demuxer),
            stream_index,
            stream,
            decoder: None,
            resampler: None,
            config,
            encoder: None,
            pending: None,
            scratch: Vec::new(),
            decoded_samples: 0,
            resampled_bytes: 0,
            timestamp: 0,
            sink_capacity: 0,
            got_frame: false,
            consecutive_decode_failures: 0,
        };

        // From here on an early return drops `ctx`, which closes whatever was built.
        let decoder = ctx.demuxer()?.open_decoder(stream_index)?;
        ctx.decoder = Some(decoder);
        ctx.resampler = Some(ctx.backend.new_resampler(&ctx.config)?);

        if ctx.stream.bits_per_coded_sample == Some(24) {
            let codec = find_encoder(ctx.config.out_format, 24, ctx.stream.big_endian, true);
            debug!(codec = %codec.name(), "source is 24-bit; packing output samples");
            ctx.encoder = Some(ctx.backend.new_encoder(codec, &ctx.config)?);
        }

        debug!(
            stream = stream_index,
            codec = %ctx.stream.codec,
            rate = ctx.stream.sample_rate,
            channels = ctx.stream.channels,
            "audio stream ready"
        );
        Ok(ctx)
    }

    /// Rebuild the resampler (and encoder) so `fill` produces `target`.
    ///
    /// The old encoder and resampler are released before their replacements are built. On error
    /// the context has no resampler and `fill` fails until a later call succeeds.
    pub fn configure_output_format(&mut self, target: &TargetFormat) -> Result<()> {
        if !(target.sample_rate.is_finite() && target.sample_rate >= 1.0) {
            return Err(Error::unsupported(format!(
                "invalid target sample rate {}",
                target.sample_rate
            )));
        }

        let out_format = SampleFormat::for_bits(target.bits, target.encoding.is_float());
        let (out_channels, out_layout) = resolve_layout(&self.stream, target.channels);

        let (dither, output_sample_bits) = match self.stream.bits_per_coded_sample {
            Some(source_bits) if source_bits > target.bits => (Dither::Triangular, target.bits),
            _ => (Dither::None, 0),
        };

        let config = ResamplerConfig {
            in_format: self.stream.sample_format,
            in_channels: self.stream.channels as usize,
            in_layout: self.stream.channel_layout,
            in_rate: self.stream.sample_rate,
            out_format,
            out_channels: out_channels as usize,
            out_layout,
            out_rate: target.sample_rate.round() as u32,
            dither,
            output_sample_bits,
        };
        debug!(?config, "reconfiguring output format");

        self.encoder = None;
        self.resampler = None;
        self.config = config;
        self.resampler = Some(self.backend.new_resampler(&self.config)?);

        let codec = find_encoder(
            out_format,
            target.bits,
            target.big_endian,
            target.encoding != Encoding::PcmUnsigned,
        );
        if !codec.is_plain_copy_of(out_format) {
            debug!(codec = %codec.name(), "output needs re-encoding");
            self.encoder = Some(self.backend.new_encoder(codec, &self.config)?);
        }
        Ok(())
    }

    /// Reposition to `micros` microseconds from the start of the stream.
    ///
    /// Pending packet data and any undrained resampler output are discarded. On failure the
    /// context stays usable at its previous position.
    pub fn seek(&mut self, micros: u64) -> Result<()> {
        let target = self.stream.time_base.from_micros(micros);
        let backward = target < self.timestamp;
        let stream_index = self.stream_index;

        let landed = self
            .demuxer
            .as_mut()
            .ok_or_else(closed)?
            .seek(stream_index, target, backward)
            .map_err(|err| match err {
                Error::Io { .. } => err,
                other => Error::io(format!("failed to seek to {micros}us: {other}")),
            })?;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.pending = None;
        self.got_frame = false;
        self.consecutive_decode_failures = 0;
        self.timestamp = landed;

        debug!(micros, target, landed, backward, "seeked");
        Ok(())
    }

    /// Release every handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.demuxer.is_none() && self.decoder.is_none() && self.resampler.is_none() {
            return;
        }

        drop(self.encoder.take());
        drop(self.decoder.take());
        drop(self.resampler.take());
        drop(self.demuxer.take());
        self.pending = None;
        self.scratch = Vec::new();
        debug!("stream context closed");
    }

    pub fn is_closed(&self) -> bool {
        self.demuxer.is_none()
    }

    pub fn is_seekable(&self) -> bool {
        self.demuxer.as_ref().is_some_and(|d| d.is_seekable())
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream
    }

    pub fn resampler_config(&self) -> &ResamplerConfig {
        &self.config
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    /// Frames decoded so far.
    pub fn decoded_samples(&self) -> u64 {
        self.decoded_samples
    }

    /// Bytes handed to the sink so far.
    pub fn resampled_bytes(&self) -> u64 {
        self.resampled_bytes
    }

    /// Current read position in the stream's time base.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Current read position in microseconds.
    pub fn timestamp_micros(&self) -> u64 {
        self.stream.time_base.to_micros(self.timestamp)
    }

    /// The format `fill` currently produces.
    pub fn output_format(&self) -> TargetFormat {
        let format = self.config.out_format;
        let (bits, big_endian, encoding) = match self.encoder.as_ref().map(|e| e.codec()) {
            Some(codec) => (
                codec.bits,
                codec.big_endian,
                match (codec.float, codec.signed) {
                    (true, _) => Encoding::PcmFloat,
                    (false, true) => Encoding::PcmSigned,
                    (false, false) => Encoding::PcmUnsigned,
                },
            ),
            None => (
                format.bits(),
                false,
                match format {
                    SampleFormat::U8 => Encoding::PcmUnsigned,
                    SampleFormat::F32 | SampleFormat::F64 => Encoding::PcmFloat,
                    SampleFormat::S16 | SampleFormat::S32 => Encoding::PcmSigned,
                },
            ),
        };

        TargetFormat {
            sample_rate: self.config.out_rate as f32,
            bits,
            channels: self.config.out_channels as u32,
            big_endian,
            encoding,
        }
    }

    pub(crate) fn demuxer(&self) -> Result<&dyn Demuxer> {
        self.demuxer.as_deref().ok_or_else(closed)
    }
}

impl<B: MediaBackend> Drop for StreamContext<B> {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn closed() -> Error {
    Error::io("stream context is closed")
}

/// Resolve an audio-stream ordinal to a stream index.
fn select_audio_stream(demuxer: &dyn Demuxer, ordinal: Option<usize>) -> Result<usize> {
    let Some(ordinal) = ordinal else {
        return demuxer
            .best_audio_stream()
            .ok_or_else(|| Error::unsupported("no audio stream found"));
    };

    let audio: Vec<usize> = demuxer
        .streams()
        .iter()
        .filter(|s| s.is_audio())
        .map(|s| s.index)
        .collect();
    audio
        .get(ordinal)
        .copied()
        .ok_or(Error::IndexOutOfRange {
            index: ordinal,
            available: audio.len(),
        })
}

/// Pick the output channel count and layout for a requested channel count.
fn resolve_layout(stream: &StreamInfo, channels: u32) -> (u32, ChannelLayout) {
    if channels == stream.channels && stream.channel_layout.channel_count() == channels {
        return (channels, stream.channel_layout);
    }
    if let Some(layout) = ChannelLayout::default_for(channels) {
        return (channels, layout);
    }
    warn!(channels, "no channel layout for requested channel count; using stereo");
    (2, ChannelLayout::STEREO)
}
