//! Describe the audio streams of a source without decoding it.
//!
//! Responsibilities:
//! - Open and probe a source through a [`MediaBackend`]
//! - Derive per-stream properties a host needs up front: duration, frame rate, frame length
//!
//! Notes:
//! - VBR is never detected and always reported as `None`.

use serde::Serialize;
use tracing::debug;

use crate::backend::MediaBackend;
use crate::demux::StreamInfo;
use crate::opts::OpenOpts;
use crate::source::Source;
use crate::{Error, Result};

/// Format description of one audio stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFileFormat {
    pub url: Option<String>,
    pub codec: String,
    pub sample_rate: f32,
    /// Bits per sample, when known.
    pub sample_size: Option<u32>,
    pub channels: u32,
    /// Bytes per frame, PCM only.
    pub frame_size: Option<u32>,
    pub frame_rate: Option<f32>,
    pub frame_length: Option<u64>,
    pub big_endian: bool,
    pub duration_micros: Option<u64>,
    pub bit_rate: Option<u64>,
    pub vbr: Option<bool>,
    pub encrypted: bool,
}

/// List every audio stream of `source`.
///
/// Fails `Unsupported` when the container probe score is below `opts.min_probe_score` or there
/// is no audio stream at all.
pub fn probe_formats<B: MediaBackend>(
    backend: &B,
    source: Source,
    opts: &OpenOpts,
) -> Result<Vec<AudioFileFormat>> {
    let url = source.as_url().map(str::to_owned);
    let demuxer = backend.open_input(source, opts)?;

    let score = demuxer.probe_score();
    if score < opts.min_probe_score {
        return Err(Error::unsupported(format!(
            "container probe score {score} below minimum {}",
            opts.min_probe_score
        )));
    }

    let formats: Vec<AudioFileFormat> = demuxer
        .streams()
        .iter()
        .filter(|s| s.is_audio())
        .map(|s| describe_stream(s, demuxer.duration_micros(), url.clone()))
        .collect();

    if formats.is_empty() {
        return Err(Error::unsupported("no audio stream found"));
    }
    debug!(streams = formats.len(), "described audio streams");
    Ok(formats)
}

/// Build the format description of `stream`.
///
/// `container_duration` wins over a duration derived from the stream's frame count.
pub fn describe_stream(
    stream: &StreamInfo,
    container_duration: Option<u64>,
    url: Option<String>,
) -> AudioFileFormat {
    let rate = stream.sample_rate;
    let frame_count = stream.frame_count.filter(|&n| n > 0);
    let samples_per_frame = stream.samples_per_frame.filter(|&n| n > 0);

    let mut duration = container_duration.filter(|&d| d > 0).or_else(|| match frame_count {
        Some(n) if rate > 0 => Some(n * 1_000_000 / rate as u64),
        _ => None,
    });

    let frame_rate = match (frame_count, duration, samples_per_frame) {
        (Some(n), Some(d), _) if d > 0 => Some(n as f32 * 1_000_000.0 / d as f32),
        (_, _, Some(spf)) if rate > 0 => Some(rate as f32 / spf as f32),
        (_, _, None) if stream.is_pcm && rate > 0 => Some(rate as f32),
        _ => None,
    };

    let frame_size = match (stream.is_pcm, stream.bits_per_coded_sample) {
        (true, Some(bits)) => Some(bits / 8 * stream.channels),
        _ => None,
    };

    let frame_length = match (frame_count, duration, samples_per_frame) {
        (Some(n), _, _) => Some(n),
        (None, Some(d), _) if stream.is_pcm && rate > 0 => {
            Some((d as f64 * rate as f64 / 1_000_000.0).round() as u64)
        }
        (None, Some(d), Some(spf)) if rate > 0 => {
            let length = (d as f64 * rate as f64 / spf as f64 / 1_000_000.0).round() as u64;
            // Whole codec frames give a better duration estimate than the container.
            duration = Some((1_000_000.0 * length as f64 * spf as f64 / rate as f64) as u64);
            Some(length)
        }
        _ => None,
    };

    let sample_size = stream
        .bits_per_raw_sample
        .filter(|&b| b > 0)
        .or(stream.bits_per_coded_sample.filter(|&b| b > 0));

    AudioFileFormat {
        url,
        codec: stream.codec.clone(),
        sample_rate: rate as f32,
        sample_size,
        channels: stream.channels,
        frame_size,
        frame_rate,
        frame_length,
        big_endian: stream.big_endian,
        duration_micros: duration,
        bit_rate: stream.bit_rate,
        vbr: None,
        encrypted: stream.is_drm_protected(),
    }
}
