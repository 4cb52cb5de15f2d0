// src/backends/symphonia/demux.rs

//! Container probing and packet iteration with Symphonia.
//!
//! Responsibilities:
//! - Probe a `MediaSource` and describe every track as a [`StreamInfo`]
//! - Read packets, treating IO errors as end-of-stream
//! - Seek accurately by timestamp

use std::io::ErrorKind;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::SampleFormat as SymphoniaSampleFormat;
use tracing::{debug, trace, warn};

use super::decode::SymphoniaDecoder;
use super::{codec_name, is_big_endian_pcm, is_pcm};
use crate::decode::Decoder;
use crate::demux::{Demuxer, PROBE_SCORE_MAX, Packet, StreamInfo, StreamKind};
use crate::format::{ChannelLayout, SampleFormat, TimeBase};
use crate::source::ReadFault;
use crate::{Error, Result};

pub struct SymphoniaDemuxer {
    reader: Box<dyn FormatReader>,
    tracks: Vec<Track>,
    streams: Vec<StreamInfo>,
    seekable: bool,
    duration_micros: Option<u64>,
    fault: Option<ReadFault>,
}

impl SymphoniaDemuxer {
    /// Probe the container.
    ///
    /// `hint_extension` can improve probe accuracy for ambiguous/unseekable inputs
    /// (e.g. "mp4", "ts", "webm", "mkv", "ogg").
    ///
    /// `fault` reports failures of a callback source ahead of Symphonia's own classification.
    pub(crate) fn probe(
        source: Box<dyn MediaSource>,
        hint_extension: Option<&str>,
        fault: Option<ReadFault>,
    ) -> Result<Self> {
        let seekable = source.is_seekable();
        let mss_opts = MediaSourceStreamOptions {
            // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
            buffer_len: 256 * 1024,
        };
        let mss = MediaSourceStream::new(source, mss_opts);

        let mut hint = Hint::new();
        if let Some(ext) = hint_extension {
            hint.with_extension(ext);
        }

        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| source_fault(fault.as_ref()).unwrap_or_else(|| probe_error(e)))?;

        let reader = probed.format;
        let tracks = reader.tracks().to_vec();
        let streams: Vec<StreamInfo> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| stream_info(index, track))
            .collect();

        let duration_micros = tracks
            .iter()
            .zip(&streams)
            .find(|(_, s)| s.is_audio())
            .and_then(|(track, stream)| {
                track
                    .codec_params
                    .n_frames
                    .map(|n| stream.time_base.to_micros(n))
            });

        debug!(
            tracks = tracks.len(),
            seekable,
            ?duration_micros,
            "probed container"
        );

        Ok(Self {
            reader,
            tracks,
            streams,
            seekable,
            duration_micros,
            fault,
        })
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn probe_score(&self) -> u32 {
        PROBE_SCORE_MAX
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn duration_micros(&self) -> Option<u64> {
        self.duration_micros
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,

                // Treat IO errors as graceful end-of-stream, unless the host callback failed.
                Err(SymphoniaError::IoError(e)) => {
                    if let Some(err) = source_fault(self.fault.as_ref()) {
                        warn!(error = %err, "read callback failed");
                        return Err(err);
                    }
                    trace!(error = %e, "end of input");
                    return Ok(None);
                }

                Err(SymphoniaError::DecodeError(reason)) => {
                    warn!(%reason, "malformed container data; ending stream");
                    return Ok(None);
                }

                Err(SymphoniaError::ResetRequired) => {
                    return Err(Error::unsupported(
                        "track layout changed mid-stream; the source must be reopened",
                    ));
                }

                Err(e) => return Err(Error::io(format!("failed reading packet: {e}"))),
            };

            let Some(stream_index) = self.tracks.iter().position(|t| t.id == packet.track_id())
            else {
                trace!(track = packet.track_id(), "packet for unknown track");
                continue;
            };

            return Ok(Some(Packet {
                stream_index,
                ts: packet.ts(),
                duration: packet.dur(),
                data: packet.buf().to_vec(),
            }));
        }
    }

    /// Symphonia always lands on the nearest position at or before `ts`, so `backward` needs
    /// no special handling.
    fn seek(&mut self, stream_index: usize, ts: u64, _backward: bool) -> Result<u64> {
        if !self.seekable {
            return Err(Error::io("source is not seekable"));
        }
        let track_id = self
            .tracks
            .get(stream_index)
            .map(|t| t.id)
            .ok_or_else(|| Error::io(format!("no stream {stream_index} to seek in")))?;

        let seeked = self
            .reader
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts, track_id })
            .map_err(|e| match e {
                SymphoniaError::IoError(e) => Error::io_with("seek failed", e),
                other => Error::io(format!("seek failed: {other}")),
            })?;

        trace!(required = seeked.required_ts, actual = seeked.actual_ts, "seeked");
        Ok(seeked.actual_ts)
    }

    fn open_decoder(&self, stream_index: usize) -> Result<Box<dyn Decoder>> {
        let track = self
            .tracks
            .get(stream_index)
            .ok_or_else(|| Error::unsupported(format!("no stream {stream_index}")))?;
        Ok(Box::new(SymphoniaDecoder::new(track)?))
    }
}

fn source_fault(fault: Option<&ReadFault>) -> Option<Error> {
    fault.and_then(ReadFault::error)
}

fn probe_error(err: SymphoniaError) -> Error {
    match err {
        SymphoniaError::IoError(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Error::unsupported("input ended before a container format was recognized")
        }
        SymphoniaError::IoError(e) => Error::io_with("failed to read source while probing", e),
        other => Error::unsupported(format!("no suitable container format: {other}")),
    }
}

fn stream_info(index: usize, track: &Track) -> StreamInfo {
    let params = &track.codec_params;
    let codec = codec_name(params.codec);
    let pcm = is_pcm(&codec);

    let kind = if params.codec != CODEC_TYPE_NULL && params.sample_rate.is_some() {
        StreamKind::Audio
    } else {
        StreamKind::Other
    };

    let sample_rate = params.sample_rate.unwrap_or(0);
    let (channels, channel_layout) = match params.channels {
        Some(c) => (c.count() as u32, ChannelLayout::from_bits(c.bits() as u64)),
        // Some codecs only learn their layout from the first packet.
        None => (2, ChannelLayout::STEREO),
    };

    let time_base = match params.time_base {
        Some(tb) => TimeBase::new(tb.numer, tb.denom),
        None if sample_rate > 0 => TimeBase::new(1, sample_rate),
        None => TimeBase::MICROS,
    };

    let bits_per_coded_sample = params.bits_per_coded_sample.or(params.bits_per_sample);
    let sample_format = match params.sample_format {
        Some(format) => container_for(format),
        None => params
            .bits_per_sample
            .map_or(SampleFormat::F32, |bits| SampleFormat::for_bits(bits, false)),
    };

    StreamInfo {
        index,
        kind,
        big_endian: is_big_endian_pcm(&codec),
        codec,
        codec_tag: None,
        sample_format,
        sample_rate,
        channels,
        channel_layout,
        bits_per_coded_sample,
        bits_per_raw_sample: params.bits_per_sample,
        is_pcm: pcm,
        time_base,
        frame_count: if pcm { params.n_frames } else { None },
        samples_per_frame: if pcm {
            None
        } else {
            params.max_frames_per_packet.map(|n| n as u32)
        },
        bit_rate: match (pcm, bits_per_coded_sample) {
            (true, Some(bits)) => Some(sample_rate as u64 * bits as u64 * channels as u64),
            _ => None,
        },
    }
}

/// The container the decoder's output lands in after copying.
fn container_for(format: SymphoniaSampleFormat) -> SampleFormat {
    match format {
        SymphoniaSampleFormat::U8 => SampleFormat::U8,
        SymphoniaSampleFormat::S8 | SymphoniaSampleFormat::U16 | SymphoniaSampleFormat::S16 => {
            SampleFormat::S16
        }
        SymphoniaSampleFormat::U24
        | SymphoniaSampleFormat::S24
        | SymphoniaSampleFormat::U32
        | SymphoniaSampleFormat::S32 => SampleFormat::S32,
        SymphoniaSampleFormat::F32 => SampleFormat::F32,
        SymphoniaSampleFormat::F64 => SampleFormat::F64,
    }
}
