// src/backends/symphonia/decode.rs

//! Codec-level decoding with Symphonia.
//!
//! Symphonia decoders consume a whole packet per call, so every successful step reports the full
//! remaining window as consumed. Decoded buffers are copied out as planar samples in the
//! narrowest container that holds the codec's native format.

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{Packet as SymphoniaPacket, Track};

use super::codec_name;
use crate::decode::{DecodeStep, Decoder, Frame, FrameData};
use crate::demux::Packet;
use crate::{Error, Result};

pub struct SymphoniaDecoder {
    inner: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
}

impl SymphoniaDecoder {
    /// Create a decoder for the given track using Symphonia's default codec registry.
    pub fn new(track: &Track) -> Result<Self> {
        let decoder_opts: DecoderOptions = Default::default();

        let inner = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|e| {
                Error::unsupported(format!(
                    "no decoder for {}: {e}",
                    codec_name(track.codec_params.codec)
                ))
            })?;

        Ok(Self {
            inner,
            track_id: track.id,
        })
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&mut self, packet: &Packet, data: &[u8]) -> Result<DecodeStep> {
        let packet =
            SymphoniaPacket::new_from_slice(self.track_id, packet.ts, packet.duration, data);

        // Copy out before handling errors so the decoder's buffer borrow ends here.
        let decoded = match self.inner.decode(&packet) {
            Ok(buf) => Ok(copy_frame(&buf)),
            Err(e) => Err(e),
        };

        match decoded {
            Ok(frame) => Ok(DecodeStep {
                consumed: data.len(),
                frame,
            }),

            // Recoverable: corrupted frame, but decoding can continue.
            Err(SymphoniaError::DecodeError(reason)) => Err(Error::Decode(reason.to_owned())),
            Err(SymphoniaError::IoError(e)) => Err(Error::Decode(e.to_string())),

            Err(SymphoniaError::ResetRequired) => {
                self.inner.reset();
                Err(Error::Decode("decoder reset required".to_owned()))
            }

            // Anything else is considered fatal.
            Err(e) => Err(Error::unsupported(format!("decoder failure: {e}"))),
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

fn copy_frame(decoded: &AudioBufferRef<'_>) -> Option<Frame> {
    let spec = *decoded.spec();
    let frames = decoded.frames();
    if frames == 0 {
        return None;
    }

    let data = match decoded {
        AudioBufferRef::U8(_) => FrameData::U8(copy_planar(decoded, spec, frames)),
        AudioBufferRef::S8(_) | AudioBufferRef::U16(_) | AudioBufferRef::S16(_) => {
            FrameData::S16(copy_planar(decoded, spec, frames))
        }
        AudioBufferRef::U24(_)
        | AudioBufferRef::S24(_)
        | AudioBufferRef::U32(_)
        | AudioBufferRef::S32(_) => FrameData::S32(copy_planar(decoded, spec, frames)),
        AudioBufferRef::F32(_) => FrameData::F32(copy_planar(decoded, spec, frames)),
        AudioBufferRef::F64(_) => FrameData::F64(copy_planar(decoded, spec, frames)),
    };

    Some(Frame {
        data,
        planar: true,
        channels: spec.channels.count(),
        frames,
        sample_rate: spec.rate,
    })
}

fn copy_planar<T: ConvertibleSample>(
    decoded: &AudioBufferRef<'_>,
    spec: SignalSpec,
    frames: usize,
) -> Vec<T> {
    let mut buf = SampleBuffer::<T>::new(frames as u64, spec);
    buf.copy_planar_ref(decoded.clone());
    buf.samples().to_vec()
}
