//! The decode → resample → encode chain for one pending packet.
//!
//! A packet may hold several access units; the decoder is called on the same cursor until the
//! payload is used up, and every decoded frame is appended to the sink at a running offset so
//! the whole packet lands in a single chunk.

use tracing::{trace, warn};

use crate::backend::MediaBackend;
use crate::context::{StreamContext, closed};
use crate::decode::Frame;
use crate::encode::Encoder;
use crate::sink::{OutputSink, write_chunk};
use crate::{Error, Result};

/// Upper bound on the frames a resampler emits for `in_frames` input frames.
pub(crate) fn estimate_out_frames(in_frames: usize, in_rate: u32, out_rate: u32) -> usize {
    if in_rate == 0 {
        return in_frames;
    }
    (in_frames as u64 * out_rate as u64).div_ceil(in_rate as u64) as usize
}

impl<B: MediaBackend> StreamContext<B> {
    /// Decode what is left of the pending packet into `sink`.
    ///
    /// Returns the bytes written for this packet. An undecodable packet is logged and dropped;
    /// whatever it produced before the failure is kept.
    pub(crate) fn process_pending(&mut self, sink: &mut dyn OutputSink) -> Result<usize> {
        let mut offset = 0;

        loop {
            let Some(cursor) = self.pending.as_mut() else {
                break;
            };
            if cursor.is_drained() {
                break;
            }

            let decoder = self.decoder.as_mut().ok_or_else(closed)?;
            let step = match decoder.decode(cursor.packet(), cursor.remaining()) {
                Ok(step) => step,
                Err(Error::Decode(reason)) => {
                    warn!(
                        ts = cursor.packet().ts,
                        remaining = cursor.remaining_len(),
                        %reason,
                        "skipping undecodable packet"
                    );
                    cursor.discard();
                    self.note_decode_failure()?;
                    break;
                }
                Err(err) => return Err(err),
            };

            // A decoder that neither consumes nor produces would spin forever.
            if step.consumed == 0 && step.frame.is_none() {
                trace!(ts = cursor.packet().ts, "decoder made no progress; dropping packet rest");
                cursor.discard();
                break;
            }
            cursor.advance(step.consumed);
            self.consecutive_decode_failures = 0;

            let Some(frame) = step.frame else {
                continue;
            };
            self.got_frame = true;
            self.decoded_samples += frame.frames as u64;
            offset += self.resample_and_write(Some(&frame), frame.frames, offset, sink)?;
        }

        if let Some(cursor) = self.pending.take() {
            self.timestamp += cursor.packet().duration;
        }
        Ok(offset)
    }

    /// Drain delayed resampler output into `sink` at offset 0.
    ///
    /// Only runs after a frame was decoded since the last drain. Returns `0` once nothing is left.
    pub(crate) fn flush(&mut self, sink: &mut dyn OutputSink) -> Result<usize> {
        let delay = self.resampler.as_ref().ok_or_else(closed)?.delay();
        if !self.got_frame || delay == 0 {
            self.got_frame = false;
            return Ok(0);
        }

        trace!(delay, "flushing resampler");
        let written = self.resample_and_write(None, 0, 0, sink)?;
        if written == 0 {
            self.got_frame = false;
        }
        Ok(written)
    }

    fn resample_and_write(
        &mut self,
        input: Option<&Frame>,
        in_frames: usize,
        offset: usize,
        sink: &mut dyn OutputSink,
    ) -> Result<usize> {
        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| Error::io("no resampler configured"))?;

        let max_out = estimate_out_frames(
            resampler.delay() + in_frames,
            self.config.in_rate,
            self.config.out_rate,
        );
        self.scratch.clear();
        let frames = resampler
            .convert(input, max_out, &mut self.scratch)
            .map_err(|err| match err {
                Error::Io { .. } => err,
                other => Error::io(format!("resampling failed: {other}")),
            })?;
        if frames == 0 {
            return Ok(0);
        }

        let written = write_chunk(
            sink,
            &mut self.sink_capacity,
            self.encoder.as_mut().map(|e| &mut **e as &mut dyn Encoder),
            offset,
            frames,
            self.config.out_frame_bytes(),
            &self.scratch,
        )?;
        self.resampled_bytes += written as u64;
        Ok(written)
    }

    fn note_decode_failure(&mut self) -> Result<()> {
        self.consecutive_decode_failures += 1;
        match self.opts.max_consecutive_decode_failures {
            Some(max) if self.consecutive_decode_failures >= max => Err(Error::unsupported(format!(
                "{} consecutive packets failed to decode",
                self.consecutive_decode_failures
            ))),
            _ => Ok(()),
        }
    }
}
