//! Sample-format, channel and rate conversion between the decoder and the encoder.
//!
//! Responsibilities:
//! - Turn any decoded [`Frame`] into interleaved little-endian samples of the output container
//! - Remap channels (identity, mono fan-out, averaging downmix, modular fold)
//! - Convert sample rate with rubato's sinc interpolator, hiding its startup latency
//! - Apply triangular (TPDF) dither and quantize to the requested effective bit depth
//!
//! Notes:
//! - Same-rate conversion is exact for integer sources: samples round-trip bit for bit.
//! - `convert(None, ..)` drains everything still buffered (end of stream).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rubato::{Resampler as _, SincFixedIn, SincInterpolationParameters, WindowFunction};

use crate::decode::Frame;
use crate::demux::StreamInfo;
use crate::format::{ChannelLayout, SampleFormat};
use crate::{Error, Result};

/// Input frames fed to rubato per `process` call.
const RATE_CHUNK_FRAMES: usize = 1024;

const DITHER_SEED: u64 = 0x5eed_d17e;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dither {
    #[default]
    None,
    Triangular,
}

/// Everything a resampler is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplerConfig {
    pub in_format: SampleFormat,
    pub in_channels: usize,
    pub in_layout: ChannelLayout,
    pub in_rate: u32,
    pub out_format: SampleFormat,
    pub out_channels: usize,
    pub out_layout: ChannelLayout,
    pub out_rate: u32,
    pub dither: Dither,
    /// Effective bits per output sample; `0` means the full container width.
    pub output_sample_bits: u32,
}

impl ResamplerConfig {
    /// Same format, layout and rate as the stream: only normalizes to interleaved output.
    pub fn passthrough(stream: &StreamInfo) -> Self {
        let channels = stream.channels as usize;
        Self {
            in_format: stream.sample_format,
            in_channels: channels,
            in_layout: stream.channel_layout,
            in_rate: stream.sample_rate,
            out_format: stream.sample_format,
            out_channels: channels,
            out_layout: stream.channel_layout,
            out_rate: stream.sample_rate,
            dither: Dither::None,
            output_sample_bits: 0,
        }
    }

    /// Bytes per interleaved output frame.
    pub fn out_frame_bytes(&self) -> usize {
        self.out_channels * self.out_format.bytes_per_sample()
    }
}

/// Converts decoded frames into the output sample layout.
pub trait Resampler: Send {
    fn config(&self) -> &ResamplerConfig;

    /// Input-rate frames buffered internally that a drain would still produce output for.
    fn delay(&self) -> usize;

    /// Convert `input` (or drain buffered audio when `None`), appending at most `max_out_frames`
    /// interleaved frames to `out`. Returns the number of frames appended.
    ///
    /// Output that does not fit stays buffered and is reflected in [`Resampler::delay`].
    fn convert(
        &mut self,
        input: Option<&Frame>,
        max_out_frames: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize>;

    /// Forget all buffered audio.
    fn reset(&mut self);
}

/// The built-in resampler.
pub struct DefaultResampler {
    config: ResamplerConfig,

    // Present only when the input and output rates differ.
    rate: Option<SincFixedIn<f64>>,

    // Remapped input waiting for a full rubato chunk, one Vec per output channel.
    pending_in: Vec<Vec<f64>>,

    // Converted output not yet handed out, one Vec per output channel.
    queued_out: Vec<Vec<f64>>,

    // Leading rubato output frames still to drop (filter latency).
    skip_out: usize,

    total_in: u64,
    total_out: u64,
    drained: bool,

    dither_rng: Option<StdRng>,
}

impl DefaultResampler {
    pub fn new(config: &ResamplerConfig) -> Result<Self> {
        if config.in_rate == 0 || config.out_rate == 0 {
            return Err(Error::io(format!(
                "invalid resampler rates {} -> {}",
                config.in_rate, config.out_rate
            )));
        }
        if config.in_channels == 0 || config.out_channels == 0 {
            return Err(Error::io("resampler needs at least one channel"));
        }

        let rate = if config.in_rate == config.out_rate {
            None
        } else {
            let rs = SincFixedIn::<f64>::new(
                config.out_rate as f64 / config.in_rate as f64,
                1.0,
                SincInterpolationParameters {
                    sinc_len: 256,
                    f_cutoff: 0.95,
                    interpolation: rubato::SincInterpolationType::Linear,
                    oversampling_factor: 256,
                    window: WindowFunction::BlackmanHarris2,
                },
                RATE_CHUNK_FRAMES,
                config.out_channels,
            )
            .map_err(|e| Error::io(format!("failed to init resampler: {e}")))?;
            Some(rs)
        };

        let skip_out = rate.as_ref().map_or(0, |rs| rs.output_delay());
        let dither_rng = match config.dither {
            Dither::Triangular if !config.out_format.is_float() => {
                Some(StdRng::seed_from_u64(DITHER_SEED))
            }
            _ => None,
        };

        Ok(Self {
            config: config.clone(),
            rate,
            pending_in: vec![Vec::new(); config.out_channels],
            queued_out: vec![Vec::new(); config.out_channels],
            skip_out,
            total_in: 0,
            total_out: 0,
            drained: false,
            dither_rng,
        })
    }

    fn queued_frames(&self) -> usize {
        self.queued_out[0].len()
    }

    fn out_to_in_frames(&self, frames: usize) -> usize {
        (frames as u64 * self.config.in_rate as u64).div_ceil(self.config.out_rate as u64) as usize
    }

    /// Append converted audio to the output queue, dropping filter latency first.
    fn push_out(&mut self, mut planar: Vec<Vec<f64>>) {
        let produced = planar.first().map_or(0, Vec::len);
        let skip = self.skip_out.min(produced);
        self.skip_out -= skip;

        for (queue, channel) in self.queued_out.iter_mut().zip(planar.iter_mut()) {
            queue.extend(channel.drain(skip..));
        }
        self.total_out += (produced - skip) as u64;
    }

    fn push_in(&mut self, frame: &Frame) -> Result<()> {
        let planar = remap_channels(frame, self.config.out_channels);
        self.total_in += frame.frames as u64;
        self.drained = false;

        if self.rate.is_none() {
            self.push_out(planar);
            return Ok(());
        }

        for (pending, channel) in self.pending_in.iter_mut().zip(planar) {
            pending.extend(channel);
        }

        loop {
            let Some(rs) = self.rate.as_mut() else {
                break;
            };
            let needed = rs.input_frames_next();
            if self.pending_in[0].len() < needed {
                break;
            }

            let chunk: Vec<Vec<f64>> = self
                .pending_in
                .iter_mut()
                .map(|c| c.drain(..needed).collect())
                .collect();
            let out = rs
                .process(&chunk, None)
                .map_err(|e| Error::io(format!("resampler process failed: {e}")))?;
            self.push_out(out);
        }
        Ok(())
    }

    /// Run whatever rubato still holds through the filter and trim to the exact expected length.
    fn drain_rate_converter(&mut self) -> Result<()> {
        if self.drained {
            return Ok(());
        }
        self.drained = true;

        let Some(rs) = self.rate.as_mut() else {
            return Ok(());
        };

        let mut outputs = Vec::new();
        if !self.pending_in[0].is_empty() {
            let out = rs
                .process_partial(Some(self.pending_in.as_slice()), None)
                .map_err(|e| Error::io(format!("resampler flush failed: {e}")))?;
            outputs.push(out);
            self.pending_in.iter_mut().for_each(Vec::clear);
        }

        let expected = (self.total_in * self.config.out_rate as u64)
            .div_ceil(self.config.in_rate as u64);
        // Raw frames still include the latency `push_out` drops.
        let mut raw: u64 = outputs.iter().map(|o: &Vec<Vec<f64>>| o[0].len() as u64).sum();
        let mut rounds = 0;
        while self.total_out + raw < expected + self.skip_out as u64 && rounds < 8 {
            let out = rs
                .process_partial::<Vec<f64>>(None, None)
                .map_err(|e| Error::io(format!("resampler flush failed: {e}")))?;
            raw += out[0].len() as u64;
            outputs.push(out);
            rounds += 1;
        }

        for out in outputs {
            self.push_out(out);
        }

        if self.total_out > expected {
            let excess = (self.total_out - expected) as usize;
            let keep = self.queued_frames().saturating_sub(excess);
            self.queued_out.iter_mut().for_each(|c| c.truncate(keep));
            self.total_out = expected;
        }
        Ok(())
    }

    fn emit(&mut self, frames: usize, out: &mut Vec<u8>) {
        let format = self.config.out_format;
        let bits = match self.config.output_sample_bits {
            0 => format.bits(),
            b => b.min(format.bits()),
        };

        out.reserve(frames * self.config.out_frame_bytes());
        for i in 0..frames {
            for c in 0..self.config.out_channels {
                let mut v = self.queued_out[c][i];
                if let Some(rng) = self.dither_rng.as_mut() {
                    let lsb = 1.0 / (1u64 << (bits - 1)) as f64;
                    v += (rng.gen_range(0.0..1.0) - rng.gen_range(0.0..1.0)) * lsb;
                }
                write_sample(out, format, bits, v);
            }
        }

        self.queued_out.iter_mut().for_each(|c| {
            c.drain(..frames);
        });
    }
}

impl Resampler for DefaultResampler {
    fn config(&self) -> &ResamplerConfig {
        &self.config
    }

    fn delay(&self) -> usize {
        let tail = match self.rate.as_ref() {
            Some(rs) if !self.drained && self.total_in > 0 => {
                self.out_to_in_frames(rs.output_delay())
            }
            _ => 0,
        };
        self.pending_in[0].len() + self.out_to_in_frames(self.queued_frames()) + tail
    }

    fn convert(
        &mut self,
        input: Option<&Frame>,
        max_out_frames: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        if max_out_frames == 0 {
            return Ok(0);
        }

        match input {
            Some(frame) => self.push_in(frame)?,
            None => self.drain_rate_converter()?,
        }

        let frames = max_out_frames.min(self.queued_frames());
        self.emit(frames, out);
        Ok(frames)
    }

    fn reset(&mut self) {
        if let Some(rs) = self.rate.as_mut() {
            rs.reset();
            self.skip_out = rs.output_delay();
        }
        self.pending_in.iter_mut().for_each(Vec::clear);
        self.queued_out.iter_mut().for_each(Vec::clear);
        self.total_in = 0;
        self.total_out = 0;
        self.drained = false;
    }
}

/// Read `frame` into planar `f64`, mapped onto `out_channels` channels.
fn remap_channels(frame: &Frame, out_channels: usize) -> Vec<Vec<f64>> {
    let in_channels = frame.channels;
    let read = |c: usize| -> Vec<f64> { (0..frame.frames).map(|i| frame.sample(c, i)).collect() };

    if in_channels == out_channels {
        return (0..in_channels).map(read).collect();
    }
    if in_channels == 1 {
        let mono = read(0);
        return vec![mono; out_channels];
    }
    if out_channels == 1 {
        let mut mix = vec![0.0; frame.frames];
        for c in 0..in_channels {
            for (acc, v) in mix.iter_mut().zip(read(c)) {
                *acc += v;
            }
        }
        let scale = 1.0 / in_channels as f64;
        mix.iter_mut().for_each(|v| *v *= scale);
        return vec![mix];
    }

    (0..out_channels).map(|c| read(c % in_channels)).collect()
}

/// Quantize `v` to `bits` effective bits and append it in `format`, little-endian.
fn write_sample(out: &mut Vec<u8>, format: SampleFormat, bits: u32, v: f64) {
    match format {
        SampleFormat::F32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
        SampleFormat::F64 => out.extend_from_slice(&v.to_le_bytes()),
        SampleFormat::U8 => {
            let q = quantize(v, bits) << (8 - bits);
            out.push((q + 128) as u8);
        }
        SampleFormat::S16 => {
            let q = quantize(v, bits) << (16 - bits);
            out.extend_from_slice(&(q as i16).to_le_bytes());
        }
        SampleFormat::S32 => {
            let q = quantize(v, bits) << (32 - bits);
            out.extend_from_slice(&(q as i32).to_le_bytes());
        }
    }
}

fn quantize(v: f64, bits: u32) -> i64 {
    let scale = (1u64 << (bits - 1)) as f64;
    let max = scale - 1.0;
    (v * scale).round().clamp(-scale, max) as i64
}
