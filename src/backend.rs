use crate::Result;
use crate::demux::Demuxer;
use crate::encode::{Encoder, PcmCodec, PcmEncoder};
use crate::opts::OpenOpts;
use crate::resample::{DefaultResampler, Resampler, ResamplerConfig};
use crate::source::Source;

/// Pluggable media stack used by [`crate::StreamContext`].
///
/// A backend is responsible for turning a [`Source`] into a [`Demuxer`]; the demuxer in turn
/// builds decoders for its own streams. Resampler and PCM encoder construction default to the
/// built-in implementations and only need overriding when a backend ships its own.
pub trait MediaBackend {
    /// Open and probe `source`.
    ///
    /// Fails with `NotFound` for missing sources, `Io` for unreadable ones and `Unsupported`
    /// when no container format matches.
    fn open_input(&self, source: Source, opts: &OpenOpts) -> Result<Box<dyn Demuxer>>;

    fn new_resampler(&self, config: &ResamplerConfig) -> Result<Box<dyn Resampler>> {
        Ok(Box::new(DefaultResampler::new(config)?))
    }

    /// Build an encoder for `codec` fed by the output of a resampler built from `config`.
    fn new_encoder(&self, codec: PcmCodec, config: &ResamplerConfig) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(PcmEncoder::new(
            codec,
            config.out_format,
            config.out_channels,
        )?))
    }
}
