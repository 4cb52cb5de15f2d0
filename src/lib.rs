//! `audiopump`: a streaming decode, resample and encode pipeline.
//!
//! This crate provides:
//! - Opening a media source (path, snapshot or read callback) and selecting an audio stream
//! - Incremental decoding into caller-owned, growable output sinks
//! - Output format conversion: sample rate, bit depth, channel count, byte order and signedness
//! - Seeking and stream format probing
//!
//! Codec and container work happens behind the [`Demuxer`](demux::Demuxer),
//! [`Decoder`](decode::Decoder), [`Resampler`](resample::Resampler) and
//! [`Encoder`](encode::Encoder) traits; [`SymphoniaBackend`] is the built-in implementation.

// High-level API (most consumers should start here).
pub mod context;
pub mod file_format;
pub mod opts;
pub mod sink;
pub mod source;

mod chain;
mod pump;

// Pipeline stages and the backend seam.
pub mod backend;
pub mod backends;
pub mod decode;
pub mod demux;
pub mod encode;
pub mod resample;

// Shared value types and errors.
pub mod error;
pub mod format;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

#[cfg(test)]
mod testing;

pub use backend::MediaBackend;
pub use backends::symphonia::SymphoniaBackend;
pub use context::StreamContext;
pub use error::{Error, ErrorCategory, Result};
pub use file_format::{AudioFileFormat, probe_formats};
pub use format::{Encoding, SampleFormat, TargetFormat};
pub use opts::OpenOpts;
pub use sink::{ByteBufferSink, OutputSink};
pub use source::Source;
