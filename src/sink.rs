//! The caller-owned output buffer and the adapter that writes chunks into it.
//!
//! The sink behaves like a byte buffer with a read position and a limit. The pipeline writes a
//! chunk at growing offsets, resets the read position at the start of each chunk and moves the
//! limit to the end of what it wrote, so the caller always reads `position..limit`.

use tracing::warn;

use crate::encode::Encoder;
use crate::{Error, Result};

/// A growable byte buffer owned by the caller.
pub trait OutputSink {
    /// Writable bytes currently available.
    fn capacity(&self) -> usize;

    /// Grow to at least `requested` bytes, returning the new capacity.
    ///
    /// Earlier contents up to the current limit must survive the growth.
    fn request_capacity(&mut self, requested: usize) -> Result<usize>;

    /// The whole writable region, `capacity()` bytes long.
    fn buffer_mut(&mut self) -> &mut [u8];

    /// Move the read position back to the start.
    fn rewind(&mut self);

    /// Set the end of readable data.
    fn set_limit(&mut self, limit: usize);
}

/// A `Vec`-backed [`OutputSink`] with an optional capacity ceiling.
#[derive(Debug, Default)]
pub struct ByteBufferSink {
    buf: Vec<u8>,
    position: usize,
    limit: usize,
    max_capacity: Option<usize>,
    grow_requests: usize,
}

impl ByteBufferSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            ..Self::default()
        }
    }

    /// A sink that refuses to grow beyond `max_capacity` bytes.
    pub fn with_max_capacity(capacity: usize, max_capacity: usize) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..Self::new(capacity)
        }
    }

    /// Readable bytes, `position..limit`.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.position..self.limit]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Mark `n` readable bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.position = (self.position + n).min(self.limit);
    }

    /// How many times the pipeline asked this sink to grow.
    pub fn grow_requests(&self) -> usize {
        self.grow_requests
    }
}

impl OutputSink for ByteBufferSink {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn request_capacity(&mut self, requested: usize) -> Result<usize> {
        self.grow_requests += 1;
        if let Some(max) = self.max_capacity {
            if requested > max {
                return Err(Error::io(format!(
                    "output buffer limited to {max} bytes, {requested} requested"
                )));
            }
        }
        if requested > self.buf.len() {
            self.buf.resize(requested, 0);
        }
        Ok(self.buf.len())
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(self.buf.len());
        self.position = self.position.min(self.limit);
    }
}

/// Write `frames` interleaved frames of `samples` into `sink` at `offset`.
///
/// `known_capacity` caches the sink's capacity between calls so growth is only requested when a
/// write would not fit. Returns the number of bytes written; `0` when the encoder is still
/// buffering.
pub(crate) fn write_chunk(
    sink: &mut dyn OutputSink,
    known_capacity: &mut usize,
    encoder: Option<&mut dyn Encoder>,
    offset: usize,
    frames: usize,
    frame_bytes: usize,
    samples: &[u8],
) -> Result<usize> {
    let required = frames * frame_bytes;
    if samples.len() < required {
        return Err(Error::io(format!(
            "resampler produced {} bytes, {required} expected",
            samples.len()
        )));
    }

    if *known_capacity < offset + required {
        match sink.request_capacity(offset + required) {
            Ok(capacity) if capacity >= offset + required => *known_capacity = capacity,
            Ok(capacity) => {
                warn!(capacity, required = offset + required, "output buffer did not grow enough");
                sink.rewind();
                return Err(Error::io(format!(
                    "output buffer grew to {capacity} bytes, {} required",
                    offset + required
                )));
            }
            Err(err) => {
                warn!(error = %err, required = offset + required, "failed to grow output buffer");
                sink.rewind();
                return Err(match err {
                    Error::Io { .. } => err,
                    other => Error::io(format!("failed to grow output buffer: {other}")),
                });
            }
        }
    }

    let encoded;
    let bytes = match encoder {
        Some(encoder) => {
            encoded = encoder.encode(&samples[..required], frames)?;
            if encoded.is_empty() {
                return Ok(0);
            }
            encoded.as_slice()
        }
        None => &samples[..required],
    };

    let end = offset + bytes.len();
    let buf = sink.buffer_mut();
    if buf.len() < end {
        return Err(Error::io(format!(
            "encoded chunk of {} bytes does not fit at offset {offset}",
            bytes.len()
        )));
    }
    buf[offset..end].copy_from_slice(bytes);

    if offset == 0 {
        sink.rewind();
    }
    sink.set_limit(end);
    Ok(bytes.len())
}
