//! Where compressed audio comes from.
//!
//! A host hands the pipeline one of three kinds of input: a path/URL the backend opens itself,
//! a fixed in-memory snapshot, or a pull callback that is asked repeatedly for more bytes.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use crate::Error;

/// A pull callback feeding bytes into the demuxer.
///
/// `fill` writes at most `buf.len()` bytes into `buf` and returns how many it wrote. Returning
/// `Ok(0)` signals end of input. Reporting more bytes than `buf.len()` is a protocol violation and
/// surfaces as an I/O error.
pub trait ReadCallback: Send {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<F> ReadCallback for F
where
    F: FnMut(&mut [u8]) -> io::Result<usize> + Send,
{
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self(buf)
    }
}

/// Input for [`crate::StreamContext::open`].
pub enum Source {
    /// A filesystem path or a `file://` URL.
    Url(String),

    /// A complete, fixed buffer. Not seekable.
    Snapshot(Vec<u8>),

    /// A callback invoked whenever the demuxer needs more bytes. Not seekable.
    Stream(Box<dyn ReadCallback>),
}

impl Source {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn stream(callback: impl ReadCallback + 'static) -> Self {
        Self::Stream(Box::new(callback))
    }

    /// The URL for `Source::Url`, `None` otherwise.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Snapshot(bytes) => write!(f, "Snapshot({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The first failure of a read callback, shared between the reader and the demuxer.
///
/// Demuxers tend to fold source errors into "end of input" or "unknown format"; the fault keeps
/// the real cause so it can be reported as I/O. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReadFault(Arc<Mutex<Option<String>>>);

impl ReadFault {
    fn record(&self, err: &io::Error) {
        let mut fault = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if fault.is_none() {
            *fault = Some(err.to_string());
        }
    }

    /// The recorded failure as an I/O error, if the callback has failed.
    pub(crate) fn error(&self) -> Option<Error> {
        let fault = self.0.lock().unwrap_or_else(|e| e.into_inner());
        fault
            .as_ref()
            .map(|msg| Error::io(format!("read callback failed: {msg}")))
    }
}

/// Adapts a [`ReadCallback`] to `std::io::Read`, enforcing the buffer-size contract.
pub(crate) struct CallbackReader {
    callback: Box<dyn ReadCallback>,
    fault: ReadFault,
}

impl CallbackReader {
    pub(crate) fn new(callback: Box<dyn ReadCallback>) -> Self {
        Self {
            callback,
            fault: ReadFault::default(),
        }
    }

    pub(crate) fn fault(&self) -> ReadFault {
        self.fault.clone()
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.callback.fill(buf)?;
        if available > buf.len() {
            return Err(io::Error::other(format!(
                "read callback reported {available} bytes for a {} byte buffer",
                buf.len()
            )));
        }
        Ok(available)
    }
}

impl Read for CallbackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf).inspect_err(|err| self.fault.record(err))
    }
}
