//! Built-in [`MediaBackend`] on top of Symphonia.
//!
//! Responsibilities:
//! - Turn a [`Source`] into a Symphonia `MediaSource` (file, snapshot, read callback)
//! - Map Symphonia's codec registry onto codec names and PCM byte order
//!
//! Symphonia reports no probe confidence; a container it recognizes scores
//! [`PROBE_SCORE_MAX`](crate::demux::PROBE_SCORE_MAX).

mod decode;
mod demux;

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Mutex;

use symphonia::core::codecs::CodecType;
use symphonia::core::io::{MediaSource, ReadOnlySource};
use tracing::debug;

pub use decode::SymphoniaDecoder;
pub use demux::SymphoniaDemuxer;

use crate::backend::MediaBackend;
use crate::demux::Demuxer;
use crate::opts::OpenOpts;
use crate::source::{CallbackReader, ReadFault, Source};
use crate::{Error, Result};

/// Decodes everything Symphonia's default registries support.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaBackend;

impl MediaBackend for SymphoniaBackend {
    fn open_input(&self, source: Source, opts: &OpenOpts) -> Result<Box<dyn Demuxer>> {
        let opened = open_media_source(source)?;
        let hint = opts
            .hint_extension
            .as_deref()
            .or(opened.extension.as_deref());
        Ok(Box::new(SymphoniaDemuxer::probe(opened.media, hint, opened.fault)?))
    }
}

struct OpenedSource {
    media: Box<dyn MediaSource>,
    extension: Option<String>,
    /// Set for callback sources, whose failures Symphonia would otherwise mask.
    fault: Option<ReadFault>,
}

/// Open `source` as a Symphonia media source.
fn open_media_source(source: Source) -> Result<OpenedSource> {
    match source {
        Source::Url(url) => {
            let path = url_to_path(&url)?;
            let file = File::open(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(url.clone()),
                _ => Error::io_with(format!("failed to open {url}"), e),
            })?;
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_owned);
            debug!(%url, ?extension, "opened file source");
            Ok(OpenedSource {
                media: Box::new(file),
                extension,
                fault: None,
            })
        }
        Source::Snapshot(bytes) => Ok(OpenedSource {
            media: Box::new(ReadOnlySource::new(Cursor::new(bytes))),
            extension: None,
            fault: None,
        }),
        Source::Stream(callback) => {
            let reader = CallbackReader::new(callback);
            let fault = reader.fault();
            Ok(OpenedSource {
                media: Box::new(ReadOnlySource::new(LockedRead::new(reader))),
                extension: None,
                fault: Some(fault),
            })
        }
    }
}

/// Accept plain paths and `file://` URLs; every other scheme is unreachable for this backend.
fn url_to_path(url: &str) -> Result<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Path::new(path));
    }
    match url.split_once("://") {
        Some((scheme, _)) => Err(Error::io(format!("protocol not found: {scheme}"))),
        None => Ok(Path::new(url)),
    }
}

/// Symphonia requires `Sync` sources; callback sources are only `Send`.
///
/// The pipeline never reads concurrently, so the lock is uncontended.
struct LockedRead<R> {
    inner: Mutex<R>,
}

impl<R> LockedRead<R> {
    fn new(inner: R) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<R: Read> Read for LockedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner
            .get_mut()
            .map_err(|_| std::io::Error::other("source reader mutex poisoned"))?
            .read(buf)
    }
}

/// Short codec name from Symphonia's registry, e.g. `pcm_s16le` or `flac`.
pub(crate) fn codec_name(codec: CodecType) -> String {
    symphonia::default::get_codecs()
        .get_codec(codec)
        .map_or_else(|| "unknown".to_owned(), |d| d.short_name.to_owned())
}

pub(crate) fn is_pcm(name: &str) -> bool {
    name.starts_with("pcm_")
}

pub(crate) fn is_big_endian_pcm(name: &str) -> bool {
    is_pcm(name) && (name.ends_with("be") || name.ends_with("be_planar"))
}
