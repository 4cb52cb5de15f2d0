//! The packet pump: pulls packets until the sink holds a chunk or the source is exhausted.

use tracing::{debug, trace};

use crate::backend::MediaBackend;
use crate::context::{StreamContext, closed};
use crate::demux::PacketCursor;
use crate::sink::OutputSink;
use crate::Result;

impl<B: MediaBackend> StreamContext<B> {
    /// Produce the next chunk of output into `sink`.
    ///
    /// Reads packets, skipping those of other streams, until one decodes to a non-empty chunk.
    /// At end of input the resampler is drained through the same path. Returns the chunk length
    /// in bytes; `0` means the source is exhausted and nothing was left to drain.
    ///
    /// The sink's readable window (`position..limit`) covers exactly the returned chunk.
    pub fn fill(&mut self, sink: &mut dyn OutputSink) -> Result<usize> {
        self.sink_capacity = sink.capacity();

        loop {
            if self.pending.is_some() {
                let written = self.process_pending(sink)?;
                if written > 0 {
                    return Ok(written);
                }
                continue;
            }

            let packet = self.demuxer.as_mut().ok_or_else(closed)?.read_packet()?;
            let Some(packet) = packet else {
                debug!(
                    decoded = self.decoded_samples,
                    bytes = self.resampled_bytes,
                    "end of input; draining"
                );
                return self.flush(sink);
            };

            if packet.stream_index != self.stream_index {
                trace!(stream = packet.stream_index, "skipping packet of another stream");
                continue;
            }

            self.pending = Some(PacketCursor::new(packet));
        }
    }
}
