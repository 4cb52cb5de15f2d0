/// Probe confidence below which a source is rejected as unsupported.
pub const MIN_PROBE_SCORE: u32 = 5;

/// Options that control how a source is opened.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (hosts, tests, batch jobs) can construct options programmatically
#[derive(Debug, Clone)]
pub struct OpenOpts {
    /// Which audio stream to decode, counted among audio streams only.
    ///
    /// When `None`, the demuxer's best audio stream is used.
    pub stream_index: Option<usize>,

    /// Minimum probe score (`0..=100`) a container must reach to be accepted.
    pub min_probe_score: u32,

    /// Optional container hint such as `"wav"` or `"mp3"`.
    ///
    /// Improves probing for snapshot and callback sources, which carry no file name.
    pub hint_extension: Option<String>,

    /// Fail `fill` after this many undecodable packets in a row.
    ///
    /// `None` keeps skipping bad packets for as long as the source yields them.
    pub max_consecutive_decode_failures: Option<usize>,
}

impl Default for OpenOpts {
    fn default() -> Self {
        Self {
            stream_index: None,
            min_probe_score: MIN_PROBE_SCORE,
            hint_extension: None,
            max_consecutive_decode_failures: None,
        }
    }
}
