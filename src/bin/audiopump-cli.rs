use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use std::fs::File;
use std::io::{self, BufWriter, Write};

use audiopump::logging;
use audiopump::{
    ByteBufferSink, Encoding, OpenOpts, Source, StreamContext, SymphoniaBackend, TargetFormat,
    probe_formats,
};

/// Initial output buffer size; the pipeline grows it on demand.
const INITIAL_SINK_BYTES: usize = 64 * 1024;

fn main() -> Result<()> {
    logging::init();
    let params = Params::parse();

    match params.command {
        Command::Probe { input, open } => probe(&input, &open.to_opts()),
        Command::Decode {
            input,
            open,
            format,
            seek_us,
            output,
        } => decode(&input, &open.to_opts(), &format, seek_us, output.as_deref()),
    }
}

fn probe(input: &str, opts: &OpenOpts) -> Result<()> {
    let formats = probe_formats(&SymphoniaBackend, Source::url(input), opts)
        .with_context(|| format!("failed to probe {input}"))?;

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    serde_json::to_writer_pretty(&mut writer, &formats)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn decode(
    input: &str,
    opts: &OpenOpts,
    format: &FormatArgs,
    seek_us: Option<u64>,
    output: Option<&str>,
) -> Result<()> {
    let mut ctx = StreamContext::open_default(Source::url(input), opts)
        .with_context(|| format!("failed to open {input}"))?;

    let target = format.to_target(&ctx.output_format())?;
    ctx.configure_output_format(&target)
        .context("output format rejected")?;

    if let Some(micros) = seek_us {
        ctx.seek(micros)
            .with_context(|| format!("failed to seek to {micros}us"))?;
    }

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {path}"))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut sink = ByteBufferSink::new(INITIAL_SINK_BYTES);
    loop {
        let written = ctx.fill(&mut sink)?;
        if written == 0 {
            break;
        }
        writer.write_all(sink.bytes())?;
        sink.consume(written);
    }
    writer.flush()?;

    ctx.close();
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "audiopump")]
#[command(about = "Decode, resample and re-encode audio to raw PCM")]
struct Params {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the format of every audio stream as JSON.
    Probe {
        /// Path or file:// URL.
        input: String,

        #[command(flatten)]
        open: OpenArgs,
    },

    /// Decode one audio stream to raw PCM.
    Decode {
        /// Path or file:// URL.
        input: String,

        #[command(flatten)]
        open: OpenArgs,

        #[command(flatten)]
        format: FormatArgs,

        /// Start decoding at this position, in microseconds.
        #[arg(long = "seek-us")]
        seek_us: Option<u64>,

        /// Output file; stdout when omitted.
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct OpenArgs {
    /// Ordinal of the audio stream to use (0 = first audio stream).
    #[arg(short = 's', long = "stream")]
    stream: Option<usize>,

    #[arg(long = "min-probe-score", default_value_t = audiopump::opts::MIN_PROBE_SCORE)]
    min_probe_score: u32,

    /// Container hint, e.g. "mp4" or "ogg".
    #[arg(long = "hint")]
    hint: Option<String>,

    /// Fail after this many consecutive undecodable packets.
    #[arg(long = "max-decode-failures")]
    max_decode_failures: Option<usize>,
}

impl OpenArgs {
    fn to_opts(&self) -> OpenOpts {
        OpenOpts {
            stream_index: self.stream,
            min_probe_score: self.min_probe_score,
            hint_extension: self.hint.clone(),
            max_consecutive_decode_failures: self.max_decode_failures,
        }
    }
}

/// Output format overrides; anything left out keeps the source's value.
#[derive(clap::Args, Debug)]
struct FormatArgs {
    #[arg(short = 'r', long = "rate")]
    rate: Option<f32>,

    #[arg(short = 'b', long = "bits")]
    bits: Option<u32>,

    #[arg(short = 'c', long = "channels")]
    channels: Option<u32>,

    #[arg(long = "big-endian", default_value_t = false)]
    big_endian: bool,

    /// PCM_SIGNED, PCM_UNSIGNED or PCM_FLOAT.
    #[arg(short = 'e', long = "encoding")]
    encoding: Option<String>,
}

impl FormatArgs {
    fn to_target(&self, current: &TargetFormat) -> Result<TargetFormat> {
        let encoding = match &self.encoding {
            Some(name) => name.parse::<Encoding>()?,
            None => current.encoding,
        };
        Ok(TargetFormat {
            sample_rate: self.rate.unwrap_or(current.sample_rate),
            bits: self.bits.unwrap_or(current.bits),
            channels: self.channels.unwrap_or(current.channels),
            big_endian: self.big_endian,
            encoding,
        })
    }
}
