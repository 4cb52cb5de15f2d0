use std::path::{Path, PathBuf};

use audiopump::{
    ByteBufferSink, Encoding, ErrorCategory, OpenOpts, Source, StreamContext, SymphoniaBackend,
    TargetFormat, probe_formats,
};

fn write_wav(
    dir: &Path,
    name: &str,
    channels: u16,
    rate: u32,
    samples: &[i16],
) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(path)
}

/// Interleaved stereo ramp where every sample is distinct enough to catch reordering.
fn stereo_ramp(frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| {
            let v = (i % 20_000) as i16;
            [v, -v]
        })
        .collect()
}

fn le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Pump `ctx` until the source is exhausted, returning everything it produced.
fn drain(ctx: &mut StreamContext) -> anyhow::Result<Vec<u8>> {
    let mut sink = ByteBufferSink::new(256);
    let mut out = Vec::new();
    loop {
        let n = ctx.fill(&mut sink)?;
        if n == 0 {
            return Ok(out);
        }
        assert_eq!(sink.bytes().len(), n);
        out.extend_from_slice(sink.bytes());
        sink.consume(n);
    }
}

fn url(path: &Path) -> Source {
    Source::url(path.display().to_string())
}

#[test]
fn sixteen_bit_stereo_passes_through_unchanged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples = stereo_ramp(3_000);
    let path = write_wav(dir.path(), "ramp.wav", 2, 44_100, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    assert!(!ctx.has_encoder());

    let out = drain(&mut ctx)?;
    assert_eq!(out, le_bytes(&samples));
    assert_eq!(ctx.resampled_bytes(), 3_000 * 4);
    assert_eq!(ctx.decoded_samples(), 3_000);

    // Exhausted sources keep reporting 0.
    let mut sink = ByteBufferSink::new(16);
    assert_eq!(ctx.fill(&mut sink)?, 0);
    Ok(())
}

#[test]
fn twenty_four_bit_output_packs_three_bytes_per_sample() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples = stereo_ramp(1_000);
    let path = write_wav(dir.path(), "ramp.wav", 2, 44_100, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    ctx.configure_output_format(&TargetFormat {
        sample_rate: 44_100.0,
        bits: 24,
        channels: 2,
        big_endian: false,
        encoding: Encoding::PcmSigned,
    })?;
    assert!(ctx.has_encoder());

    let out = drain(&mut ctx)?;
    assert_eq!(out.len(), 1_000 * 2 * 3);
    for (packed, &original) in out.chunks_exact(3).zip(&samples) {
        assert_eq!(packed[0], 0);
        assert_eq!(i16::from_le_bytes([packed[1], packed[2]]), original);
    }
    Ok(())
}

#[test]
fn big_endian_output_swaps_bytes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples = stereo_ramp(500);
    let path = write_wav(dir.path(), "ramp.wav", 2, 44_100, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    let mut target = ctx.output_format();
    target.big_endian = true;
    ctx.configure_output_format(&target)?;

    let out = drain(&mut ctx)?;
    let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    assert_eq!(out, expected);
    assert!(ctx.output_format().big_endian);
    Ok(())
}

#[test]
fn halving_the_rate_halves_the_frames() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..4_410)
        .map(|i| ((i as f64 * 0.05).sin() * 8_000.0) as i16)
        .collect();
    let path = write_wav(dir.path(), "sine.wav", 1, 44_100, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    ctx.configure_output_format(&TargetFormat {
        sample_rate: 22_050.0,
        bits: 16,
        channels: 1,
        big_endian: false,
        encoding: Encoding::PcmSigned,
    })?;

    let out = drain(&mut ctx)?;
    assert_eq!(out.len(), 2_205 * 2);
    Ok(())
}

#[test]
fn mono_source_upmixes_to_stereo() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples: Vec<i16> = (0..800).map(|i| (i * 7) as i16).collect();
    let path = write_wav(dir.path(), "mono.wav", 1, 8_000, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    let mut target = ctx.output_format();
    target.channels = 2;
    ctx.configure_output_format(&target)?;

    let out = drain(&mut ctx)?;
    let expected: Vec<i16> = samples.iter().flat_map(|&s| [s, s]).collect();
    assert_eq!(out, le_bytes(&expected));
    Ok(())
}

#[test]
fn seeking_resumes_from_the_landed_position() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let frames = 44_100;
    let samples: Vec<i16> = (0..frames).map(|i| (i % 30_000) as i16).collect();
    let path = write_wav(dir.path(), "second.wav", 1, 44_100, &samples)?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    assert!(ctx.is_seekable());
    ctx.seek(500_000)?;

    let landed = ctx.timestamp() as usize;
    assert!(landed <= 22_050);
    assert!(ctx.timestamp_micros() <= 500_000);

    let out = drain(&mut ctx)?;
    assert_eq!(out, le_bytes(&samples[landed..]));
    Ok(())
}

#[test]
fn snapshot_and_callback_sources_match_the_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let samples = stereo_ramp(2_000);
    let path = write_wav(dir.path(), "ramp.wav", 2, 44_100, &samples)?;
    let bytes = std::fs::read(&path)?;

    let mut from_file = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    let expected = drain(&mut from_file)?;

    let mut from_snapshot =
        StreamContext::open_default(Source::Snapshot(bytes.clone()), &OpenOpts::default())?;
    assert!(!from_snapshot.is_seekable());
    assert_eq!(drain(&mut from_snapshot)?, expected);

    let mut reader = std::io::Cursor::new(bytes);
    let callback = move |buf: &mut [u8]| -> std::io::Result<usize> {
        std::io::Read::read(&mut reader, buf)
    };
    let opts = OpenOpts {
        hint_extension: Some("wav".into()),
        ..OpenOpts::default()
    };
    let mut from_callback = StreamContext::open_default(Source::stream(callback), &opts)?;
    assert_eq!(drain(&mut from_callback)?, expected);
    Ok(())
}

#[test]
fn text_files_are_unsupported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "these are not the samples you are looking for\n".repeat(200))?;

    let err = StreamContext::open_default(url(&path), &OpenOpts::default())
        .err()
        .map(|e| e.category());
    assert_eq!(err, Some(ErrorCategory::Unsupported));
    Ok(())
}

#[test]
fn missing_files_are_not_found() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let err = StreamContext::open_default(url(&dir.path().join("gone.wav")), &OpenOpts::default())
        .err()
        .map(|e| e.category());
    assert_eq!(err, Some(ErrorCategory::NotFound));
    Ok(())
}

#[test]
fn out_of_range_stream_ordinal_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_wav(dir.path(), "one.wav", 1, 8_000, &[0; 64])?;

    let opts = OpenOpts {
        stream_index: Some(1),
        ..OpenOpts::default()
    };
    let err = StreamContext::open_default(url(&path), &opts)
        .err()
        .map(|e| e.category());
    assert_eq!(err, Some(ErrorCategory::IndexOutOfRange));
    Ok(())
}

#[test]
fn probe_reports_wav_properties() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_wav(dir.path(), "second.wav", 2, 44_100, &stereo_ramp(44_100))?;

    let formats = probe_formats(&SymphoniaBackend, url(&path), &OpenOpts::default())?;
    assert_eq!(formats.len(), 1);

    let format = &formats[0];
    assert_eq!(format.codec, "pcm_s16le");
    assert_eq!(format.sample_rate, 44_100.0);
    assert_eq!(format.sample_size, Some(16));
    assert_eq!(format.channels, 2);
    assert_eq!(format.frame_size, Some(4));
    assert_eq!(format.frame_length, Some(44_100));
    assert_eq!(format.duration_micros, Some(1_000_000));
    assert_eq!(format.bit_rate, Some(44_100 * 16 * 2));
    assert!(!format.big_endian);
    assert!(!format.encrypted);
    assert_eq!(format.vbr, None);
    assert_eq!(format.url.as_deref(), Some(path.display().to_string().as_str()));

    let json = serde_json::to_value(format)?;
    assert_eq!(json["codec"], "pcm_s16le");
    Ok(())
}

#[test]
fn closed_contexts_refuse_to_fill() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_wav(dir.path(), "one.wav", 1, 8_000, &[1; 64])?;

    let mut ctx = StreamContext::open_default(url(&path), &OpenOpts::default())?;
    ctx.close();
    ctx.close();
    assert!(ctx.is_closed());

    let err = ctx.fill(&mut ByteBufferSink::new(16)).err().map(|e| e.category());
    assert_eq!(err, Some(ErrorCategory::Io));
    Ok(())
}
