//! WAV concatenation with a fixed pause between chunks.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Pause inserted between consecutive chunks.
pub const DEFAULT_CHUNK_PAUSE_MS: u32 = 450;

/// What [`concatenate_wavs`] wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySummary {
    pub chunks_written: usize,
    /// Inputs that could not be read or did not match the output format
    pub skipped: Vec<PathBuf>,
    /// Samples per channel in the output
    pub frames: u64,
    pub sample_rate: u32,
}

impl AssemblySummary {
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate.max(1) as f64
    }
}

/// Join `inputs` in order into one WAV at `output`.
///
/// The output takes the format of the first readable input. Inputs that fail to
/// decode or use another format are skipped with a warning. `pause_ms` of
/// silence goes between chunks, none after the last.
pub fn concatenate_wavs(inputs: &[PathBuf], output: &Path, pause_ms: u32) -> Result<AssemblySummary> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer: Option<(WavWriter<BufWriter<File>>, WavSpec)> = None;
    let mut skipped = Vec::new();
    let mut chunks_written = 0;
    let mut samples_written: u64 = 0;

    for input in inputs {
        let reader = match WavReader::open(input) {
            Ok(reader) => reader,
            Err(e) => {
                log::warn!("Skipping unreadable chunk {}: {}", input.display(), e);
                skipped.push(input.clone());
                continue;
            }
        };
        let spec = reader.spec();

        if writer.is_none() {
            let out = WavWriter::create(output, spec)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            writer = Some((out, spec));
        }
        let Some((out, out_spec)) = writer.as_mut() else {
            continue;
        };
        let out_spec = *out_spec;
        if !same_format(&out_spec, &spec) {
            log::warn!(
                "Skipping {}: format {}Hz/{}ch/{}bit differs from output",
                input.display(),
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample
            );
            skipped.push(input.clone());
            continue;
        }

        if chunks_written > 0 {
            samples_written += write_silence(out, &out_spec, pause_ms)?;
        }
        samples_written += copy_samples(reader, out, &out_spec)
            .with_context(|| format!("Failed to copy samples from {}", input.display()))?;
        chunks_written += 1;
    }

    let Some((out, spec)) = writer else {
        anyhow::bail!("No readable audio chunks among {} inputs", inputs.len());
    };
    out.finalize()
        .with_context(|| format!("Failed to finalize {}", output.display()))?;

    let summary = AssemblySummary {
        chunks_written,
        skipped,
        frames: samples_written / spec.channels.max(1) as u64,
        sample_rate: spec.sample_rate,
    };
    log::info!(
        "Wrote {} ({} chunks, {:.1}s)",
        output.display(),
        summary.chunks_written,
        summary.duration_secs()
    );
    Ok(summary)
}

fn same_format(a: &WavSpec, b: &WavSpec) -> bool {
    a.channels == b.channels
        && a.sample_rate == b.sample_rate
        && a.bits_per_sample == b.bits_per_sample
        && a.sample_format == b.sample_format
}

/// Number of interleaved samples for `pause_ms` at `spec`.
fn silence_samples(spec: &WavSpec, pause_ms: u32) -> u64 {
    spec.sample_rate as u64 * pause_ms as u64 / 1000 * spec.channels as u64
}

fn write_silence(out: &mut WavWriter<BufWriter<File>>, spec: &WavSpec, pause_ms: u32) -> Result<u64> {
    let count = silence_samples(spec, pause_ms);
    for _ in 0..count {
        match spec.sample_format {
            SampleFormat::Float => out.write_sample(0.0f32)?,
            SampleFormat::Int => out.write_sample(0i32)?,
        }
    }
    Ok(count)
}

fn copy_samples(
    reader: WavReader<BufReader<File>>,
    out: &mut WavWriter<BufWriter<File>>,
    spec: &WavSpec,
) -> Result<u64> {
    let mut count = 0;
    match spec.sample_format {
        SampleFormat::Float => {
            for sample in reader.into_samples::<f32>() {
                out.write_sample(sample?)?;
                count += 1;
            }
        }
        SampleFormat::Int => {
            for sample in reader.into_samples::<i32>() {
                out.write_sample(sample?)?;
                count += 1;
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mono_spec(sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn read_all(path: &Path) -> Vec<i16> {
        WavReader::open(path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect()
    }

    #[test]
    fn test_silence_between_chunks_only() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let c = dir.path().join("c.wav");
        write_wav(&a, mono_spec(1000), &[1; 10]);
        write_wav(&b, mono_spec(1000), &[2; 20]);
        write_wav(&c, mono_spec(1000), &[3; 5]);

        let output = dir.path().join("out").join("chapter.wav");
        let summary = concatenate_wavs(&[a, b, c], &output, 100).unwrap();

        assert_eq!(summary.chunks_written, 3);
        assert!(summary.skipped.is_empty());
        // 35 samples of audio plus two 100 ms pauses at 1 kHz
        assert_eq!(summary.frames, 35 + 2 * 100);

        let samples = read_all(&output);
        assert_eq!(samples.len(), 235);
        assert_eq!(&samples[..10], &[1; 10]);
        assert!(samples[10..110].iter().all(|&s| s == 0));
        assert_eq!(&samples[110..130], &[2; 20]);
        assert_eq!(*samples.last().unwrap(), 3);
    }

    #[test]
    fn test_stereo_silence_counts_frames() {
        let dir = TempDir::new().unwrap();
        let spec = WavSpec {
            channels: 2,
            ..mono_spec(2000)
        };
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, spec, &[5; 8]);
        write_wav(&b, spec, &[6; 8]);

        let output = dir.path().join("out.wav");
        let summary = concatenate_wavs(&[a, b], &output, 10).unwrap();
        // 4 + 4 frames of audio, 20 frames of pause
        assert_eq!(summary.frames, 28);
        assert_eq!(read_all(&output).len(), 56);
    }

    #[test]
    fn test_bad_and_mismatched_chunks_skipped() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.wav");
        let broken = dir.path().join("broken.wav");
        let other_rate = dir.path().join("other.wav");
        write_wav(&good, mono_spec(1000), &[7; 4]);
        std::fs::write(&broken, b"not a wav file").unwrap();
        write_wav(&other_rate, mono_spec(44100), &[8; 4]);

        let output = dir.path().join("out.wav");
        let summary =
            concatenate_wavs(&[broken.clone(), good, other_rate.clone()], &output, 450).unwrap();

        assert_eq!(summary.chunks_written, 1);
        assert_eq!(summary.skipped, vec![broken, other_rate]);
        assert_eq!(read_all(&output), vec![7; 4]);
    }

    #[test]
    fn test_no_readable_chunks_is_error() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.wav");
        std::fs::write(&broken, b"garbage").unwrap();
        assert!(concatenate_wavs(&[broken], &dir.path().join("out.wav"), 450).is_err());
        assert!(concatenate_wavs(&[], &dir.path().join("out.wav"), 450).is_err());
    }

    #[test]
    fn test_silence_samples() {
        assert_eq!(silence_samples(&mono_spec(24000), 450), 10800);
    }
}
