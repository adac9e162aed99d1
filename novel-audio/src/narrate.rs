//! Chapter narration with a runtime fallback cascade.
//!
//! A chapter is split on lines first. When the TTS server rejects a chunk it
//! is re-split one tier finer (sentences, then forced cuts) and the pieces take
//! its place in the queue. A forced piece that still fails is logged and
//! skipped. Chunk files are named after their position in the cascade
//! (`l_003`, `l_003_s_02`, `l_003_s_02_f_01`) so a rerun picks up where the
//! last one stopped.
//!
//! With a voice map, the chapter is read as speaker-tagged dialogue: each
//! speaker block is chunked on its own and every chunk carries that speaker's
//! voice through its retries.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{DEFAULT_CHUNK_PAUSE_MS, concatenate_wavs};
use crate::project::sanitize_file_stem;
use crate::text::{ChunkSplitter, Tier, process_chapter};
use crate::tts::{MIN_AUDIO_BYTES, TtsBackend, TtsOptions};
use crate::voices::{VoiceMap, speaker_blocks};

/// One pending TTS request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechJob {
    pub text: String,
    pub suffix: String,
    pub tier: Tier,
    /// Overrides the narrator's voice for this request
    pub voice: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrationReport {
    /// Chunk files in playback order
    pub chunks: Vec<PathBuf>,
    /// Chunks reused from an earlier run
    pub reused: usize,
    /// Forced-tier jobs that still failed and were left out
    pub failed: Vec<SpeechJob>,
    /// The assembled chapter, `None` for a chapter without text
    pub output: Option<PathBuf>,
}

impl NarrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Narrator {
    backend: Arc<dyn TtsBackend>,
    splitter: ChunkSplitter,
    options: TtsOptions,
    voices: Option<VoiceMap>,
    failure_log: PathBuf,
    pause_ms: u32,
    retry_delay: Duration,
}

impl Narrator {
    pub fn new(
        backend: Arc<dyn TtsBackend>,
        splitter: ChunkSplitter,
        options: TtsOptions,
        failure_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            splitter,
            options,
            voices: None,
            failure_log: failure_log.into(),
            pause_ms: DEFAULT_CHUNK_PAUSE_MS,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_pause_ms(mut self, pause_ms: u32) -> Self {
        self.pause_ms = pause_ms;
        self
    }

    /// Delay after a failed request before the re-split pieces are sent.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Narrate speaker-tagged chapters with a voice per speaker.
    pub fn with_voices(mut self, voices: VoiceMap) -> Self {
        self.voices = Some(voices);
        self
    }

    pub fn backend(&self) -> &dyn TtsBackend {
        self.backend.as_ref()
    }

    /// Line-tier jobs for a chapter, numbered across the whole chapter.
    pub fn initial_jobs(&self, text: &str) -> Vec<SpeechJob> {
        let Some(voices) = &self.voices else {
            return process_chapter(text, &self.splitter)
                .into_iter()
                .map(|chunk| line_job(chunk.number, chunk.text, None))
                .collect();
        };

        let mut jobs = Vec::new();
        for block in speaker_blocks(text) {
            let voice = voices.voice_for(&block.speaker).map(Path::to_path_buf);
            for chunk in process_chapter(&block.text, &self.splitter) {
                jobs.push(line_job(jobs.len() + 1, chunk.text, voice.clone()));
            }
        }
        jobs
    }

    /// Synthesize one chapter into `output`.
    ///
    /// Chunk WAVs go to `chunk_dir`, which is removed once every chunk made it
    /// into the output. Fails when no chunk at all could be synthesized.
    pub async fn narrate_chapter(
        &self,
        chapter: &str,
        text: &str,
        chunk_dir: &Path,
        output: &Path,
    ) -> Result<NarrationReport> {
        let mut report = NarrationReport::default();
        let mut queue: VecDeque<SpeechJob> = self.initial_jobs(text).into();
        if queue.is_empty() {
            log::info!("{} has no text, nothing to narrate", chapter);
            return Ok(report);
        }

        fs::create_dir_all(chunk_dir)
            .with_context(|| format!("Failed to create {}", chunk_dir.display()))?;
        let stem = sanitize_file_stem(chapter);
        log::info!("Narrating {} ({} chunks)", chapter, queue.len());

        while let Some(job) = queue.pop_front() {
            let path = chunk_dir.join(format!("{}_{}.wav", stem, job.suffix));

            if is_usable_audio(&path) {
                report.reused += 1;
                report.chunks.push(path);
                continue;
            }

            let voiced;
            let options = match &job.voice {
                Some(voice) => {
                    voiced = self.options.clone().with_voice_reference(voice);
                    &voiced
                }
                None => &self.options,
            };

            let error = match self.backend.synthesize(&job.text, &path, options).await {
                Ok(()) => {
                    log::debug!("Generated {}", path.display());
                    report.chunks.push(path);
                    continue;
                }
                Err(e) => e,
            };

            log::warn!("Chunk {} of {} failed: {}", job.suffix, chapter, error);
            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.splitter.resplit(&job.text, job.tier) {
                Some((tier, pieces)) if !pieces.is_empty() => {
                    log::warn!(
                        "Retrying {} as {} {:?}-tier pieces",
                        job.suffix,
                        pieces.len(),
                        tier
                    );
                    for (i, piece) in pieces.into_iter().enumerate().rev() {
                        queue.push_front(SpeechJob {
                            text: piece,
                            suffix: format!("{}_{}_{:02}", job.suffix, tier.tag(), i + 1),
                            tier,
                            voice: job.voice.clone(),
                        });
                    }
                }
                _ => {
                    log::error!("Skipping chunk {} of {}", job.suffix, chapter);
                    self.record_failure(&stem, &job)?;
                    report.failed.push(job);
                }
            }
        }

        if report.chunks.is_empty() {
            anyhow::bail!("No audio could be generated for {}", chapter);
        }

        concatenate_wavs(&report.chunks, output, self.pause_ms)
            .with_context(|| format!("Failed to assemble {}", chapter))?;
        report.output = Some(output.to_path_buf());

        if report.is_complete() {
            if let Err(e) = fs::remove_dir_all(chunk_dir) {
                log::warn!("Could not remove {}: {}", chunk_dir.display(), e);
            }
        } else {
            log::warn!(
                "{} assembled with {} missing chunks; keeping {}",
                chapter,
                report.failed.len(),
                chunk_dir.display()
            );
        }

        Ok(report)
    }

    fn record_failure(&self, stem: &str, job: &SpeechJob) -> Result<()> {
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_log)
            .with_context(|| format!("Failed to open {}", self.failure_log.display()))?;
        writeln!(log_file, "FAILED: {}_{}\nText: {}\n", stem, job.suffix, job.text)?;
        Ok(())
    }
}

fn line_job(number: usize, text: String, voice: Option<PathBuf>) -> SpeechJob {
    SpeechJob {
        suffix: format!("{}_{:03}", Tier::Line.tag(), number),
        text,
        tier: Tier::Line,
        voice,
    }
}

/// A chunk file from an earlier run that is worth keeping.
fn is_usable_audio(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > MIN_AUDIO_BYTES)
        .unwrap_or(false)
}
