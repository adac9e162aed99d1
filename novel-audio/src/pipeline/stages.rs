use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use llm_client::LlmError;

use super::{StageReporter, StageSummary};
use crate::config::NovelConfig;
use crate::epub::{BookMetadata, load_chapters, write_epub};
use crate::glossary::GlossaryStore;
use crate::narrate::Narrator;
use crate::project::{Project, TextSource, chapter_name};
use crate::text::ChunkSplitter;
use crate::translate::{TranslateError, Translator};
use crate::tts::TtsBackend;
use crate::voices::VoiceMap;

/// Chapter WAVs at or below this size are redone.
const MIN_CHAPTER_WAV_BYTES: u64 = 1024;

/// Translate every raw chapter that has no translation yet.
///
/// A chapter that keeps failing is reported and left for the next run; the
/// stage itself only fails when not a single chapter could be translated.
pub async fn translate_stage(
    project: Project,
    config: NovelConfig,
    translator: Arc<Translator>,
    store: Arc<dyn GlossaryStore>,
    reporter: StageReporter,
) -> Result<StageSummary> {
    let chapters = project.chapters(TextSource::Raw)?;
    reporter.started(chapters.len()).await;

    let mut summary = StageSummary::default();
    let attempts = config.translation.max_attempts.max(1);
    let retry_delay = Duration::from_secs(config.translation.retry_delay_secs);

    for (i, path) in chapters.iter().enumerate() {
        let name = chapter_name(path);
        let output = project.translated_dir().join(format!("{}.txt", name));

        if has_content(&output) {
            summary.skipped += 1;
            reporter.progress(i + 1, &name).await;
            continue;
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut attempt = 1;
        let result = loop {
            match translator.translate_chapter(&text, store.as_ref()).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let wait = backoff(&e, retry_delay);
                    log::warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        name,
                        attempt,
                        attempts,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => break other,
            }
        };

        match result {
            Ok(translation) if translation.text.is_empty() => {
                reporter.warn(format!("{} has no text to translate", name)).await;
                summary.skipped += 1;
            }
            Ok(translation) => {
                fs::write(&output, format!("{}\n", translation.text))
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                if !translation.added_terms.is_empty() {
                    log::info!(
                        "{}: {} new glossary terms",
                        name,
                        translation.added_terms.len()
                    );
                }
                summary.processed += 1;
            }
            Err(e) => {
                reporter.warn(format!("Failed to translate {}: {}", name, e)).await;
                summary.failed += 1;
            }
        }

        reporter.progress(i + 1, &name).await;
    }

    if summary.failed > 0 && summary.processed == 0 && summary.skipped == 0 {
        anyhow::bail!("All {} chapters failed to translate", summary.failed);
    }
    Ok(summary)
}

/// Wait before retrying, honoring a server supplied retry-after.
fn backoff(error: &TranslateError, default: Duration) -> Duration {
    match error {
        TranslateError::Transient(LlmError::RateLimited {
            retry_after: Some(secs),
        }) => default.max(Duration::from_secs(*secs)),
        _ => default,
    }
}

/// Package the chosen chapter text into the project's EPUB.
pub async fn epub_stage(
    project: Project,
    source: TextSource,
    meta: BookMetadata,
    cover: Option<PathBuf>,
    reporter: StageReporter,
) -> Result<StageSummary> {
    reporter.started(1).await;
    let dir = project.source_dir(source);
    let output = project.epub_path();

    let count = tokio::task::spawn_blocking(move || -> Result<usize> {
        let chapters = load_chapters(&dir)?;
        write_epub(&chapters, &meta, cover.as_deref(), &output)?;
        log::info!("Wrote {} chapters to {}", chapters.len(), output.display());
        Ok(chapters.len())
    })
    .await
    .context("EPUB task panicked")??;

    reporter.progress(1, format!("{} chapters", count)).await;
    Ok(StageSummary {
        processed: count,
        ..StageSummary::default()
    })
}

/// Narrate every chapter that has no finished WAV yet.
pub async fn synthesize_stage(
    project: Project,
    config: NovelConfig,
    source: TextSource,
    backend: Arc<dyn TtsBackend>,
    reporter: StageReporter,
) -> Result<StageSummary> {
    if !backend.is_ready().await {
        anyhow::bail!("{} TTS server is not ready", backend.name());
    }

    let chapters = project.chapters(source)?;
    reporter.started(chapters.len()).await;

    let splitter =
        ChunkSplitter::new(config.max_chunk_length).with_line_grouping(config.group_lines);
    let mut narrator = Narrator::new(
        backend,
        splitter,
        config.tts_options(),
        project.failure_log(),
    )
    .with_pause_ms(config.chunk_pause_ms);
    if let Some(voices) = VoiceMap::load_optional(&project.voice_map_path(&config))? {
        narrator = narrator.with_voices(voices);
    }

    let mut summary = StageSummary::default();
    for (i, path) in chapters.iter().enumerate() {
        let name = chapter_name(path);
        let output = project.audio_dir().join(format!("{}.wav", name));

        if is_finished_wav(&output) {
            summary.skipped += 1;
            reporter.progress(i + 1, &name).await;
            continue;
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match narrator
            .narrate_chapter(&name, &text, &project.chunk_dir(&name), &output)
            .await
        {
            Ok(report) if report.output.is_none() => summary.skipped += 1,
            Ok(report) => {
                if !report.is_complete() {
                    reporter
                        .warn(format!(
                            "{} is missing {} chunks, see {}",
                            name,
                            report.failed.len(),
                            project.failure_log().display()
                        ))
                        .await;
                }
                summary.processed += 1;
            }
            Err(e) => {
                reporter.warn(format!("{:#}", e)).await;
                summary.failed += 1;
            }
        }

        reporter.progress(i + 1, &name).await;
    }

    Ok(summary)
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn is_finished_wav(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.len() > MIN_CHAPTER_WAV_BYTES)
        .unwrap_or(false)
}
