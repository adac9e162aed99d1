//! Stage coordinator.
//!
//! Each stage runs as a tokio task and reports through an mpsc channel; the
//! coordinator forwards every event to the caller and stops at the first stage
//! that fails.

mod stages;

use anyhow::{Context, Result};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::NovelConfig;
use crate::epub::BookMetadata;
use crate::glossary::GlossaryStore;
use crate::project::{Project, TextSource};
use crate::translate::Translator;
use crate::tts::TtsBackend;

pub use stages::{epub_stage, synthesize_stage, translate_stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Translate,
    Epub,
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Translate => "translate",
            Stage::Epub => "epub",
            Stage::Synthesize => "synthesize",
        };
        f.write_str(name)
    }
}

/// Counts reported when a stage finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub processed: usize,
    /// Already done by an earlier run
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started { stage: Stage, total: usize },
    Progress { stage: Stage, done: usize, item: String },
    Warning { stage: Stage, message: String },
    Finished { stage: Stage, summary: StageSummary },
    Failed { stage: Stage, error: String },
}

/// Sending half handed to a stage.
#[derive(Debug, Clone)]
pub struct StageReporter {
    stage: Stage,
    tx: mpsc::Sender<StageEvent>,
}

impl StageReporter {
    pub async fn started(&self, total: usize) {
        self.send(StageEvent::Started {
            stage: self.stage,
            total,
        })
        .await;
    }

    pub async fn progress(&self, done: usize, item: impl Into<String>) {
        self.send(StageEvent::Progress {
            stage: self.stage,
            done,
            item: item.into(),
        })
        .await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", self.stage, message);
        self.send(StageEvent::Warning {
            stage: self.stage,
            message,
        })
        .await;
    }

    async fn send(&self, event: StageEvent) {
        // A closed channel only means nobody is listening any more
        let _ = self.tx.send(event).await;
    }
}

/// Run one stage as a task, forwarding its events to `on_event` until it ends.
pub async fn run_stage<F, Fut>(
    stage: Stage,
    work: F,
    on_event: &mut impl FnMut(&StageEvent),
) -> Result<StageSummary>
where
    F: FnOnce(StageReporter) -> Fut,
    Fut: Future<Output = Result<StageSummary>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(64);
    let reporter = StageReporter { stage, tx };
    let task = work(reporter.clone());

    let handle = tokio::spawn(async move {
        let result = task.await;
        let event = match &result {
            Ok(summary) => StageEvent::Finished {
                stage,
                summary: summary.clone(),
            },
            Err(e) => StageEvent::Failed {
                stage,
                error: format!("{:#}", e),
            },
        };
        reporter.send(event).await;
        result
    });

    while let Some(event) = rx.recv().await {
        on_event(&event);
    }

    handle
        .await
        .with_context(|| format!("{} stage task panicked", stage))?
}

enum Step {
    Translate {
        translator: Arc<Translator>,
        store: Arc<dyn GlossaryStore>,
    },
    Epub {
        meta: BookMetadata,
        cover: Option<PathBuf>,
    },
    Synthesize {
        backend: Arc<dyn TtsBackend>,
    },
}

/// Ordered set of stages over one project.
pub struct Pipeline {
    project: Project,
    config: NovelConfig,
    source: Option<TextSource>,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(project: Project, config: NovelConfig) -> Self {
        Self {
            project,
            config,
            source: None,
            steps: Vec::new(),
        }
    }

    /// Text the epub and synthesize stages read. By default translated text
    /// when any exists at the time the stage starts, raw text otherwise.
    pub fn with_source(mut self, source: TextSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn translate(mut self, translator: Arc<Translator>, store: Arc<dyn GlossaryStore>) -> Self {
        self.steps.push(Step::Translate { translator, store });
        self
    }

    pub fn epub(mut self, meta: BookMetadata, cover: Option<PathBuf>) -> Self {
        self.steps.push(Step::Epub { meta, cover });
        self
    }

    pub fn synthesize(mut self, backend: Arc<dyn TtsBackend>) -> Self {
        self.steps.push(Step::Synthesize { backend });
        self
    }

    /// Run every stage in order.
    pub async fn run(
        self,
        mut on_event: impl FnMut(&StageEvent),
    ) -> Result<Vec<(Stage, StageSummary)>> {
        let mut results = Vec::with_capacity(self.steps.len());

        for step in self.steps {
            let project = self.project.clone();
            let config = self.config.clone();
            let source = self.source.unwrap_or_else(|| self.project.default_source());

            let (stage, summary) = match step {
                Step::Translate { translator, store } => (
                    Stage::Translate,
                    run_stage(
                        Stage::Translate,
                        |reporter| translate_stage(project, config, translator, store, reporter),
                        &mut on_event,
                    )
                    .await,
                ),
                Step::Epub { meta, cover } => (
                    Stage::Epub,
                    run_stage(
                        Stage::Epub,
                        |reporter| epub_stage(project, source, meta, cover, reporter),
                        &mut on_event,
                    )
                    .await,
                ),
                Step::Synthesize { backend } => (
                    Stage::Synthesize,
                    run_stage(
                        Stage::Synthesize,
                        |reporter| synthesize_stage(project, config, source, backend, reporter),
                        &mut on_event,
                    )
                    .await,
                ),
            };

            let summary = summary.with_context(|| format!("{} stage failed", stage))?;
            log::info!(
                "{} stage done: {} processed, {} skipped, {} failed",
                stage,
                summary.processed,
                summary.skipped,
                summary.failed
            );
            results.push((stage, summary));
        }

        Ok(results)
    }
}
