//! Glossary persistence.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use thiserror::Error;

use super::{Glossary, GlossaryEntry, GlossarySubset, MergeReport};

#[derive(Debug, Error)]
pub enum GlossaryError {
    #[error("failed to read glossary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write glossary {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("glossary {path} is malformed: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("glossary lock poisoned")]
    Poisoned,
}

/// Shared access to a glossary.
///
/// `merge` is first-seen-wins and must be atomic with respect to other callers
/// holding the same store.
pub trait GlossaryStore: Send + Sync {
    fn get(&self, term: &str) -> Result<Option<GlossaryEntry>, GlossaryError>;

    fn merge(&self, proposals: Vec<(String, GlossaryEntry)>) -> Result<MergeReport, GlossaryError>;

    /// Explicitly replace an entry. Not used by the translation flow.
    fn correct(
        &self,
        term: &str,
        entry: GlossaryEntry,
    ) -> Result<Option<GlossaryEntry>, GlossaryError>;

    fn snapshot(&self) -> Result<Glossary, GlossaryError>;

    fn relevant_subset(&self, text: &str) -> Result<GlossarySubset, GlossaryError> {
        Ok(self.snapshot()?.relevant_subset(text))
    }
}

fn lock(glossary: &Mutex<Glossary>) -> Result<MutexGuard<'_, Glossary>, GlossaryError> {
    glossary.lock().map_err(|_| GlossaryError::Poisoned)
}

/// In-process glossary with no persistence.
#[derive(Debug, Default)]
pub struct MemoryGlossaryStore {
    glossary: Mutex<Glossary>,
}

impl MemoryGlossaryStore {
    pub fn new(glossary: Glossary) -> Self {
        Self {
            glossary: Mutex::new(glossary),
        }
    }
}

impl GlossaryStore for MemoryGlossaryStore {
    fn get(&self, term: &str) -> Result<Option<GlossaryEntry>, GlossaryError> {
        Ok(lock(&self.glossary)?.get(term).cloned())
    }

    fn merge(&self, proposals: Vec<(String, GlossaryEntry)>) -> Result<MergeReport, GlossaryError> {
        Ok(lock(&self.glossary)?.merge(proposals))
    }

    fn correct(
        &self,
        term: &str,
        entry: GlossaryEntry,
    ) -> Result<Option<GlossaryEntry>, GlossaryError> {
        Ok(lock(&self.glossary)?.correct(term, entry))
    }

    fn snapshot(&self) -> Result<Glossary, GlossaryError> {
        Ok(lock(&self.glossary)?.clone())
    }

    fn relevant_subset(&self, text: &str) -> Result<GlossarySubset, GlossaryError> {
        Ok(lock(&self.glossary)?.relevant_subset(text))
    }
}

/// Glossary backed by a JSON file.
///
/// The file is the source of truth. Every write re-reads it under the lock and
/// applies the change to what is on disk, so terms recorded by another process
/// since the last read survive and terms removed by hand stay removed. Files
/// are replaced atomically through a sibling temp file.
#[derive(Debug)]
pub struct JsonGlossaryStore {
    path: PathBuf,
    glossary: Mutex<Glossary>,
}

impl JsonGlossaryStore {
    /// Open the glossary at `path`. A missing file is an empty glossary.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GlossaryError> {
        let path = path.into();
        let glossary = read_glossary(&path)?;
        if glossary.is_empty() {
            log::info!("Starting with an empty glossary at {}", path.display());
        } else {
            log::info!(
                "Loaded {} glossary terms from {}",
                glossary.len(),
                path.display()
            );
        }
        Ok(Self {
            path,
            glossary: Mutex::new(glossary),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `update` against the current on-disk glossary and persist it when
    /// `update` reports a change.
    fn update<T>(
        &self,
        update: impl FnOnce(&mut Glossary) -> (T, bool),
    ) -> Result<T, GlossaryError> {
        let mut cached = lock(&self.glossary)?;
        let mut current = read_glossary(&self.path)?;

        let (result, changed) = update(&mut current);
        if changed {
            write_glossary(&self.path, &current)?;
        }
        *cached = current;
        Ok(result)
    }
}

impl GlossaryStore for JsonGlossaryStore {
    fn get(&self, term: &str) -> Result<Option<GlossaryEntry>, GlossaryError> {
        Ok(lock(&self.glossary)?.get(term).cloned())
    }

    fn merge(&self, proposals: Vec<(String, GlossaryEntry)>) -> Result<MergeReport, GlossaryError> {
        let report = self.update(|glossary| {
            let report = glossary.merge(proposals);
            let changed = report.changed();
            (report, changed)
        })?;
        if report.changed() {
            log::debug!("Glossary gained {} terms", report.added.len());
        }
        for term in &report.conflicting {
            log::debug!("Keeping existing rendering for {}", term);
        }
        Ok(report)
    }

    fn correct(
        &self,
        term: &str,
        entry: GlossaryEntry,
    ) -> Result<Option<GlossaryEntry>, GlossaryError> {
        self.update(|glossary| (glossary.correct(term, entry), true))
    }

    fn snapshot(&self) -> Result<Glossary, GlossaryError> {
        Ok(lock(&self.glossary)?.clone())
    }

    fn relevant_subset(&self, text: &str) -> Result<GlossarySubset, GlossaryError> {
        Ok(lock(&self.glossary)?.relevant_subset(text))
    }
}

fn read_glossary(path: &Path) -> Result<Glossary, GlossaryError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Glossary::new()),
        Err(source) => {
            return Err(GlossaryError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Glossary::from_json_str(&raw).map_err(|message| GlossaryError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn write_glossary(path: &Path, glossary: &Glossary) -> Result<(), GlossaryError> {
    let write_err = |source: io::Error| GlossaryError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let body = serde_json::to_string_pretty(glossary).map_err(|e| write_err(e.into()))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(body.as_bytes()).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
