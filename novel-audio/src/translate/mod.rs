//! Glossary-aware translation.
//!
//! The driver half ([`prepare_context`], [`apply_result`]) is synchronous and
//! knows nothing about the model; [`Translator`] wires it to an
//! [`llm_client::LlmProvider`].

mod extract;
mod prompt;
mod translator;

use llm_client::LlmError;
use thiserror::Error;

use crate::glossary::{GlossaryEntry, GlossaryError, GlossaryStore, GlossarySubset, MergeReport};

pub use extract::{DelimitedJsonExtractor, JSON_SEPARATOR, NoExtraction, ParsedResponse, TermExtractor};
pub use prompt::{LanguagePair, build_request};
pub use translator::{ChapterTranslation, TranslatedChunk, TranslationOptions, Translator};

#[derive(Debug, Error)]
pub enum TranslateError {
    /// The provider call failed in a way worth retrying later
    #[error("transient translation failure: {0}")]
    Transient(#[source] LlmError),

    /// The provider refused the request (auth, bad request, configuration)
    #[error("translation request rejected: {0}")]
    Rejected(#[source] LlmError),

    #[error("malformed translation response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Glossary(#[from] GlossaryError),
}

impl TranslateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<LlmError> for TranslateError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidResponse(message) => Self::MalformedResponse(message),
            err if err.is_transient() => Self::Transient(err),
            err => Self::Rejected(err),
        }
    }
}

/// A source chunk together with the glossary entries it mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedChunk {
    pub chunk: String,
    pub subset: GlossarySubset,
}

/// Select the glossary entries relevant to `chunk`.
pub fn prepare_context(chunk: &str, store: &dyn GlossaryStore) -> Result<PreparedChunk, TranslateError> {
    let subset = store.relevant_subset(chunk)?;
    log::debug!(
        "Sending {} relevant glossary terms for a {}-char chunk",
        subset.len(),
        chunk.chars().count()
    );
    Ok(PreparedChunk {
        chunk: chunk.to_string(),
        subset,
    })
}

/// Record newly extracted terms, first seen wins.
///
/// A blank translation means the response carried nothing usable; it is
/// rejected before the glossary is touched.
pub fn apply_result(
    translated_chunk: &str,
    extracted_terms: Vec<(String, GlossaryEntry)>,
    store: &dyn GlossaryStore,
) -> Result<MergeReport, TranslateError> {
    if translated_chunk.trim().is_empty() {
        return Err(TranslateError::MalformedResponse(
            "response contained no translation".to_string(),
        ));
    }
    if extracted_terms.is_empty() {
        return Ok(MergeReport::default());
    }
    Ok(store.merge(extracted_terms)?)
}
