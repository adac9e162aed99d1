use regex::Regex;
use std::sync::OnceLock;

use llm_client::LlmProvider;

use super::{
    DelimitedJsonExtractor, LanguagePair, TermExtractor, TranslateError, apply_result,
    build_request, prepare_context,
};
use crate::glossary::{GlossaryStore, MergeReport};
use crate::text::{ChunkSplitter, reformat_chapter_title};

/// Translation settings, taken from `[translation]` in the config.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOptions {
    pub languages: LanguagePair,
    pub temperature: f32,
    /// Longest source chunk sent in one request, in characters
    pub chunk_length: usize,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            languages: LanguagePair::default(),
            temperature: 0.2,
            chunk_length: 6000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedChunk {
    pub text: String,
    pub report: MergeReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterTranslation {
    pub text: String,
    /// Terms added to the glossary while translating this chapter
    pub added_terms: Vec<String>,
}

/// Translates text through an LLM provider, keeping names consistent via a glossary.
pub struct Translator {
    provider: Box<dyn LlmProvider>,
    extractor: Box<dyn TermExtractor>,
    options: TranslationOptions,
}

static LEFTOVER_MARKERS: OnceLock<Regex> = OnceLock::new();

fn leftover_markers() -> &'static Regex {
    LEFTOVER_MARKERS.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*-*\s*(?:[a-z]+\s+)?translation\s*(?:start|end)\s*-*\s*$|^\s*[a-z]+\s+translation\s+only:\s*",
        )
        .expect("static regex is valid")
    })
}

impl Translator {
    pub fn new(provider: Box<dyn LlmProvider>, options: TranslationOptions) -> Self {
        Self {
            provider,
            extractor: Box::new(DelimitedJsonExtractor),
            options,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn TermExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    /// Translate one chunk and record any new terms.
    ///
    /// On error the glossary is left exactly as it was.
    pub async fn translate_chunk(
        &self,
        chunk: &str,
        store: &dyn GlossaryStore,
    ) -> Result<TranslatedChunk, TranslateError> {
        let prepared = prepare_context(chunk, store)?;
        let request = build_request(
            &prepared,
            &self.options.languages,
            self.extractor.as_ref(),
            self.options.temperature,
        );

        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            log::debug!(
                "{} used {} input / {} output tokens",
                response.model,
                usage.input_tokens,
                usage.output_tokens
            );
        }

        let parsed = self.extractor.parse(&response.content)?;
        let text = clean_translation(&parsed.translation);
        let report = apply_result(&text, parsed.terms, store)?;
        for term in &report.added {
            log::debug!("New glossary term: {}", term);
        }

        Ok(TranslatedChunk { text, report })
    }

    /// Translate a whole chapter, chunk by chunk.
    ///
    /// Each chunk sees the terms learned from the ones before it. The first
    /// line of the result is rewritten to `Chapter N - Title`.
    pub async fn translate_chapter(
        &self,
        text: &str,
        store: &dyn GlossaryStore,
    ) -> Result<ChapterTranslation, TranslateError> {
        let splitter = ChunkSplitter::new(self.options.chunk_length).with_line_grouping(true);
        let chunks = splitter.split(text);
        if chunks.is_empty() {
            return Ok(ChapterTranslation::default());
        }

        let mut parts = Vec::with_capacity(chunks.len());
        let mut added_terms = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            log::info!(
                "Translating part {}/{} ({} chars) with {}",
                i + 1,
                chunks.len(),
                chunk.chars().count(),
                self.provider.name()
            );
            let translated = self.translate_chunk(chunk, store).await?;
            added_terms.extend(translated.report.added);
            parts.push(translated.text);
        }

        Ok(ChapterTranslation {
            text: reformat_chapter_title(&parts.join("\n")),
            added_terms,
        })
    }
}

/// Remove format markers some models echo around the translation.
fn clean_translation(text: &str) -> String {
    leftover_markers().replace_all(text, "").trim().to_string()
}
