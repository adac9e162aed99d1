//! Glossary of fixed term translations.
//!
//! A glossary maps a source-language term to the one rendering that every
//! chapter must use. Entries are append-only under [`Glossary::merge`]: the
//! first rendering recorded for a term wins and later proposals are ignored.
//! [`Glossary::correct`] is the only way to change an existing entry.

mod entry;
mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use entry::{GlossaryEntry, TermKind, entries_from_json};
pub use store::{GlossaryError, GlossaryStore, JsonGlossaryStore, MemoryGlossaryStore};

/// A complete glossary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Glossary {
    entries: BTreeMap<String, GlossaryEntry>,
}

/// What a merge did with each proposed term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Terms that were new and are now recorded
    pub added: Vec<String>,
    /// Terms already recorded with a different rendering; the existing one was kept
    pub conflicting: Vec<String>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

impl Glossary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a glossary file body, flat or nested layout.
    ///
    /// Duplicate terms across sections keep their first occurrence.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let mut glossary = Self::new();
        glossary.merge(entries_from_json(&value)?);
        Ok(glossary)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&GlossaryEntry> {
        self.entries.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GlossaryEntry)> {
        self.entries.iter()
    }

    /// Record each term not yet present. Existing terms are never overwritten.
    pub fn merge<I>(&mut self, proposals: I) -> MergeReport
    where
        I: IntoIterator<Item = (String, GlossaryEntry)>,
    {
        let mut report = MergeReport::default();
        for (term, entry) in proposals {
            let term = term.trim().to_string();
            if term.is_empty() || entry.target.trim().is_empty() {
                continue;
            }
            match self.entries.get(&term) {
                Some(existing) => {
                    if existing.target != entry.target && !report.conflicting.contains(&term) {
                        report.conflicting.push(term);
                    }
                }
                None => {
                    self.entries.insert(term.clone(), entry);
                    report.added.push(term);
                }
            }
        }
        report
    }

    /// Replace the rendering of a term, returning the previous one.
    pub fn correct(&mut self, term: &str, entry: GlossaryEntry) -> Option<GlossaryEntry> {
        self.entries.insert(term.trim().to_string(), entry)
    }

    /// The entries whose source term occurs in `text`.
    pub fn relevant_subset(&self, text: &str) -> GlossarySubset {
        let entries = self
            .entries
            .iter()
            .filter(|(term, _)| text.contains(term.as_str()))
            .map(|(term, entry)| (term.clone(), entry.clone()))
            .collect();
        GlossarySubset { entries }
    }
}

/// The slice of a glossary relevant to one chunk of source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlossarySubset {
    entries: BTreeMap<String, GlossaryEntry>,
}

impl GlossarySubset {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&GlossaryEntry> {
        self.entries.get(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Compact JSON for embedding in a prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Glossary {
        let mut glossary = Glossary::new();
        glossary.merge(vec![
            ("李火".to_string(), GlossaryEntry::new("Li Huo")),
            (
                "清河市".to_string(),
                GlossaryEntry::new("Qinghe City").with_kind(TermKind::Place),
            ),
        ]);
        glossary
    }

    #[test]
    fn test_first_seen_wins() {
        let mut glossary = Glossary::new();
        let first = glossary.merge(vec![("李火".to_string(), GlossaryEntry::new("Li Huo"))]);
        assert_eq!(first.added, vec!["李火".to_string()]);

        let second = glossary.merge(vec![("李火".to_string(), GlossaryEntry::new("Raging Fire"))]);
        assert!(second.added.is_empty());
        assert_eq!(second.conflicting, vec!["李火".to_string()]);
        assert_eq!(glossary.get("李火").unwrap().target, "Li Huo");
    }

    #[test]
    fn test_merge_within_one_batch_keeps_first() {
        let mut glossary = Glossary::new();
        let report = glossary.merge(vec![
            ("兰波".to_string(), GlossaryEntry::new("Lan Bo")),
            ("兰波".to_string(), GlossaryEntry::new("Rambo")),
        ]);
        assert_eq!(report.added.len(), 1);
        assert_eq!(glossary.get("兰波").unwrap().target, "Lan Bo");
    }

    #[test]
    fn test_identical_proposal_is_not_a_conflict() {
        let mut glossary = sample();
        let report = glossary.merge(vec![("李火".to_string(), GlossaryEntry::new("Li Huo"))]);
        assert!(!report.changed());
        assert!(report.conflicting.is_empty());
    }

    #[test]
    fn test_blank_terms_ignored() {
        let mut glossary = Glossary::new();
        let report = glossary.merge(vec![
            ("  ".to_string(), GlossaryEntry::new("Nothing")),
            ("李火".to_string(), GlossaryEntry::new(" ")),
        ]);
        assert!(!report.changed());
        assert!(glossary.is_empty());
    }

    #[test]
    fn test_correct_overrides() {
        let mut glossary = sample();
        let previous = glossary.correct("李火", GlossaryEntry::new("Li Fire"));
        assert_eq!(previous.unwrap().target, "Li Huo");
        assert_eq!(glossary.get("李火").unwrap().target, "Li Fire");
    }

    #[test]
    fn test_relevant_subset() {
        let glossary = sample();
        let subset = glossary.relevant_subset("李火走进了房间。");
        assert_eq!(subset.len(), 1);
        assert!(subset.get("李火").is_some());
        assert!(subset.get("清河市").is_none());

        assert!(glossary.relevant_subset("没有人。").is_empty());
    }

    #[test]
    fn test_subset_prompt_json_is_compact() {
        let subset = sample().relevant_subset("李火 in 清河市");
        let json = subset.to_prompt_json();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["李火"], "Li Huo");
        assert_eq!(value["清河市"]["target"], "Qinghe City");
    }

    #[test]
    fn test_from_json_str_legacy_layout() {
        let raw = r#"{
            "characters": {"兰波": {"pinyin": "Lan Bo", "english_name": "Lan Bo", "pronoun": "he/him"}},
            "places": {}
        }"#;
        let glossary = Glossary::from_json_str(raw).unwrap();
        assert_eq!(glossary.len(), 1);
        let entry = glossary.get("兰波").unwrap();
        assert_eq!(entry.kind, Some(TermKind::Character));
        assert_eq!(entry.pronoun.as_deref(), Some("he/him"));
    }

    #[test]
    fn test_from_json_str_flat_roundtrip() {
        let glossary = sample();
        let raw = serde_json::to_string_pretty(&glossary).unwrap();
        assert_eq!(Glossary::from_json_str(&raw).unwrap(), glossary);
        assert!(Glossary::from_json_str("").unwrap().is_empty());
        assert!(Glossary::from_json_str("[1, 2]").is_err());
    }
}
