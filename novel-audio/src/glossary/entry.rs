//! Glossary entries and their JSON representations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a glossary term names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    Character,
    Place,
    Term,
}

impl TermKind {
    /// Section key used by the nested `{"characters": .., "places": ..}` layout.
    fn from_section(key: &str) -> Option<Self> {
        match key {
            "characters" => Some(Self::Character),
            "places" => Some(Self::Place),
            "terms" => Some(Self::Term),
            _ => None,
        }
    }
}

/// The fixed target-language rendering of one source term.
///
/// Serialized as a bare string when only `target` is set, as an object otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredEntry", into = "StoredEntry")]
pub struct GlossaryEntry {
    pub target: String,
    pub kind: Option<TermKind>,
    /// Romanized reading of the source term (pinyin, romaji)
    pub reading: Option<String>,
    pub pronoun: Option<String>,
}

impl GlossaryEntry {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: None,
            reading: None,
            pronoun: None,
        }
    }

    pub fn with_kind(mut self, kind: TermKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_reading(mut self, reading: impl Into<String>) -> Self {
        self.reading = Some(reading.into());
        self
    }

    pub fn with_pronoun(mut self, pronoun: impl Into<String>) -> Self {
        self.pronoun = Some(pronoun.into());
        self
    }

    /// Build an entry from a model-produced JSON value.
    ///
    /// Accepts a bare string or an object carrying `target`/`english_name`
    /// (falling back to `name`, then the reading). Returns `None` when no
    /// usable target is present.
    pub fn from_json(value: &Value, kind: Option<TermKind>) -> Option<Self> {
        let entry = match value {
            Value::String(target) => GlossaryEntry::new(target.trim()),
            Value::Object(fields) => {
                let text = |key: &str| {
                    fields
                        .get(key)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                let reading = text("reading").or_else(|| text("pinyin"));
                let target = text("target")
                    .or_else(|| text("english_name"))
                    .or_else(|| text("name"))
                    .or_else(|| reading.clone())?;
                GlossaryEntry {
                    target,
                    kind: text("kind").and_then(|k| parse_kind(&k)),
                    reading,
                    pronoun: text("pronoun"),
                }
            }
            _ => return None,
        };

        if entry.target.is_empty() {
            return None;
        }
        Some(match kind {
            Some(kind) => entry.with_kind(kind),
            None => entry,
        })
    }
}

fn parse_kind(raw: &str) -> Option<TermKind> {
    match raw.to_lowercase().as_str() {
        "character" | "person" => Some(TermKind::Character),
        "place" | "location" => Some(TermKind::Place),
        "term" => Some(TermKind::Term),
        _ => None,
    }
}

/// Read `(term, entry)` pairs from either the flat `{term: entry}` layout or the
/// nested `{"characters": {..}, "places": {..}}` layout.
///
/// Values that carry no usable target are skipped; a non-object root is an error.
pub fn entries_from_json(value: &Value) -> Result<Vec<(String, GlossaryEntry)>, String> {
    let root = value
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, found {}", json_type(value)))?;

    let nested = !root.is_empty()
        && root
            .iter()
            .all(|(key, v)| TermKind::from_section(key).is_some() && v.is_object());

    let mut entries = Vec::new();
    if nested {
        for (section, terms) in root {
            let kind = TermKind::from_section(section);
            for (term, details) in terms.as_object().into_iter().flatten() {
                push_entry(&mut entries, term, details, kind);
            }
        }
    } else {
        for (term, details) in root {
            push_entry(&mut entries, term, details, None);
        }
    }
    Ok(entries)
}

fn push_entry(
    entries: &mut Vec<(String, GlossaryEntry)>,
    term: &str,
    details: &Value,
    kind: Option<TermKind>,
) {
    let term = term.trim();
    if term.is_empty() {
        return;
    }
    match GlossaryEntry::from_json(details, kind) {
        Some(entry) => entries.push((term.to_string(), entry)),
        None => log::warn!("Ignoring glossary term without a translation: {}", term),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// On-disk shape of an entry.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Plain(String),
    Detailed(DetailedEntry),
}

#[derive(Serialize, Deserialize)]
struct DetailedEntry {
    #[serde(alias = "english_name")]
    target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<TermKind>,
    #[serde(default, alias = "pinyin", skip_serializing_if = "Option::is_none")]
    reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pronoun: Option<String>,
}

impl From<StoredEntry> for GlossaryEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Plain(target) => GlossaryEntry::new(target),
            StoredEntry::Detailed(d) => GlossaryEntry {
                target: d.target,
                kind: d.kind,
                reading: d.reading,
                pronoun: d.pronoun,
            },
        }
    }
}

impl From<GlossaryEntry> for StoredEntry {
    fn from(entry: GlossaryEntry) -> Self {
        if entry.kind.is_none() && entry.reading.is_none() && entry.pronoun.is_none() {
            StoredEntry::Plain(entry.target)
        } else {
            StoredEntry::Detailed(DetailedEntry {
                target: entry.target,
                kind: entry.kind,
                reading: entry.reading,
                pronoun: entry.pronoun,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_entry_serializes_as_string() {
        let entry = GlossaryEntry::new("Li Huo");
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!("Li Huo"));
    }

    #[test]
    fn test_detailed_entry_roundtrip() {
        let entry = GlossaryEntry::new("Lan Bo")
            .with_kind(TermKind::Character)
            .with_reading("Lan Bo")
            .with_pronoun("he/him");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"target": "Lan Bo", "kind": "character", "reading": "Lan Bo", "pronoun": "he/him"})
        );
        let back: GlossaryEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_from_json_model_schema() {
        let value = json!({"pinyin": "Qinghe Shi", "english_name": "Qinghe City"});
        let entry = GlossaryEntry::from_json(&value, Some(TermKind::Place)).unwrap();
        assert_eq!(entry.target, "Qinghe City");
        assert_eq!(entry.reading.as_deref(), Some("Qinghe Shi"));
        assert_eq!(entry.kind, Some(TermKind::Place));
    }

    #[test]
    fn test_from_json_falls_back_to_reading() {
        let entry = GlossaryEntry::from_json(&json!({"pinyin": "Li Huo"}), None).unwrap();
        assert_eq!(entry.target, "Li Huo");
    }

    #[test]
    fn test_from_json_rejects_empty() {
        assert!(GlossaryEntry::from_json(&json!(""), None).is_none());
        assert!(GlossaryEntry::from_json(&json!({"pronoun": "she/her"}), None).is_none());
        assert!(GlossaryEntry::from_json(&json!(42), None).is_none());
    }

    #[test]
    fn test_entries_from_nested_layout() {
        let value = json!({
            "characters": {"兰波": {"pinyin": "Lan Bo", "english_name": "Lan Bo", "pronoun": "he/him"}},
            "places": {"清河市": {"pinyin": "Qinghe Shi", "english_name": "Qinghe City"}}
        });
        let entries = entries_from_json(&value).unwrap();
        assert_eq!(entries.len(), 2);
        let (term, entry) = entries.iter().find(|(t, _)| t == "清河市").unwrap();
        assert_eq!(term, "清河市");
        assert_eq!(entry.kind, Some(TermKind::Place));
    }

    #[test]
    fn test_entries_from_flat_layout() {
        let value = json!({"李火": "Li Huo", "characters": "Characters"});
        let entries = entries_from_json(&value).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|(_, e)| e.kind.is_none()));
    }

    #[test]
    fn test_entries_from_non_object() {
        assert!(entries_from_json(&json!(["a", "b"])).is_err());
    }
}
