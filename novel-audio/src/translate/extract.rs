//! Splitting a model reply into the translation and newly found terms.

use regex::Regex;
use std::sync::OnceLock;

use super::TranslateError;
use crate::glossary::{GlossaryEntry, entries_from_json};

/// Separates the translation from the term data in a delimited reply.
pub const JSON_SEPARATOR: &str = "---JSON---";

/// A reply taken apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub translation: String,
    pub terms: Vec<(String, GlossaryEntry)>,
}

/// Strategy for pulling glossary terms out of a model reply.
pub trait TermExtractor: Send + Sync {
    /// Whether replies are expected to carry new terms at all.
    fn extracts_terms(&self) -> bool {
        true
    }

    /// Output-format rules appended to the prompt.
    fn format_rules(&self, target_language: &str) -> String;

    fn parse(&self, raw: &str) -> Result<ParsedResponse, TranslateError>;
}

/// Translation, then `---JSON---`, then `{"characters": {..}, "places": {..}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedJsonExtractor;

static CODE_FENCE: OnceLock<Regex> = OnceLock::new();

fn code_fence() -> &'static Regex {
    CODE_FENCE.get_or_init(|| Regex::new(r"^```(?:json)?\s*|\s*```$").expect("static regex is valid"))
}

impl TermExtractor for DelimitedJsonExtractor {
    fn format_rules(&self, target_language: &str) -> String {
        format!(
            "- Reply in two parts separated by a line containing only '{sep}'.\n\
             - Part 1 is the {lang} translation and nothing else.\n\
             - Part 2 is one JSON object listing only NEW names: \
             {{\"characters\": {{term: {{\"pinyin\", \"english_name\", \"pronoun\"}}}}, \
             \"places\": {{term: {{\"pinyin\", \"english_name\"}}}}}}.\n\
             - Example: {{\"characters\": {{\"<source term>\": {{\"pinyin\": \"...\", \"english_name\": \"...\", \"pronoun\": \"...\"}}}}, \
             \"places\": {{\"<source term>\": {{\"pinyin\": \"...\", \"english_name\": \"...\"}}}}}}\n\
             - Use an empty object for a section with nothing new.",
            sep = JSON_SEPARATOR,
            lang = target_language,
        )
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, TranslateError> {
        let (translation, data) = raw.split_once(JSON_SEPARATOR).ok_or_else(|| {
            TranslateError::MalformedResponse(format!("missing {} separator", JSON_SEPARATOR))
        })?;

        let translation = translation.trim().to_string();
        let data = code_fence().replace_all(data.trim(), "");
        let data = data.trim();
        if data.is_empty() {
            return Ok(ParsedResponse {
                translation,
                terms: Vec::new(),
            });
        }

        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| TranslateError::MalformedResponse(format!("term data is not JSON: {}", e)))?;
        let terms = entries_from_json(&value).map_err(TranslateError::MalformedResponse)?;

        Ok(ParsedResponse { translation, terms })
    }
}

/// Plain translation; never yields terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtraction;

impl TermExtractor for NoExtraction {
    fn extracts_terms(&self) -> bool {
        false
    }

    fn format_rules(&self, target_language: &str) -> String {
        format!(
            "- Reply with the {} translation only, no commentary.",
            target_language
        )
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, TranslateError> {
        Ok(ParsedResponse {
            translation: raw.trim().to_string(),
            terms: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::TermKind;

    #[test]
    fn test_parse_delimited_reply() {
        let raw = "Lan Bo walked into Qinghe City.\n---JSON---\n\
                   {\"characters\": {\"兰波\": {\"pinyin\": \"Lan Bo\", \"english_name\": \"Lan Bo\", \"pronoun\": \"he/him\"}}, \
                   \"places\": {\"清河市\": {\"pinyin\": \"Qinghe Shi\", \"english_name\": \"Qinghe City\"}}}";
        let parsed = DelimitedJsonExtractor.parse(raw).unwrap();

        assert_eq!(parsed.translation, "Lan Bo walked into Qinghe City.");
        assert_eq!(parsed.terms.len(), 2);
        let (_, place) = parsed.terms.iter().find(|(t, _)| t == "清河市").unwrap();
        assert_eq!(place.target, "Qinghe City");
        assert_eq!(place.kind, Some(TermKind::Place));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "He nodded.\n---JSON---\n```json\n{\"characters\": {\"李火\": {\"english_name\": \"Li Huo\"}}, \"places\": {}}\n```\n";
        let parsed = DelimitedJsonExtractor.parse(raw).unwrap();
        assert_eq!(parsed.translation, "He nodded.");
        assert_eq!(parsed.terms[0].0, "李火");
        assert_eq!(parsed.terms[0].1.target, "Li Huo");
    }

    #[test]
    fn test_parse_fenced_json_without_language_tag() {
        let raw = "Text.\n---JSON---\n```\n{\"李火\": \"Li Huo\"}\n```";
        let parsed = DelimitedJsonExtractor.parse(raw).unwrap();
        assert_eq!(parsed.terms, vec![("李火".to_string(), GlossaryEntry::new("Li Huo"))]);
    }

    #[test]
    fn test_backticks_inside_json_are_kept() {
        let raw = "Text.\n---JSON---\n{\"李火\": \"Li ```Huo\"}";
        let parsed = DelimitedJsonExtractor.parse(raw).unwrap();
        assert_eq!(parsed.terms[0].1.target, "Li ```Huo");
    }

    #[test]
    fn test_parse_flat_terms() {
        let raw = "Text.\n---JSON---\n{\"李火\": \"Li Huo\"}";
        let parsed = DelimitedJsonExtractor.parse(raw).unwrap();
        assert_eq!(parsed.terms, vec![("李火".to_string(), GlossaryEntry::new("Li Huo"))]);
    }

    #[test]
    fn test_parse_empty_data_section() {
        let parsed = DelimitedJsonExtractor.parse("Text.\n---JSON---\n").unwrap();
        assert_eq!(parsed.translation, "Text.");
        assert!(parsed.terms.is_empty());

        let parsed = DelimitedJsonExtractor
            .parse("Text.\n---JSON---\n{\"characters\": {}, \"places\": {}}")
            .unwrap();
        assert!(parsed.terms.is_empty());
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        let err = DelimitedJsonExtractor.parse("Just a translation.").unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));
    }

    #[test]
    fn test_bad_json_is_malformed() {
        let err = DelimitedJsonExtractor
            .parse("Text.\n---JSON---\n{\"characters\": ")
            .unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));

        let err = DelimitedJsonExtractor.parse("Text.\n---JSON---\n[1]").unwrap_err();
        assert!(matches!(err, TranslateError::MalformedResponse(_)));
    }

    #[test]
    fn test_no_extraction() {
        let parsed = NoExtraction.parse("  Hello.\n---JSON---\n{} ").unwrap();
        assert!(parsed.terms.is_empty());
        assert!(parsed.translation.starts_with("Hello."));
    }

    #[test]
    fn test_format_rules_mention_separator() {
        let rules = DelimitedJsonExtractor.format_rules("English");
        assert!(rules.contains(JSON_SEPARATOR));
        assert!(rules.contains("English"));
    }

    #[test]
    fn test_format_rules_carry_no_real_terms() {
        let rules = DelimitedJsonExtractor.format_rules("English");
        assert!(rules.contains("<source term>"));
        assert!(!rules.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)));
    }
}
