use llm_client::LlmRequest;

use super::{PreparedChunk, TermExtractor};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that follows instructions precisely.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self {
            source: "Chinese".to_string(),
            target: "English".to_string(),
        }
    }
}

/// Build the completion request for one prepared chunk.
pub fn build_request(
    prepared: &PreparedChunk,
    languages: &LanguagePair,
    extractor: &dyn TermExtractor,
    temperature: f32,
) -> LlmRequest {
    let LanguagePair { source, target } = languages;

    let mut prompt = format!(
        "You are an expert {source}-to-{target} translator of web novels.\n\
         Translate the {source} text below into natural, fluent {target}. \
         Names and places listed in the glossary MUST be rendered exactly as given there.\n"
    );
    if extractor.extracts_terms() {
        prompt.push_str(
            "Also identify character and place names in the text that are NOT in the glossary.\n",
        );
    }

    prompt.push_str("\n--- GLOSSARY (terms in this text) ---\n");
    prompt.push_str(&prepared.subset.to_prompt_json());
    prompt.push_str("\n\n--- RESPONSE FORMAT ---\n");
    prompt.push_str(&extractor.format_rules(target));
    prompt.push('\n');
    prompt.push_str(&format!("\n--- {} TEXT ---\n", source.to_uppercase()));
    prompt.push_str(&prepared.chunk);
    prompt.push_str("\n--- END OF TEXT ---\n");

    LlmRequest::new(prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(temperature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::{Glossary, GlossaryEntry};
    use crate::translate::{DelimitedJsonExtractor, JSON_SEPARATOR, NoExtraction};

    fn prepared(text: &str) -> PreparedChunk {
        let mut glossary = Glossary::new();
        glossary.merge(vec![("李火".to_string(), GlossaryEntry::new("Li Huo"))]);
        PreparedChunk {
            chunk: text.to_string(),
            subset: glossary.relevant_subset(text),
        }
    }

    #[test]
    fn test_request_carries_subset_and_text() {
        let request = build_request(
            &prepared("李火笑了。"),
            &LanguagePair::default(),
            &DelimitedJsonExtractor,
            0.2,
        );
        assert!(request.prompt.contains(r#"{"李火":"Li Huo"}"#));
        assert!(request.prompt.contains("李火笑了。"));
        assert!(request.prompt.contains(JSON_SEPARATOR));
        assert!(request.prompt.contains("--- CHINESE TEXT ---"));
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.system_prompt.is_some());
    }

    #[test]
    fn test_empty_subset_renders_empty_object() {
        let request = build_request(
            &prepared("他笑了。"),
            &LanguagePair::default(),
            &NoExtraction,
            0.2,
        );
        assert!(request.prompt.contains("---\n{}\n"));
        assert!(!request.prompt.contains(JSON_SEPARATOR));
        assert!(!request.prompt.contains("NOT in the glossary"));
    }

    #[test]
    fn test_unrelated_chunk_carries_no_names() {
        let request = build_request(
            &prepared("他笑了。"),
            &LanguagePair::default(),
            &DelimitedJsonExtractor,
            0.2,
        );
        assert!(request.prompt.contains(JSON_SEPARATOR));
        assert!(!request.prompt.contains("Li Huo"));
        for name in ["清河市", "Qinghe City", "兰波", "Lan Bo"] {
            assert!(!request.prompt.contains(name), "prompt mentions {}", name);
        }
    }

    #[test]
    fn test_language_pair_used() {
        let languages = LanguagePair {
            source: "Korean".to_string(),
            target: "German".to_string(),
        };
        let request = build_request(&prepared("text"), &languages, &NoExtraction, 0.5);
        assert!(request.prompt.contains("Korean-to-German"));
        assert!(request.prompt.contains("--- KOREAN TEXT ---"));
    }
}
