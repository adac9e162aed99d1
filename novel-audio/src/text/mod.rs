//! Text processing: speech normalization, chunk splitting and chapter headings.

mod normalize;
pub mod splitter;
mod title;

pub use normalize::normalize_for_speech;
pub use splitter::{ChunkSplitter, Tier};
pub use title::{reformat_chapter_title, split_title};

/// One TTS request's worth of chapter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 1-based position within the chapter
    pub number: usize,
    pub text: String,
}

impl TextChunk {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Normalize a chapter for speech and cut it into numbered chunks.
pub fn process_chapter(text: &str, splitter: &ChunkSplitter) -> Vec<TextChunk> {
    splitter
        .split(&normalize_for_speech(text))
        .into_iter()
        .zip(1..)
        .map(|(text, number)| TextChunk { number, text })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_numbered_from_one() {
        let text = "First sentence.\nSecond sentence.\nThird sentence.";
        let chunks = process_chapter(text, &ChunkSplitter::new(20));
        let numbers: Vec<usize> = chunks.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(chunks[1].text, "Second sentence.");
        assert_eq!(chunks[1].char_count(), 16);
    }

    #[test]
    fn test_chunks_are_normalized() {
        let chunks = process_chapter("\u{201C}Wait\u{2026}\u{201D}", &ChunkSplitter::default());
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].text.contains('\u{2026}'));
    }

    #[test]
    fn test_process_empty_chapter() {
        assert!(process_chapter("", &ChunkSplitter::default()).is_empty());
        assert!(process_chapter(" \n\n ", &ChunkSplitter::default()).is_empty());
    }
}
