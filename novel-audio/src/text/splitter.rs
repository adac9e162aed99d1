//! Cascading chunk splitter for TTS requests.
//!
//! Text is cut on line boundaries first, then on sentence boundaries for lines
//! that are too long, and finally at whitespace (or a hard character count) for
//! sentences that are still too long. All lengths are counted in `char`s.

/// Token ceiling of the TTS backend per request.
pub const FALLBACK_TOKEN_LIMIT: usize = 170;

/// Average characters per backend token, used to turn the ceiling into characters.
pub const AVG_CHARS_PER_TOKEN: f64 = 1.9;

/// Default maximum chunk length in characters (170 tokens at 1.9 chars/token).
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 323;

/// Sentence terminators. ASCII ones only end a sentence before whitespace.
const TERMINATORS: &[char] = &[
    '.', '!', '?', '。', '！', '？', '…', '‼', '⁇', '⁈', '⁉', '｡',
];

/// Closing marks that stay attached to the sentence they close.
const CLOSERS: &[char] = &[
    '"', '\'', '”', '’', ')', ']', '}', '」', '』', '）', '】', '》', '〉', '»',
];

/// One level of the splitting cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Whole lines (or groups of lines)
    Line,
    /// Groups of sentences within a line
    Sentence,
    /// Whitespace or hard character cuts
    Forced,
}

impl Tier {
    /// The next coarser tier, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Line => Some(Tier::Sentence),
            Tier::Sentence => Some(Tier::Forced),
            Tier::Forced => None,
        }
    }

    /// Short tag used in chunk file names.
    pub fn tag(self) -> &'static str {
        match self {
            Tier::Line => "l",
            Tier::Sentence => "s",
            Tier::Forced => "f",
        }
    }
}

/// Splits text into chunks no longer than `max_len` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    max_len: usize,
    group_lines: bool,
}

impl Default for ChunkSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_LENGTH)
    }
}

impl ChunkSplitter {
    /// Create a splitter; a `max_len` of zero is treated as one.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            group_lines: false,
        }
    }

    /// Accumulate consecutive short lines into one chunk instead of one chunk per line.
    pub fn with_line_grouping(mut self, group_lines: bool) -> Self {
        self.group_lines = group_lines;
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Split `text` into ordered, non-empty chunks.
    ///
    /// Text that already fits (and is not blank) comes back as a single chunk
    /// equal to the input. Blank text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.max_len {
            return vec![text.to_string()];
        }
        self.split_lines(text)
    }

    /// Re-split a chunk that was rejected at `failed` into pieces of the next tier.
    ///
    /// The sentence tier yields one piece per sentence; the forced tier halves
    /// the bound so every piece is strictly shorter than the input. Returns
    /// `None` when there is no coarser tier left.
    pub fn resplit(&self, text: &str, failed: Tier) -> Option<(Tier, Vec<String>)> {
        let tier = failed.next()?;
        let pieces = match tier {
            Tier::Sentence => sentence_spans(text)
                .into_iter()
                .flat_map(|(start, end)| {
                    let sentence = &text[start..end];
                    if char_len(sentence) > self.max_len {
                        forced_split(sentence, self.max_len)
                    } else {
                        vec![sentence.to_string()]
                    }
                })
                .collect(),
            Tier::Line | Tier::Forced => {
                let trimmed = text.trim();
                let half = char_len(trimmed).div_ceil(2).max(1);
                forced_split(trimmed, half.min(self.max_len))
            }
        };
        Some((tier, pieces))
    }

    fn split_lines(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        // Byte span of the pending group of lines.
        let mut group: Option<(usize, usize)> = None;

        let mut offset = 0;
        for line in text.split('\n') {
            let line_start = offset;
            offset += line.len() + 1;

            let Some((start, end)) = trimmed_span(text, line_start, line_start + line.len())
            else {
                continue;
            };
            let line = &text[start..end];

            if char_len(line) > self.max_len {
                flush(text, &mut group, &mut chunks);
                chunks.extend(self.split_sentences(line));
                continue;
            }

            if !self.group_lines {
                chunks.push(line.to_string());
                continue;
            }

            accumulate(text, &mut group, (start, end), self.max_len, &mut chunks);
        }

        flush(text, &mut group, &mut chunks);
        chunks
    }

    fn split_sentences(&self, line: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for (start, end) in sentence_spans(line) {
            let sentence = &line[start..end];

            if char_len(sentence) > self.max_len {
                flush(line, &mut current, &mut chunks);
                chunks.extend(forced_split(sentence, self.max_len));
                continue;
            }

            accumulate(line, &mut current, (start, end), self.max_len, &mut chunks);
        }

        flush(line, &mut current, &mut chunks);
        chunks
    }
}

/// Split `text` with the default tier behaviour.
pub fn split(text: &str, max_len: usize) -> Vec<String> {
    ChunkSplitter::new(max_len).split(text)
}

/// Estimate backend tokens for `text`.
pub fn estimate_tokens(text: &str) -> usize {
    (char_len(text) as f64 / AVG_CHARS_PER_TOKEN.max(1.0)).ceil() as usize
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn flush(source: &str, span: &mut Option<(usize, usize)>, chunks: &mut Vec<String>) {
    if let Some((start, end)) = span.take() {
        chunks.push(source[start..end].to_string());
    }
}

/// Extend the pending span with `next` if the result fits, else start a new one.
fn accumulate(
    source: &str,
    span: &mut Option<(usize, usize)>,
    next: (usize, usize),
    max_len: usize,
    chunks: &mut Vec<String>,
) {
    if let Some((span_start, _)) = *span {
        if char_len(&source[span_start..next.1]) <= max_len {
            *span = Some((span_start, next.1));
            return;
        }
    }
    flush(source, span, chunks);
    *span = Some(next);
}

/// Byte span of `source[start..end]` without surrounding whitespace.
fn trimmed_span(source: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &source[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some((start + lead, start + lead + trimmed.len()))
}

/// Byte spans of the sentences in `line`, terminators and closers included.
fn sentence_spans(line: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut spans = Vec::new();
    let mut sentence_start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !TERMINATORS.contains(&chars[i].1) {
            i += 1;
            continue;
        }

        let mut j = i;
        let mut wide = false;
        while j < chars.len() && TERMINATORS.contains(&chars[j].1) {
            wide |= !chars[j].1.is_ascii();
            j += 1;
        }
        while j < chars.len() && CLOSERS.contains(&chars[j].1) {
            j += 1;
        }

        let at_end = j == chars.len();
        if at_end || wide || chars[j].1.is_whitespace() {
            let end = if at_end { line.len() } else { chars[j].0 };
            if let Some(span) = trimmed_span(line, sentence_start, end) {
                spans.push(span);
            }
            sentence_start = end;
        }
        i = j;
    }

    if let Some(span) = trimmed_span(line, sentence_start, line.len()) {
        spans.push(span);
    }
    spans
}

/// Cut at the last whitespace within the bound, or at exactly `max_len` chars.
fn forced_split(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        if chars.len() - start <= max_len {
            let rest: String = chars[start..].iter().collect();
            chunks.push(rest.trim_end().to_string());
            break;
        }

        let hard_end = start + max_len;
        match (start + 1..=hard_end).rev().find(|&k| chars[k].is_whitespace()) {
            Some(cut) => {
                let piece: String = chars[start..cut].iter().collect();
                chunks.push(piece.trim_end().to_string());
                start = cut + 1;
            }
            None => {
                chunks.push(chars[start..hard_end].iter().collect());
                start = hard_end;
            }
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn without_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(split("", 100).is_empty());
        assert!(split("  \n\n \t ", 100).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let text = "Hello world.\nSecond line here.";
        assert_eq!(split(text, 200), vec![text.to_string()]);
    }

    #[test]
    fn test_exact_length_is_one_chunk() {
        let text = "abcdefghij klmnop";
        assert_eq!(split(text, text.chars().count()), vec![text.to_string()]);
    }

    #[test]
    fn test_line_tier_one_chunk_per_line() {
        let text = "First line.\n\nSecond line.\nThird line.";
        let chunks = split(text, 20);
        assert_eq!(chunks, vec!["First line.", "Second line.", "Third line."]);
    }

    #[test]
    fn test_line_grouping() {
        let text = "One.\nTwo.\nThree.\nFour is longer.";
        let chunks = ChunkSplitter::new(16).with_line_grouping(true).split(text);
        assert_eq!(chunks, vec!["One.\nTwo.\nThree.", "Four is longer."]);
    }

    #[test]
    fn test_sentence_tier_scenario() {
        let text = "Hello world. ".repeat(50);
        assert_eq!(text.chars().count(), 650);

        let chunks = split(&text, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "too long: {}", chunk);
            assert!(chunk.ends_with('.'), "not at a sentence boundary: {}", chunk);
        }
        assert_eq!(chunks[0], "Hello world. ".repeat(7).trim_end());
        assert_eq!(without_whitespace(&chunks.concat()), without_whitespace(&text));
    }

    #[test]
    fn test_forced_tier_scenario() {
        let text = "A".repeat(500);
        let chunks = split(&text, 100);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn test_forced_tier_prefers_whitespace() {
        let text = "aaaa bbbb cccc dddd";
        let chunks = forced_split(text, 10);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd"]);
    }

    #[test]
    fn test_forced_cut_on_boundary_whitespace() {
        // Whitespace right after the bound still allows a full-length chunk.
        let chunks = forced_split("abcde fghij", 5);
        assert_eq!(chunks, vec!["abcde", "fghij"]);
    }

    #[test]
    fn test_sentence_keeps_terminator_and_closing_quote() {
        let spans = sentence_spans("\"Run!\" she said. Why? Because.");
        let line = "\"Run!\" she said. Why? Because.";
        let sentences: Vec<&str> = spans.iter().map(|&(s, e)| &line[s..e]).collect();
        assert_eq!(sentences, vec!["\"Run!\"", "she said.", "Why?", "Because."]);
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        let line = "Pi is 3.14 roughly. Yes.";
        let sentences: Vec<&str> = sentence_spans(line)
            .iter()
            .map(|&(s, e)| &line[s..e])
            .collect();
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Yes."]);
    }

    #[test]
    fn test_cjk_sentences() {
        let line = "李火走进了城门。他看见了清河市！真的吗？";
        let sentences: Vec<&str> = sentence_spans(line)
            .iter()
            .map(|&(s, e)| &line[s..e])
            .collect();
        assert_eq!(sentences, vec!["李火走进了城门。", "他看见了清河市！", "真的吗？"]);

        let chunks = split(line, 10);
        assert_eq!(chunks, vec!["李火走进了城门。", "他看见了清河市！", "真的吗？"]);
    }

    #[test]
    fn test_long_sentence_falls_to_forced_tier() {
        let text = format!("Short one. {} End.", "word ".repeat(40).trim_end());
        let chunks = split(&text, 30);
        assert_eq!(chunks.first().map(String::as_str), Some("Short one."));
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(without_whitespace(&chunks.concat()), without_whitespace(&text));
    }

    #[test]
    fn test_zero_max_len_treated_as_one() {
        let chunks = split("abc", 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tier_cascade() {
        assert_eq!(Tier::Line.next(), Some(Tier::Sentence));
        assert_eq!(Tier::Sentence.next(), Some(Tier::Forced));
        assert_eq!(Tier::Forced.next(), None);
    }

    #[test]
    fn test_resplit_to_sentences() {
        let splitter = ChunkSplitter::new(100);
        let (tier, pieces) = splitter
            .resplit("One sentence. Another one! A third?", Tier::Line)
            .unwrap();
        assert_eq!(tier, Tier::Sentence);
        assert_eq!(pieces, vec!["One sentence.", "Another one!", "A third?"]);
    }

    #[test]
    fn test_resplit_forced_halves() {
        let splitter = ChunkSplitter::new(100);
        let (tier, pieces) = splitter.resplit("abcdefgh", Tier::Sentence).unwrap();
        assert_eq!(tier, Tier::Forced);
        assert_eq!(pieces, vec!["abcd", "efgh"]);
        assert!(splitter.resplit("abcd", Tier::Forced).is_none());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 3);
        assert_eq!(estimate_tokens(&"a".repeat(19)), 10);
    }

    proptest! {
        #[test]
        fn prop_chunks_within_bound(text in "[a-zA-Z .!?\n]{0,600}", max_len in 1usize..120) {
            for chunk in split(&text, max_len) {
                prop_assert!(!chunk.trim().is_empty());
                prop_assert!(chunk.chars().count() <= max_len);
            }
        }

        #[test]
        fn prop_no_text_lost(text in "\\PC{0,400}", max_len in 1usize..80) {
            let chunks = ChunkSplitter::new(max_len).with_line_grouping(true).split(&text);
            prop_assert_eq!(without_whitespace(&chunks.concat()), without_whitespace(&text));
        }

        #[test]
        fn prop_short_text_unchanged(text in "[a-z]{1,10}( [a-z]{1,10}){0,5}") {
            let len = text.chars().count();
            prop_assert_eq!(split(&text, len), vec![text.clone()]);
            prop_assert_eq!(split(&text, len + 5), vec![text]);
        }
    }
}
