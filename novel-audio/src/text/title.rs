//! Chapter heading normalization.

use regex::Regex;
use std::sync::OnceLock;

static CHAPTER_HEADING: OnceLock<Regex> = OnceLock::new();
static NUMBERED_HEADING: OnceLock<Regex> = OnceLock::new();

fn chapter_heading() -> &'static Regex {
    CHAPTER_HEADING.get_or_init(|| {
        Regex::new(r"(?i)^chapter\s*(\d+)\s*[:\-–—]?\s*(.*)$").expect("static regex is valid")
    })
}

fn numbered_heading() -> &'static Regex {
    NUMBERED_HEADING
        .get_or_init(|| Regex::new(r"^(\d+)\s+(.*)$").expect("static regex is valid"))
}

/// Rewrite the first line of a chapter to `Chapter N - Title`.
///
/// Handles `Chapter 12: Title`, `Chapter 12 – Title`, `chapter 12` and bare
/// `12 Title`; anything else is returned unchanged. The number loses any
/// leading zeros and the word is always `Chapter`.
pub fn reformat_chapter_title(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let (first_line, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (text, None),
    };
    let first_line = first_line.trim_end_matches('\r');

    let line = first_line.trim();
    let caps = match chapter_heading().captures(line) {
        Some(caps) => caps,
        None => match numbered_heading().captures(line) {
            Some(caps) => caps,
            None => return text.to_string(),
        },
    };
    let number = match caps[1].parse::<u32>() {
        Ok(number) => number,
        Err(_) => return text.to_string(),
    };
    let title = caps[2].trim();
    let heading = if title.is_empty() {
        format!("Chapter {}", number)
    } else {
        format!("Chapter {} - {}", number, title)
    };

    match rest {
        Some(rest) => format!("{}\n{}", heading, rest),
        None => heading,
    }
}

/// Split chapter text into its title line and body.
pub fn split_title(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once('\n') {
        Some((title, body)) => (title.trim(), body.trim()),
        None => (text.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colon_heading() {
        assert_eq!(
            reformat_chapter_title("Chapter 12: The Snake Fairy\nBody text."),
            "Chapter 12 - The Snake Fairy\nBody text."
        );
    }

    #[test]
    fn test_dash_variants() {
        assert_eq!(
            reformat_chapter_title("Chapter 3 – Qinghe City"),
            "Chapter 3 - Qinghe City"
        );
        assert_eq!(reformat_chapter_title("chapter7—Return"), "Chapter 7 - Return");
    }

    #[test]
    fn test_heading_word_and_number_canonical() {
        assert_eq!(reformat_chapter_title("CHAPTER 007: Home\nText"), "Chapter 7 - Home\nText");
        assert_eq!(reformat_chapter_title("chapter 4"), "Chapter 4");
    }

    #[test]
    fn test_heading_without_title() {
        assert_eq!(reformat_chapter_title("Chapter 9\nText"), "Chapter 9\nText");
    }

    #[test]
    fn test_numbered_heading() {
        assert_eq!(
            reformat_chapter_title("045 Lan Bo Arrives\nHe came."),
            "Chapter 45 - Lan Bo Arrives\nHe came."
        );
    }

    #[test]
    fn test_other_text_unchanged() {
        let text = "It was a dark night.\nChapter 2: not a heading here";
        assert_eq!(reformat_chapter_title(text), text);
        assert_eq!(reformat_chapter_title(""), "");
    }

    #[test]
    fn test_split_title() {
        assert_eq!(
            split_title("\nChapter 1 - Start\n\nFirst paragraph.\n"),
            ("Chapter 1 - Start", "First paragraph.")
        );
        assert_eq!(split_title("Only a title"), ("Only a title", ""));
    }
}
