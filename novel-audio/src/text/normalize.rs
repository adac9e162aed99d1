//! Text normalization ahead of speech synthesis.

/// Characters the TTS model mispronounces or chokes on, and their replacements.
const SPEECH_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{00ab}', "\""),  // Left-pointing double angle quote
    ('\u{00bb}', "\""),  // Right-pointing double angle quote
    ('\u{2026}', "..."), // Ellipsis
    ('\u{2014}', "-"),   // Em dash
    ('\u{2013}', "-"),   // En dash
    ('\u{2012}', "-"),   // Figure dash
    ('\u{2015}', "-"),   // Horizontal bar
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{3000}', " "),   // Ideographic space
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
];

/// Prepare chapter text for the TTS backend.
///
/// Replaces typographic punctuation with ASCII, drops control characters
/// (newlines and tabs survive), forces a space after a sentence terminator that
/// runs straight into a word, and collapses runs of blank space. Line breaks are
/// kept so the splitter can still cut on them.
pub fn normalize_for_speech(text: &str) -> String {
    let mut replaced = String::with_capacity(text.len());

    for c in text.chars() {
        match SPEECH_REPLACEMENTS.iter().find(|(ch, _)| *ch == c) {
            Some((_, replacement)) => replaced.push_str(replacement),
            None if c == '\n' || c == '\t' || !c.is_control() => replaced.push(c),
            None => {}
        }
    }

    collapse_whitespace(&space_after_terminators(&replaced))
}

/// "sentence.Sentence" makes the model rush; "sentence. Sentence" does not.
fn space_after_terminators(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        result.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|next| next.is_alphabetic()) {
            result.push(' ');
        }
    }

    result
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut newline_count = 0;

    for c in text.chars() {
        if c == '\n' {
            newline_count += 1;
            pending_space = false;
            if newline_count <= 2 {
                result.push('\n');
            }
        } else if c == ' ' || c == '\t' {
            pending_space = true;
        } else {
            if pending_space && newline_count == 0 && !result.is_empty() {
                result.push(' ');
            }
            pending_space = false;
            newline_count = 0;
            result.push(c);
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_quotes() {
        let text = "\u{201c}Hello,\u{201d} said Li Huo. \u{2018}It\u{2019}s fine.\u{2019}";
        assert_eq!(
            normalize_for_speech(text),
            "\"Hello,\" said Li Huo. 'It's fine.'"
        );
    }

    #[test]
    fn test_dashes_and_ellipsis() {
        assert_eq!(normalize_for_speech("one–two—three"), "one-two-three");
        assert_eq!(normalize_for_speech("Wait… what?"), "Wait... what?");
    }

    #[test]
    fn test_space_forced_after_terminator() {
        assert_eq!(
            normalize_for_speech("He left.She stayed!Why?Because"),
            "He left. She stayed! Why? Because"
        );
    }

    #[test]
    fn test_decimals_untouched() {
        assert_eq!(normalize_for_speech("It cost 3.50 coins."), "It cost 3.50 coins.");
    }

    #[test]
    fn test_whitespace_collapsed_newlines_kept() {
        let text = "Hello   world \n\n\n\n  New\tparagraph ";
        assert_eq!(normalize_for_speech(text), "Hello world\n\nNew paragraph");
    }

    #[test]
    fn test_control_and_zero_width_removed() {
        let text = "Hello\u{0}World\u{7}\u{200b}Test\u{feff}\r";
        assert_eq!(normalize_for_speech(text), "HelloWorldTest");
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(normalize_for_speech(" \n\t \n"), "");
    }
}
