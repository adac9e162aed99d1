//! Per-speaker voices for dialogue-tagged chapters.
//!
//! A tagged chapter marks who speaks with an upper-case prefix:
//!
//! ```text
//! NARRATOR: The door creaked open.
//! CAMILLA (f): Who's there?
//! ```
//!
//! Untagged lines continue the current speaker; text before the first tag
//! belongs to the narrator. The voice map is a JSON object keyed by speaker
//! name, with an optional `DEFAULT` entry for speakers it does not list.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const NARRATOR: &str = "NARRATOR";
pub const DEFAULT_SPEAKER: &str = "DEFAULT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Voice sample the server clones for this speaker
    #[serde(default)]
    pub xtts_speaker_wav: Option<PathBuf>,
}

/// Speaker name to voice lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceMap {
    speakers: BTreeMap<String, VoiceProfile>,
}

impl VoiceMap {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, VoiceProfile> =
            serde_json::from_str(raw).context("Voice map is not a JSON object of speakers")?;
        let speakers = parsed
            .into_iter()
            .map(|(name, profile)| (speaker_key(&name), profile))
            .collect();
        Ok(Self { speakers })
    }

    /// Load the map at `path`, `None` when there is no file.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let map = Self::from_json_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::info!("Loaded {} speaker voices from {}", map.len(), path.display());
        Ok(Some(map))
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    /// Voice for `speaker`, falling back to the `DEFAULT` entry.
    ///
    /// `None` means the configured narration voice is used.
    pub fn voice_for(&self, speaker: &str) -> Option<&Path> {
        let key = speaker_key(speaker);
        if let Some(voice) = self.profile_voice(&key) {
            return Some(voice);
        }
        if !self.speakers.contains_key(&key) {
            log::warn!("No voice configured for {}, using {}", key, DEFAULT_SPEAKER);
        }
        self.profile_voice(DEFAULT_SPEAKER)
    }

    fn profile_voice(&self, key: &str) -> Option<&Path> {
        self.speakers
            .get(key)
            .and_then(|profile| profile.xtts_speaker_wav.as_deref())
    }
}

/// Consecutive text spoken by one speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerBlock {
    pub speaker: String,
    pub text: String,
}

static SPEAKER_LINE: OnceLock<Regex> = OnceLock::new();
static GENDER_MARK: OnceLock<Regex> = OnceLock::new();

/// Lookup key for a speaker tag: `"Camilla (f)"` becomes `"CAMILLA"`.
pub fn speaker_key(tag: &str) -> String {
    let re = GENDER_MARK
        .get_or_init(|| Regex::new(r"\s*\([fm]\)\s*$").expect("static regex is valid"));
    re.replace(tag.trim(), "").trim().to_uppercase()
}

fn speaker_tag(line: &str) -> Option<(&str, &str)> {
    let re = SPEAKER_LINE.get_or_init(|| {
        Regex::new(r"^\s*([A-Z\s]+(?:\([fm]\))?):\s*(.*)$").expect("static regex is valid")
    });
    let caps = re.captures(line)?;
    let speaker = caps.get(1)?.as_str().trim();
    if speaker.is_empty() {
        return None;
    }
    Some((speaker, caps.get(2)?.as_str().trim()))
}

/// Group a tagged chapter into speaker blocks.
///
/// A blank line or a change of speaker ends a block.
pub fn speaker_blocks(text: &str) -> Vec<SpeakerBlock> {
    let mut blocks = Vec::new();
    let mut speaker: Option<&str> = None;
    let mut lines: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            flush(&mut blocks, speaker, &mut lines);
            continue;
        }

        match speaker_tag(raw) {
            Some((tag, rest)) => {
                if speaker != Some(tag) {
                    flush(&mut blocks, speaker, &mut lines);
                    speaker = Some(tag);
                }
                if !rest.is_empty() {
                    lines.push(rest);
                }
            }
            None => {
                if speaker.is_none() {
                    speaker = Some(NARRATOR);
                }
                lines.push(line);
            }
        }
    }
    flush(&mut blocks, speaker, &mut lines);
    blocks
}

fn flush(blocks: &mut Vec<SpeakerBlock>, speaker: Option<&str>, lines: &mut Vec<&str>) {
    if let Some(speaker) = speaker {
        let text = lines.join("\n");
        let text = text.trim();
        if !text.is_empty() {
            blocks.push(SpeakerBlock {
                speaker: speaker.to_string(),
                text: text.to_string(),
            });
        }
    }
    lines.clear();
}
