//! Project directory layout.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::NovelConfig;

pub const RAW_DIR: &str = "01_Raw_Text";
pub const TRANSLATED_DIR: &str = "02_Translated";
pub const AUDIO_DIR: &str = "03_Audio_WAV";
pub const TEMP_CHUNK_DIR: &str = "temp_audio_chunks";
pub const FAILURE_LOG: &str = "failed_chunks.log";
pub const GLOSSARY_FILE: &str = "glossary.json";
pub const VOICE_MAP_FILE: &str = "character_voice_config.json";

/// Which chapter text a stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Raw,
    Translated,
}

/// A novel project rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Open a project, creating the stage directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let project = Self { root: root.into() };
        for dir in [project.raw_dir(), project.translated_dir(), project.audio_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project name, taken from the directory name.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "novel".to_string())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    pub fn translated_dir(&self) -> PathBuf {
        self.root.join(TRANSLATED_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn source_dir(&self, source: TextSource) -> PathBuf {
        match source {
            TextSource::Raw => self.raw_dir(),
            TextSource::Translated => self.translated_dir(),
        }
    }

    /// Scratch directory for one chapter's chunk WAVs.
    pub fn chunk_dir(&self, chapter: &str) -> PathBuf {
        self.root.join(TEMP_CHUNK_DIR).join(sanitize_file_stem(chapter))
    }

    pub fn failure_log(&self) -> PathBuf {
        self.root.join(FAILURE_LOG)
    }

    pub fn glossary_path(&self, config: &NovelConfig) -> PathBuf {
        self.resolve(config.glossary_path.as_deref(), GLOSSARY_FILE)
    }

    pub fn voice_map_path(&self, config: &NovelConfig) -> PathBuf {
        self.resolve(config.voice_map_path.as_deref(), VOICE_MAP_FILE)
    }

    fn resolve(&self, configured: Option<&Path>, default: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.root.join(path),
            None => self.root.join(default),
        }
    }

    pub fn epub_path(&self) -> PathBuf {
        self.root.join(format!("{}.epub", sanitize_file_stem(&self.name())))
    }

    /// Chapter files of a stage, sorted by name.
    pub fn chapters(&self, source: TextSource) -> Result<Vec<PathBuf>> {
        chapter_files(&self.source_dir(source))
    }

    /// Prefer translated text when there is any.
    pub fn default_source(&self) -> TextSource {
        match self.chapters(TextSource::Translated) {
            Ok(files) if !files.is_empty() => TextSource::Translated,
            _ => TextSource::Raw,
        }
    }
}

/// `.txt` files directly inside `dir`, sorted by file name.
pub fn chapter_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("txt")) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

/// Replace everything but word characters, `.` and `-` with `_`.
pub fn sanitize_file_stem(name: &str) -> String {
    let re = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^\w.-]").expect("static regex is valid"));
    re.replace_all(name.trim(), "_").into_owned()
}

/// File stem of a chapter path.
pub fn chapter_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path().join("My Novel")).unwrap();
        assert!(project.raw_dir().is_dir());
        assert!(project.translated_dir().is_dir());
        assert!(project.audio_dir().is_dir());
        assert_eq!(project.name(), "My Novel");
        assert!(project.epub_path().ends_with("My_Novel.epub"));
    }

    #[test]
    fn test_chapters_sorted_txt_only() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        for name in ["ch_002.txt", "ch_010.txt", "ch_001.txt", "notes.md"] {
            fs::write(project.raw_dir().join(name), "text").unwrap();
        }

        let names: Vec<String> = project
            .chapters(TextSource::Raw)
            .unwrap()
            .iter()
            .map(|p| chapter_name(p))
            .collect();
        assert_eq!(names, vec!["ch_001", "ch_002", "ch_010"]);
    }

    #[test]
    fn test_default_source() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.default_source(), TextSource::Raw);
        fs::write(project.translated_dir().join("ch_001.txt"), "x").unwrap();
        assert_eq!(project.default_source(), TextSource::Translated);
    }

    #[test]
    fn test_glossary_path() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        let mut config = NovelConfig::default();
        assert_eq!(project.glossary_path(&config), dir.path().join("glossary.json"));

        config.glossary_path = Some(PathBuf::from("names.json"));
        assert_eq!(project.glossary_path(&config), dir.path().join("names.json"));
    }

    #[test]
    fn test_voice_map_path() {
        let dir = TempDir::new().unwrap();
        let project = Project::open(dir.path()).unwrap();
        let mut config = NovelConfig::default();
        assert_eq!(
            project.voice_map_path(&config),
            dir.path().join("character_voice_config.json")
        );

        config.voice_map_path = Some(PathBuf::from("/shared/voices.json"));
        assert_eq!(project.voice_map_path(&config), PathBuf::from("/shared/voices.json"));
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("Chapter 1: Start?"), "Chapter_1__Start_");
        assert_eq!(sanitize_file_stem("ch-001.part"), "ch-001.part");
        assert_eq!(sanitize_file_stem("第一章"), "第一章");
    }
}
