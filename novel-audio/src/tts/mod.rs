//! TTS backend trait and types.

pub mod alltalk;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use alltalk::AllTalkBackend;

/// Generated files at or below this size are treated as failed synthesis.
pub const MIN_AUDIO_BYTES: u64 = 100;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS server unreachable: {0}")]
    Request(#[from] reqwest::Error),

    #[error("TTS server returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("TTS server rejected the request: {0}")]
    Rejected(String),

    #[error("generated audio too small ({bytes} bytes)")]
    EmptyAudio { bytes: u64 },

    #[error("failed to write audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for one synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsOptions {
    /// Voice sample the server clones; only its file name is sent
    pub voice_reference: Option<PathBuf>,
    pub language: String,
    /// Playback speed (0.25-2.0, default 1.0)
    pub speed: f32,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            voice_reference: None,
            language: "en".to_string(),
            speed: 1.0,
        }
    }
}

impl TtsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.voice_reference = Some(path.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(0.25, 2.0);
        self
    }

    /// The voice name as the server knows it.
    pub fn voice_name(&self) -> Option<String> {
        self.voice_reference
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// TTS backend trait - all TTS engines implement this.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text` into a WAV file at `output_path`.
    async fn synthesize(
        &self,
        text: &str,
        output_path: &Path,
        options: &TtsOptions,
    ) -> Result<(), TtsError>;

    /// Whether the engine is up and has a model loaded.
    async fn is_ready(&self) -> bool;

    fn name(&self) -> &str;
}
