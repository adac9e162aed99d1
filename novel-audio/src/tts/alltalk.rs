//! AllTalk TTS server backend.
//!
//! Generation is a form POST to `/api/tts-generate`; the server writes the WAV
//! on its side and replies with a URL the file is then downloaded from.

use super::{MIN_AUDIO_BYTES, TtsBackend, TtsError, TtsOptions};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7851";

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output_file_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct AllTalkBackend {
    base_url: String,
    client: reqwest::Client,
}

impl AllTalkBackend {
    /// `request_timeout` bounds a whole generation; long chunks on slow GPUs take minutes.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request generation and return the server-side URL of the result.
    async fn generate(
        &self,
        text: &str,
        file_stem: &str,
        options: &TtsOptions,
    ) -> Result<String, TtsError> {
        let speed = options.speed.to_string();
        let voice = options.voice_name().unwrap_or_default();
        let form = [
            ("text_input", text),
            ("character_voice_gen", voice.as_str()),
            ("language", options.language.as_str()),
            ("output_file_name", file_stem),
            ("speed", speed.as_str()),
        ];

        let response = self
            .client
            .post(self.url("/api/tts-generate"))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TtsError::Server {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: GenerateResponse = response.json().await?;
        match body.output_file_url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(TtsError::Rejected(
                body.error
                    .or(body.status)
                    .unwrap_or_else(|| "no output_file_url in reply".to_string()),
            )),
        }
    }

    /// Stream a generated file to disk.
    async fn download(&self, file_url: &str, destination: &Path) -> Result<u64, TtsError> {
        let url = if file_url.starts_with("http://") || file_url.starts_with("https://") {
            file_url.to_string()
        } else {
            self.url(file_url)
        };

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::Server {
                status: status.as_u16(),
                message: format!("download of {} failed", url),
            });
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(destination)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;

        Ok(written)
    }
}

#[async_trait]
impl TtsBackend for AllTalkBackend {
    async fn synthesize(
        &self,
        text: &str,
        output_path: &Path,
        options: &TtsOptions,
    ) -> Result<(), TtsError> {
        let file_stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk".to_string());

        let file_url = self.generate(text, &file_stem, options).await?;
        let written = self.download(&file_url, output_path).await?;

        if written <= MIN_AUDIO_BYTES {
            let _ = std::fs::remove_file(output_path);
            return Err(TtsError::EmptyAudio { bytes: written });
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        let response = self
            .client
            .get(self.url("/api/ready"))
            .timeout(READY_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => {
                r.text().await.map(|t| t.trim() == "Ready").unwrap_or(false)
            }
            Ok(r) => {
                log::debug!("AllTalk ready check returned HTTP {}", r.status());
                false
            }
            Err(e) => {
                log::debug!("AllTalk ready check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "alltalk"
    }
}
