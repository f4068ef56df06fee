/// Remote speech-to-text over an OpenAI-compatible transcription API
use super::{TranscriptSegment, TranscriptionResult};
use crate::collaborators::Transcriber;
use crate::config::TranscriptionConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Downloaded audio ready for upload
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Supplies the audio track of a video
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn fetch_audio(&self, video_id: &str) -> Result<AudioClip>;
}

/// Uploads audio to an ordered list of endpoints, falling through on failure
pub struct RemoteTranscriber<A: AudioSource> {
    config: TranscriptionConfig,
    audio: A,
    client: reqwest::Client,
}

impl<A: AudioSource> RemoteTranscriber<A> {
    pub fn new(config: TranscriptionConfig, audio: A) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Transcription API key not configured"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            audio,
            client,
        })
    }

    /// Endpoints in the order they are tried
    pub fn endpoints(&self) -> Vec<&str> {
        endpoint_order(&self.config)
    }

    /// Transcribe an already fetched clip
    pub async fn transcribe_clip(&self, clip: AudioClip) -> Result<TranscriptionResult> {
        check_upload_size(clip.bytes.len(), self.config.max_upload_bytes)?;

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Transcription API key not configured"))?;

        let endpoints = self.endpoints();
        let mut last_error = None;

        for (index, endpoint) in endpoints.iter().enumerate() {
            debug!("Uploading {} bytes to {}", clip.bytes.len(), endpoint);

            match self.upload(endpoint, api_key, &clip).await {
                Ok(result) => {
                    if index > 0 {
                        info!("✅ Transcription succeeded via fallback endpoint {}", endpoint);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!("Transcription endpoint {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(anyhow!("Transcription API call failed: {}", e)),
            None => Err(anyhow!("No transcription endpoint configured")),
        }
    }

    async fn upload(&self, endpoint: &str, api_key: &str, clip: &AudioClip) -> Result<TranscriptionResult> {
        let part = reqwest::multipart::Part::bytes(clip.bytes.clone())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", self.config.response_format.clone());

        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} - {}", status, text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl<A: AudioSource> Transcriber for RemoteTranscriber<A> {
    async fn transcribe(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let clip = self.audio.fetch_audio(video_id).await?;
        info!(
            "🎙️ Transcribing {} ({:.2}MB)",
            clip.file_name,
            clip.bytes.len() as f64 / 1024.0 / 1024.0
        );

        let result = self.transcribe_clip(clip).await?;
        Ok(result.segments)
    }
}

fn endpoint_order(config: &TranscriptionConfig) -> Vec<&str> {
    let mut endpoints = vec![config.endpoint.as_str()];
    if config.allow_proxy_fallback {
        if let Some(proxy) = &config.proxy_endpoint {
            endpoints.push(proxy.as_str());
        }
    }
    endpoints
}

fn check_upload_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(anyhow!(
            "Audio file too large ({:.2}MB), limit is {:.0}MB",
            size as f64 / 1024.0 / 1024.0,
            limit as f64 / 1024.0 / 1024.0
        ));
    }
    Ok(())
}
