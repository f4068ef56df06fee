use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::llm::{LLMConfig, LLMProvider};

/// Configuration for Video Ad Guard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection run switches
    pub detection: DetectionConfig,

    /// Detection result cache
    pub cache: CacheConfig,

    /// Auto-skip timing
    pub scheduler: SchedulerConfig,

    /// Language model used for detection
    pub llm: LLMConfig,

    /// Speech-to-text fallback
    pub transcription: TranscriptionConfig,

    /// Uploaders that are never analyzed
    pub whitelist: WhitelistConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Master switch; a disabled run tears everything down
    pub enable_extension: bool,

    /// Skip confident detections automatically
    pub auto_skip_ad: bool,

    /// Only query the model when the pinned comment links an official product
    pub restricted_mode: bool,

    /// Transcribe audio when a video has no captions
    pub enable_audio_transcription: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// JSON file backing the cache
    pub path: PathBuf,

    /// Entry lifetime, also the minimum interval between sweeps
    pub ttl_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum wall time between two evaluated ticks
    pub poll_interval_ms: i64,

    /// How far ahead of a range the notification appears
    pub notify_lead_seconds: f64,

    /// Seek this far past the end of a skipped range
    pub skip_overshoot_seconds: f64,

    /// Notification auto-dismiss delay
    pub notification_timeout_ms: i64,

    /// Jump-back lands this far before the range start
    pub jump_back_offset_seconds: f64,

    /// Skip button works from this long before a range
    pub manual_skip_lookahead_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// API key for the transcription service
    pub api_key: Option<String>,

    /// Model to use for transcription
    pub model: String,

    /// Response format requested from the API
    pub response_format: String,

    /// Language hint for transcription
    pub language: Option<String>,

    /// Official endpoint, always tried first
    pub endpoint: String,

    /// Secondary endpoint tried when the official one fails
    pub proxy_endpoint: Option<String>,

    /// Allow falling through to `proxy_endpoint`
    pub allow_proxy_fallback: bool,

    /// Timeout for transcription requests (seconds)
    pub timeout_seconds: u64,

    /// Largest audio upload accepted (bytes)
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// Uploader ids
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive
    pub level: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enable_extension: true,
            auto_skip_ad: false,
            restricted_mode: false,
            enable_audio_transcription: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cache/detection_cache.json"),
            ttl_hours: 24,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            notify_lead_seconds: 3.0,
            skip_overshoot_seconds: 0.1,
            notification_timeout_ms: 5000,
            jump_back_offset_seconds: 1.0,
            manual_skip_lookahead_seconds: 10.0,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "whisper-large-v3-turbo".to_string(),
            response_format: "verbose_json".to_string(),
            language: None,
            endpoint: "https://api.groq.com/openai/v1/audio/transcriptions".to_string(),
            proxy_endpoint: None,
            allow_proxy_fallback: false,
            timeout_seconds: 300,
            max_upload_bytes: 19 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "video_ad_guard=info,warn".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from the first readable candidate file, then apply
    /// `ADGUARD_*` environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = [
            "video-ad-guard.toml",
            "config/video-ad-guard.toml",
            "~/.config/video-ad-guard/config.toml",
            "/etc/video-ad-guard/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env_overrides();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load a specific file, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        config.apply_env_overrides();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let flag = |name: &str| std::env::var(name).ok().and_then(|v| parse_flag(&v));

        if let Some(enabled) = flag("ADGUARD_ENABLE") {
            self.detection.enable_extension = enabled;
        }

        if let Some(auto_skip) = flag("ADGUARD_AUTO_SKIP") {
            self.detection.auto_skip_ad = auto_skip;
        }

        if let Some(restricted) = flag("ADGUARD_RESTRICTED_MODE") {
            self.detection.restricted_mode = restricted;
        }

        if let Some(audio) = flag("ADGUARD_AUDIO_TRANSCRIPTION") {
            self.detection.enable_audio_transcription = audio;
        }

        if let Ok(cache_path) = std::env::var("ADGUARD_CACHE_PATH") {
            self.cache.path = PathBuf::from(cache_path);
        }

        if let Ok(ttl) = std::env::var("ADGUARD_CACHE_TTL_HOURS") {
            self.cache.ttl_hours = ttl.parse().unwrap_or(24);
        }

        if let Ok(api_key) = std::env::var("ADGUARD_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Ok(endpoint) = std::env::var("ADGUARD_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Ok(model) = std::env::var("ADGUARD_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(api_key) = std::env::var("ADGUARD_TRANSCRIPTION_API_KEY") {
            self.transcription.api_key = Some(api_key);
        }

        if let Ok(owners) = std::env::var("ADGUARD_WHITELIST") {
            self.whitelist.owners = owners
                .split(',')
                .map(str::trim)
                .filter(|owner| !owner.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(log_level) = std::env::var("ADGUARD_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_hours == 0 {
            return Err(anyhow!("cache.ttl_hours must be greater than 0"));
        }

        if self.scheduler.poll_interval_ms <= 0 {
            return Err(anyhow!("scheduler.poll_interval_ms must be greater than 0"));
        }

        if self.scheduler.notify_lead_seconds < 0.0 || self.scheduler.skip_overshoot_seconds < 0.0 {
            return Err(anyhow!("scheduler offsets must not be negative"));
        }

        if self.transcription.max_upload_bytes == 0 {
            return Err(anyhow!("transcription.max_upload_bytes must be greater than 0"));
        }

        if self.detection.enable_audio_transcription && self.transcription.api_key.is_none() {
            return Err(anyhow!("API key required when audio transcription is enabled"));
        }

        match self.llm.provider {
            LLMProvider::OpenAI | LLMProvider::Gemini => {
                if self.llm.api_key.is_none() {
                    return Err(anyhow!("API key required for {:?} provider", self.llm.provider));
                }
            }
            LLMProvider::LMStudio => {
                if self.llm.endpoint.is_none() {
                    return Err(anyhow!("Endpoint required for LMStudio provider"));
                }
            }
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Video Ad Guard Configuration:\n\
            - Enabled: {}\n\
            - Auto Skip: {}\n\
            - Restricted Mode: {}\n\
            - Audio Transcription: {}\n\
            - LLM Provider: {:?} ({})\n\
            - Cache: {} (TTL {}h)\n\
            - Whitelisted Uploaders: {}",
            self.detection.enable_extension,
            self.detection.auto_skip_ad,
            self.detection.restricted_mode,
            self.detection.enable_audio_transcription,
            self.llm.provider,
            self.llm.model,
            self.cache.path.display(),
            self.cache.ttl_hours,
            self.whitelist.owners.len()
        )
    }
}
