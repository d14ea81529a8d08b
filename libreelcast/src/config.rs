//! Configuration management for Reelcast
//!
//! Configuration lives in a TOML file (see [`resolve_config_path`]); every
//! section is optional and falls back to defaults that match the limits the
//! platforms document for Shorts and Reels. A handful of environment
//! variables override file values:
//!
//! | Variable | Field |
//! |---|---|
//! | `REELCAST_MAX_ATTEMPTS` | `upload.max_attempts` |
//! | `REELCAST_UPLOAD_TIMEOUT` | `upload.timeout` |
//! | `REELCAST_MAX_DURATION_YOUTUBE` | `youtube.max_duration` |
//! | `REELCAST_MAX_DURATION_INSTAGRAM` | `instagram.max_duration` |
//! | `REELCAST_MAX_FILE_SIZE` | `video.max_file_size` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;
use crate::types::PlatformId;
use crate::validation::{PlatformConstraints, Validator};

/// YouTube only accepts resumable chunks in multiples of 256 KiB
const YOUTUBE_CHUNK_GRANULARITY: u64 = 256 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub enabled: bool,
    pub token_file: String,
    /// OAuth client used to refresh the access token
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub category_id: String,
    #[serde(with = "humantime_duration")]
    pub max_duration: Duration,
    /// Overrides `video.max_file_size` for this platform
    pub max_file_size: Option<u64>,
    pub chunk_size: u64,
    pub notify_subscribers: bool,
    pub made_for_kids: bool,
    pub api_base: String,
    pub oauth_base: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_file: "~/.config/reelcast/youtube_token.json".to_string(),
            client_id: None,
            client_secret: None,
            category_id: "22".to_string(),
            max_duration: Duration::from_secs(60),
            max_file_size: None,
            chunk_size: 4 * 1024 * 1024,
            notify_subscribers: true,
            made_for_kids: false,
            api_base: "https://www.googleapis.com".to_string(),
            oauth_base: "https://oauth2.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub token_file: String,
    /// Instagram professional account id; looked up from the token when unset
    pub account_id: Option<String>,
    #[serde(with = "humantime_duration")]
    pub max_duration: Duration,
    pub max_file_size: Option<u64>,
    pub share_to_feed: bool,
    #[serde(with = "humantime_duration")]
    pub status_poll_interval: Duration,
    pub status_poll_attempts: u32,
    pub graph_base: String,
    pub rupload_base: String,
    pub refresh_base: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_file: "~/.config/reelcast/instagram_token.json".to_string(),
            account_id: None,
            max_duration: Duration::from_secs(90),
            max_file_size: None,
            share_to_feed: true,
            status_poll_interval: Duration::from_secs(5),
            status_poll_attempts: 60,
            graph_base: "https://graph.facebook.com/v21.0".to_string(),
            rupload_base: "https://rupload.facebook.com/ig-api-upload/v21.0".to_string(),
            refresh_base: "https://graph.instagram.com".to_string(),
        }
    }
}

/// Constraints shared by both platforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub max_file_size: u64,
    #[serde(with = "humantime_duration")]
    pub min_duration: Duration,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub aspect_tolerance: f64,
    pub formats: Vec<String>,
    pub codecs: Vec<String>,
    pub ffprobe_path: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_file_size: 500 * 1024 * 1024,
            min_duration: Duration::from_secs(1),
            min_width: 720,
            min_height: 1280,
            max_width: 1080,
            max_height: 1920,
            aspect_tolerance: 0.1,
            formats: vec!["mp4".into(), "mov".into(), "avi".into()],
            codecs: vec!["h264".into(), "hevc".into(), "h265".into()],
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_duration")]
    pub base_delay: Duration,
    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,
    pub jitter: f64,
    /// Budget for one platform's whole publish, retries included
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    /// Budget for a single HTTP call
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,
    pub chunk_retries: u32,
    pub resume_from_checkpoint: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(60),
            chunk_retries: 3,
            resume_from_checkpoint: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// SQLite database for checkpoints; in-memory when unset
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path, without environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `REELCAST_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("REELCAST_MAX_ATTEMPTS") {
            self.upload.max_attempts = parse_number("REELCAST_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("REELCAST_UPLOAD_TIMEOUT") {
            self.upload.timeout = parse_duration_value("REELCAST_UPLOAD_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("REELCAST_MAX_DURATION_YOUTUBE") {
            self.youtube.max_duration =
                parse_duration_value("REELCAST_MAX_DURATION_YOUTUBE", &value)?;
        }
        if let Some(value) = lookup("REELCAST_MAX_DURATION_INSTAGRAM") {
            self.instagram.max_duration =
                parse_duration_value("REELCAST_MAX_DURATION_INSTAGRAM", &value)?;
        }
        if let Some(value) = lookup("REELCAST_MAX_FILE_SIZE") {
            self.video.max_file_size = parse_number("REELCAST_MAX_FILE_SIZE", &value)?;
        }
        Ok(())
    }

    /// Reject values no upload could work with
    pub fn validate(&self) -> Result<()> {
        if self.upload.max_attempts == 0 {
            return Err(invalid("upload.max_attempts", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.upload.jitter) {
            return Err(invalid("upload.jitter", "must be between 0 and 1"));
        }
        if self.upload.base_delay > self.upload.max_delay {
            return Err(invalid("upload.base_delay", "must not exceed upload.max_delay"));
        }
        if self.youtube.chunk_size == 0 || self.youtube.chunk_size % YOUTUBE_CHUNK_GRANULARITY != 0
        {
            return Err(invalid(
                "youtube.chunk_size",
                "must be a non-zero multiple of 262144 bytes",
            ));
        }
        if self.instagram.status_poll_attempts == 0 {
            return Err(invalid("instagram.status_poll_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn is_enabled(&self, platform: PlatformId) -> bool {
        match platform {
            PlatformId::YouTube => self.youtube.enabled,
            PlatformId::Instagram => self.instagram.enabled,
        }
    }

    pub fn constraints_for(&self, platform: PlatformId) -> PlatformConstraints {
        let (max_duration, override_size) = match platform {
            PlatformId::YouTube => (self.youtube.max_duration, self.youtube.max_file_size),
            PlatformId::Instagram => (self.instagram.max_duration, self.instagram.max_file_size),
        };

        PlatformConstraints {
            min_duration: self.video.min_duration,
            max_duration,
            min_width: self.video.min_width,
            min_height: self.video.min_height,
            max_width: self.video.max_width,
            max_height: self.video.max_height,
            max_bytes: override_size.unwrap_or(self.video.max_file_size),
            aspect_tolerance: self.video.aspect_tolerance,
            allowed_containers: lowercase(&self.video.formats),
            allowed_codecs: lowercase(&self.video.codecs),
        }
    }

    pub fn validator(&self) -> Validator {
        Validator::new(
            self.constraints_for(PlatformId::YouTube),
            self.constraints_for(PlatformId::Instagram),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upload.max_attempts,
            base_delay: self.upload.base_delay,
            max_delay: self.upload.max_delay,
            jitter: self.upload.jitter,
        }
    }

    /// Render the default configuration as TOML
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "config".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

fn lowercase(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().trim_start_matches('.').to_lowercase())
        .collect()
}

fn invalid(field: &str, message: &str) -> crate::error::ReelcastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(field, &e.to_string()))
}

/// Accept either bare seconds ("300") or a humantime string ("5m")
fn parse_duration_value(field: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|e| invalid(field, &e.to_string()))
}

/// Resolve the configuration file path (`REELCAST_CONFIG`, else the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REELCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("reelcast").join("config.toml"))
}

/// Serde adapter for humantime strings such as `"30s"` or `"1m 30s"`
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
