//! Core types for Reelcast

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ReelcastError;
use crate::media::{ProbedMedia, VideoSource};

/// Target publishing platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    YouTube,
    Instagram,
}

impl PlatformId {
    pub const ALL: [PlatformId; 2] = [PlatformId::YouTube, PlatformId::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::YouTube => "youtube",
            PlatformId::Instagram => "instagram",
        }
    }

    /// Whether the platform accepts a publish-at timestamp
    pub fn supports_scheduling(&self) -> bool {
        matches!(self, PlatformId::YouTube)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = ReelcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(PlatformId::YouTube),
            "instagram" => Ok(PlatformId::Instagram),
            other => Err(ReelcastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: youtube, instagram",
                other
            ))),
        }
    }
}

/// Parse a comma-separated platform list, dropping duplicates but keeping order
pub fn parse_platform_list(input: &str) -> crate::Result<Vec<PlatformId>> {
    let mut platforms = Vec::new();
    for part in input.split(',').filter(|p| !p.trim().is_empty()) {
        let platform: PlatformId = part.parse()?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
            Privacy::Private => "private",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = ReelcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "unlisted" => Ok(Privacy::Unlisted),
            "private" => Ok(Privacy::Private),
            other => Err(ReelcastError::InvalidInput(format!(
                "Invalid privacy '{}'. Valid options: public, unlisted, private",
                other
            ))),
        }
    }
}

/// Cover image for an Instagram Reel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverFrame {
    /// Publicly reachable image URL
    Url(String),
    /// Offset into the video, in milliseconds
    OffsetMs(u64),
}

/// Caller-declared metadata for one upload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    pub schedule_time: Option<DateTime<Utc>>,
    pub instagram_caption: Option<String>,
    pub cover: Option<CoverFrame>,
    /// Custom YouTube thumbnail image (JPEG or PNG)
    pub thumbnail: Option<PathBuf>,
    pub share_to_story: bool,
    pub share_to_facebook: bool,
}

impl VideoMetadata {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_schedule(mut self, at: DateTime<Utc>) -> Self {
        self.schedule_time = Some(at);
        self
    }

    pub fn with_instagram_caption(mut self, caption: impl Into<String>) -> Self {
        self.instagram_caption = Some(caption.into());
        self
    }

    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail = Some(path.into());
        self
    }

    /// Trim tags and drop empties and duplicates, keeping first occurrence order
    pub(crate) fn normalized(mut self) -> Self {
        let mut seen: Vec<String> = Vec::new();
        for tag in self.tags.drain(..) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        self.tags = seen;
        self.title = self.title.trim().to_string();
        self
    }
}

/// A validated, immutable upload request.
///
/// Only the validator constructs these; everything downstream shares one
/// instance behind an `Arc`.
#[derive(Debug)]
pub struct UploadRequest {
    source: VideoSource,
    metadata: VideoMetadata,
    media: Option<ProbedMedia>,
    fingerprint: String,
    platforms: Vec<PlatformId>,
}

impl UploadRequest {
    pub(crate) fn new(
        source: VideoSource,
        metadata: VideoMetadata,
        media: Option<ProbedMedia>,
        fingerprint: String,
        platforms: Vec<PlatformId>,
    ) -> Self {
        Self {
            source,
            metadata,
            media,
            fingerprint,
            platforms,
        }
    }

    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Probed properties; `None` when probing failed
    pub fn media(&self) -> Option<&ProbedMedia> {
        self.media.as_ref()
    }

    /// SHA-256 of the video content, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Requested platforms in caller order
    pub fn platforms(&self) -> &[PlatformId] {
        &self.platforms
    }
}

/// Why a platform did not end in success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Transient,
    RateLimited,
    Rejected,
    Cancelled,
    TimedOut,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Terminal result of publishing to one platform
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub platform: PlatformId,
    pub success: bool,
    pub video_id: Option<String>,
    pub video_url: Option<String>,
    pub error: Option<OutcomeError>,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl UploadOutcome {
    pub fn success(
        platform: PlatformId,
        video_id: String,
        video_url: String,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            platform,
            success: true,
            video_id: Some(video_id),
            video_url: Some(video_url),
            error: None,
            elapsed,
            attempts,
        }
    }

    pub fn failure(
        platform: PlatformId,
        kind: ErrorKind,
        message: impl Into<String>,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            platform,
            success: false,
            video_id: None,
            video_url: None,
            error: Some(OutcomeError {
                kind,
                message: message.into(),
            }),
            elapsed,
            attempts,
        }
    }

    pub fn validation_failure(platform: PlatformId, message: impl Into<String>) -> Self {
        Self::failure(platform, ErrorKind::Validation, message, Duration::ZERO, 0)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    platform: PlatformId,
    success: bool,
    video_id: Option<&'a str>,
    video_url: Option<&'a str>,
    error_kind: Option<ErrorKind>,
    error_message: Option<&'a str>,
    upload_duration: f64,
    attempts: u32,
}

impl Serialize for UploadOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OutcomeRecord {
            platform: self.platform,
            success: self.success,
            video_id: self.video_id.as_deref(),
            video_url: self.video_url.as_deref(),
            error_kind: self.error_kind(),
            error_message: self.error.as_ref().map(|e| e.message.as_str()),
            upload_duration: self.elapsed.as_secs_f64(),
            attempts: self.attempts,
        }
        .serialize(serializer)
    }
}

/// Outcomes for one upload call, one per requested platform in request order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UploadResult {
    outcomes: Vec<UploadOutcome>,
}

impl UploadResult {
    pub(crate) fn from_ordered(outcomes: Vec<UploadOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[UploadOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<UploadOutcome> {
        self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, platform: PlatformId) -> Option<&UploadOutcome> {
        self.outcomes.iter().find(|o| o.platform == platform)
    }

    pub fn successes(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.success)
    }
}
