//! Pre-flight validation of a video against per-platform constraints
//!
//! Every rule is evaluated against probed values and tagged with the platform
//! it governs. Rule failures are recorded in the [`ValidationReport`], never
//! raised; only structural problems (no platforms, empty title, unreadable
//! source) come back as errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ReelcastError, Result};
use crate::media::{MediaProbe, ProbedMedia, VideoSource};
use crate::types::{PlatformId, UploadRequest, VideoMetadata};

/// Width/height of a 9:16 portrait frame
const PORTRAIT_RATIO: f64 = 9.0 / 16.0;
const SQUARE_RATIO: f64 = 1.0;

/// Limits one platform imposes on uploaded content
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConstraints {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub max_bytes: u64,
    pub aspect_tolerance: f64,
    pub allowed_containers: Vec<String>,
    pub allowed_codecs: Vec<String>,
}

impl PlatformConstraints {
    pub fn youtube_default() -> Self {
        Self::shared_defaults(Duration::from_secs(60))
    }

    pub fn instagram_default() -> Self {
        Self::shared_defaults(Duration::from_secs(90))
    }

    pub fn default_for(platform: PlatformId) -> Self {
        match platform {
            PlatformId::YouTube => Self::youtube_default(),
            PlatformId::Instagram => Self::instagram_default(),
        }
    }

    fn shared_defaults(max_duration: Duration) -> Self {
        Self {
            min_duration: Duration::from_secs(1),
            max_duration,
            min_width: 720,
            min_height: 1280,
            max_width: 1080,
            max_height: 1920,
            max_bytes: 500 * 1024 * 1024,
            aspect_tolerance: 0.1,
            allowed_containers: vec!["mp4".into(), "mov".into(), "avi".into()],
            allowed_codecs: vec!["h264".into(), "hevc".into(), "h265".into()],
        }
    }
}

/// Constraint checked by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Format,
    Duration,
    Resolution,
    AspectRatio,
    FileSize,
    Probe,
    Scheduling,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Format => "format",
            Rule::Duration => "duration",
            Rule::Resolution => "resolution",
            Rule::AspectRatio => "aspect_ratio",
            Rule::FileSize => "file_size",
            Rule::Probe => "probe",
            Rule::Scheduling => "scheduling",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated rule for one platform
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCheck {
    pub platform: PlatformId,
    pub rule: Rule,
    pub passed: bool,
    /// Measured value, human readable
    pub measured: String,
    /// Bound it was compared against, human readable
    pub bound: String,
    pub message: String,
}

/// Per-platform, per-rule outcome of validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    platforms: Vec<PlatformId>,
    checks: Vec<RuleCheck>,
}

impl ValidationReport {
    pub fn checks(&self) -> &[RuleCheck] {
        &self.checks
    }

    /// Requested platforms in caller order
    pub fn platforms(&self) -> &[PlatformId] {
        &self.platforms
    }

    pub fn passed_for(&self, platform: PlatformId) -> bool {
        self.platforms.contains(&platform) && self.failures_for(platform).next().is_none()
    }

    pub fn failures_for(&self, platform: PlatformId) -> impl Iterator<Item = &RuleCheck> {
        self.checks
            .iter()
            .filter(move |c| c.platform == platform && !c.passed)
    }

    pub fn passing_platforms(&self) -> Vec<PlatformId> {
        self.platforms
            .iter()
            .copied()
            .filter(|p| self.passed_for(*p))
            .collect()
    }

    pub fn failing_platforms(&self) -> Vec<PlatformId> {
        self.platforms
            .iter()
            .copied()
            .filter(|p| !self.passed_for(*p))
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        self.passing_platforms().is_empty()
    }

    /// Failure messages for a platform joined into one line
    pub fn failure_summary(&self, platform: PlatformId) -> String {
        self.failures_for(platform)
            .map(|c| c.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// One line per platform: compatible, or the reasons it is not
    pub fn compatibility_summary(&self) -> Vec<String> {
        self.platforms
            .iter()
            .map(|p| {
                if self.passed_for(*p) {
                    format!("{}: compatible", p)
                } else {
                    format!("{}: {}", p, self.failure_summary(*p))
                }
            })
            .collect()
    }

    fn record(
        &mut self,
        platform: PlatformId,
        rule: Rule,
        passed: bool,
        measured: String,
        bound: String,
        message: String,
    ) {
        self.checks.push(RuleCheck {
            platform,
            rule,
            passed,
            measured,
            bound,
            message,
        });
    }
}

/// Output of validation: the report plus the immutable request
#[derive(Debug, Clone)]
pub struct Validated {
    pub report: ValidationReport,
    pub request: Arc<UploadRequest>,
}

/// Checks a video against the constraints of each requested platform
#[derive(Debug, Clone)]
pub struct Validator {
    constraints: HashMap<PlatformId, PlatformConstraints>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            PlatformConstraints::youtube_default(),
            PlatformConstraints::instagram_default(),
        )
    }
}

impl Validator {
    pub fn new(youtube: PlatformConstraints, instagram: PlatformConstraints) -> Self {
        let mut constraints = HashMap::new();
        constraints.insert(PlatformId::YouTube, youtube);
        constraints.insert(PlatformId::Instagram, instagram);
        Self { constraints }
    }

    pub fn constraints(&self, platform: PlatformId) -> PlatformConstraints {
        self.constraints
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| PlatformConstraints::default_for(platform))
    }

    /// Validate a source and its metadata for the given platforms
    ///
    /// # Errors
    ///
    /// Returns `ReelcastError::InvalidInput` when the platform set or title is
    /// empty, or the source cannot be read.
    pub async fn validate(
        &self,
        source: VideoSource,
        metadata: VideoMetadata,
        platforms: &[PlatformId],
        probe: &dyn MediaProbe,
    ) -> Result<Validated> {
        let mut requested: Vec<PlatformId> = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if !requested.contains(platform) {
                requested.push(*platform);
            }
        }

        if requested.is_empty() {
            return Err(ReelcastError::InvalidInput(
                "No platforms requested".to_string(),
            ));
        }

        let metadata = metadata.normalized();
        if metadata.title.is_empty() {
            return Err(ReelcastError::InvalidInput(
                "Title cannot be empty".to_string(),
            ));
        }

        let fingerprint = source.fingerprint().await.map_err(|e| {
            ReelcastError::InvalidInput(format!(
                "Video source unreadable: {} ({})",
                source.describe(),
                e
            ))
        })?;

        let mut report = ValidationReport {
            platforms: requested.clone(),
            checks: Vec::new(),
        };

        let media = match probe.probe(&source).await {
            Ok(media) => {
                debug!(
                    "Probed {}: {:.1}s {}x{} {} {} {} bytes",
                    source.describe(),
                    media.duration_secs,
                    media.width,
                    media.height,
                    media.container,
                    media.video_codec,
                    media.size_bytes
                );
                for platform in &requested {
                    self.check_platform(&mut report, *platform, &media, &metadata);
                }
                Some(media)
            }
            Err(e) => {
                warn!("Could not probe {}: {}", source.describe(), e);
                for platform in &requested {
                    report.record(
                        *platform,
                        Rule::Probe,
                        false,
                        "unknown".to_string(),
                        "readable video".to_string(),
                        format!("Could not read video properties: {}", e),
                    );
                }
                None
            }
        };

        for platform in report.failing_platforms() {
            info!(
                "Video not compatible with {}: {}",
                platform,
                report.failure_summary(platform)
            );
        }

        let request = UploadRequest::new(source, metadata, media, fingerprint, requested);
        Ok(Validated {
            report,
            request: Arc::new(request),
        })
    }

    fn check_platform(
        &self,
        report: &mut ValidationReport,
        platform: PlatformId,
        media: &ProbedMedia,
        metadata: &VideoMetadata,
    ) {
        let limits = self.constraints(platform);

        let container = media.container.to_lowercase();
        let codec = media.video_codec.to_lowercase();
        let container_ok = limits.allowed_containers.iter().any(|c| *c == container);
        let codec_ok = limits.allowed_codecs.iter().any(|c| *c == codec);
        let format_message = match (container_ok, codec_ok) {
            (true, true) => "format ok".to_string(),
            (false, _) => format!(
                "Unsupported container '{}'. Supported: {}",
                container,
                limits.allowed_containers.join(", ")
            ),
            (true, false) => format!(
                "Unsupported video codec '{}'. Supported: {}",
                codec,
                limits.allowed_codecs.join(", ")
            ),
        };
        report.record(
            platform,
            Rule::Format,
            container_ok && codec_ok,
            format!("{}/{}", container, codec),
            format!(
                "{} / {}",
                limits.allowed_containers.join("|"),
                limits.allowed_codecs.join("|")
            ),
            format_message,
        );

        let duration = media.duration_secs;
        let min = limits.min_duration.as_secs_f64();
        let max = limits.max_duration.as_secs_f64();
        let duration_ok = duration > 0.0 && duration >= min && duration <= max;
        let duration_message = if duration_ok {
            "duration ok".to_string()
        } else if duration > max {
            format!(
                "Video too long: {:.1}s (max {:.0}s for {})",
                duration, max, platform
            )
        } else {
            format!("Video too short: {:.1}s (min {:.0}s)", duration, min)
        };
        report.record(
            platform,
            Rule::Duration,
            duration_ok,
            format!("{:.1}s", duration),
            format!("{:.0}s..={:.0}s", min, max),
            duration_message,
        );

        let resolution_ok = (limits.min_width..=limits.max_width).contains(&media.width)
            && (limits.min_height..=limits.max_height).contains(&media.height);
        report.record(
            platform,
            Rule::Resolution,
            resolution_ok,
            format!("{}x{}", media.width, media.height),
            format!(
                "{}x{}..={}x{}",
                limits.min_width, limits.min_height, limits.max_width, limits.max_height
            ),
            if resolution_ok {
                "resolution ok".to_string()
            } else {
                format!(
                    "Resolution {}x{} outside {}x{} to {}x{}",
                    media.width,
                    media.height,
                    limits.min_width,
                    limits.min_height,
                    limits.max_width,
                    limits.max_height
                )
            },
        );

        let ratio = media.aspect_ratio();
        let aspect_ok = [PORTRAIT_RATIO, SQUARE_RATIO]
            .iter()
            .any(|target| (ratio - target).abs() <= limits.aspect_tolerance);
        report.record(
            platform,
            Rule::AspectRatio,
            aspect_ok,
            format!("{:.3}", ratio),
            format!("9:16 or 1:1 (±{})", limits.aspect_tolerance),
            if aspect_ok {
                "aspect ratio ok".to_string()
            } else {
                format!("Aspect ratio {:.3} is neither 9:16 nor 1:1", ratio)
            },
        );

        let size = media.size_bytes;
        let size_ok = size > 0 && size <= limits.max_bytes;
        report.record(
            platform,
            Rule::FileSize,
            size_ok,
            format!("{} bytes", size),
            format!("{} bytes", limits.max_bytes),
            if size_ok {
                "file size ok".to_string()
            } else if size == 0 {
                "Video file is empty".to_string()
            } else {
                format!(
                    "File too large: {:.1}MB (max {:.0}MB)",
                    size as f64 / (1024.0 * 1024.0),
                    limits.max_bytes as f64 / (1024.0 * 1024.0)
                )
            },
        );

        if let Some(at) = metadata.schedule_time {
            let supported = platform.supports_scheduling();
            report.record(
                platform,
                Rule::Scheduling,
                supported,
                at.to_rfc3339(),
                "native scheduling".to_string(),
                if supported {
                    "scheduling ok".to_string()
                } else {
                    format!("{} does not support scheduled publishing", platform)
                },
            );
        }
    }
}
