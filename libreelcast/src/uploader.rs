//! Caller-facing upload entry point
//!
//! [`VideoUploader`] wires the pieces together: it validates the source,
//! builds one adapter per platform that passed validation, and hands them to
//! the [`UploadOrchestrator`].
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::config::Config;
//! use libreelcast::media::VideoSource;
//! use libreelcast::types::{PlatformId, VideoMetadata};
//! use libreelcast::uploader::VideoUploader;
//!
//! # async fn example() -> libreelcast::Result<()> {
//! let uploader = VideoUploader::from_config(Config::load()?).await?;
//! let result = uploader
//!     .upload_video(
//!         VideoSource::from_path("short.mp4")?,
//!         VideoMetadata::new("Match highlights", "Best goals of the week")
//!             .with_tags(["football", "highlights"]),
//!         &PlatformId::ALL,
//!         None,
//!     )
//!     .await?;
//!
//! for outcome in result.outcomes() {
//!     println!("{}: {:?}", outcome.platform, outcome.video_url);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, ResumeState, SqliteCheckpointStore};
use crate::config::Config;
use crate::credentials::{CredentialProvider, FileCredentialProvider};
use crate::error::{PlatformError, ReelcastError, Result};
use crate::media::{FfprobeProbe, MediaProbe, VideoSource};
use crate::orchestrator::UploadOrchestrator;
use crate::platforms::instagram::InstagramAdapter;
use crate::platforms::youtube::{VideoStatus, YouTubeAdapter};
use crate::platforms::{AuthSession, PlatformAdapter, PublishFailure, PublishedRef};
use crate::retry::Classification;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{PlatformId, UploadRequest, UploadResult, VideoMetadata};
use crate::validation::ValidationReport;

/// Stands in for a platform whose credential could not be loaded, so the
/// failure ends up in that platform's outcome only
struct UnavailableAdapter {
    platform: PlatformId,
    error: PlatformError,
}

#[async_trait]
impl PlatformAdapter for UnavailableAdapter {
    fn platform(&self) -> PlatformId {
        self.platform
    }

    async fn authenticate(&mut self) -> std::result::Result<AuthSession, PlatformError> {
        Err(self.error.clone())
    }

    async fn refresh_session(&mut self) -> std::result::Result<AuthSession, PlatformError> {
        Err(self.error.clone())
    }

    async fn publish(
        &self,
        _session: &AuthSession,
        _request: &UploadRequest,
        _resume: Option<ResumeState>,
        _checkpoints: &dyn CheckpointStore,
    ) -> std::result::Result<PublishedRef, PublishFailure> {
        Err(self.error.clone().into())
    }

    fn classify(&self, _error: &PlatformError) -> Classification {
        Classification::Permanent
    }
}

/// Outcome of authenticating with one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    pub platform: PlatformId,
    pub account_id: Option<String>,
    pub error: Option<String>,
}

impl ConnectionCheck {
    pub fn connected(&self) -> bool {
        self.error.is_none()
    }
}

pub struct VideoUploader {
    config: Config,
    probe: Arc<dyn MediaProbe>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn HttpTransport>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl VideoUploader {
    /// Uploader with explicit collaborators and in-memory checkpoints
    pub fn new(
        config: Config,
        probe: Arc<dyn MediaProbe>,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            probe,
            credentials,
            transport,
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
        }
    }

    /// Production wiring: ffprobe, token files, reqwest, and SQLite
    /// checkpoints when `checkpoint.path` is set
    pub async fn from_config(config: Config) -> Result<Self> {
        let probe = Arc::new(FfprobeProbe::new(&config.video.ffprobe_path));
        let credentials = Arc::new(
            FileCredentialProvider::new()
                .with_token_file(PlatformId::YouTube, &config.youtube.token_file)
                .with_token_file(PlatformId::Instagram, &config.instagram.token_file),
        );
        let transport = Arc::new(ReqwestTransport::new(config.upload.request_timeout)?);

        let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint.path {
            Some(path) => Arc::new(SqliteCheckpointStore::new(path).await?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };

        Ok(Self::new(config, probe, credentials, transport).with_checkpoints(checkpoints))
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop platforms disabled in configuration
    fn enabled_platforms(&self, platforms: &[PlatformId]) -> Result<Vec<PlatformId>> {
        let enabled: Vec<PlatformId> = platforms
            .iter()
            .copied()
            .filter(|p| {
                let on = self.config.is_enabled(*p);
                if !on {
                    warn!("{} is disabled in configuration, skipping", p);
                }
                on
            })
            .collect();

        if enabled.is_empty() && !platforms.is_empty() {
            return Err(ReelcastError::InvalidInput(
                "None of the requested platforms is enabled".to_string(),
            ));
        }
        Ok(enabled)
    }

    /// Check a video against each platform's limits without uploading
    pub async fn check_compatibility(
        &self,
        source: VideoSource,
        metadata: VideoMetadata,
        platforms: &[PlatformId],
    ) -> Result<ValidationReport> {
        let platforms = self.enabled_platforms(platforms)?;
        let validated = self
            .config
            .validator()
            .validate(source, metadata, &platforms, self.probe.as_ref())
            .await?;
        Ok(validated.report)
    }

    async fn adapter_for(&self, platform: PlatformId) -> Box<dyn PlatformAdapter> {
        let credential = match self.credentials.credential(platform).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("No usable {} credential: {}", platform, e);
                let error = match e {
                    ReelcastError::Platform(error) => error,
                    other => PlatformError::Authentication(other.to_string()),
                };
                return Box::new(UnavailableAdapter { platform, error });
            }
        };

        let upload = &self.config.upload;
        match platform {
            PlatformId::YouTube => Box::new(
                YouTubeAdapter::new(self.config.youtube.clone(), credential, self.transport.clone())
                    .with_chunk_retries(upload.chunk_retries)
                    .with_request_timeout(upload.request_timeout),
            ),
            PlatformId::Instagram => Box::new(
                InstagramAdapter::new(
                    self.config.instagram.clone(),
                    credential,
                    self.transport.clone(),
                )
                .with_request_timeout(upload.request_timeout),
            ),
        }
    }

    /// Authenticate with each enabled platform without uploading anything
    pub async fn test_connections(&self, platforms: &[PlatformId]) -> Result<Vec<ConnectionCheck>> {
        let platforms = self.enabled_platforms(platforms)?;
        let checks = platforms.into_iter().map(|platform| async move {
            let mut adapter = self.adapter_for(platform).await;
            match adapter.authenticate().await {
                Ok(session) => {
                    info!(
                        "Connected to {} as {}",
                        platform,
                        session.account_id.as_deref().unwrap_or("unknown account")
                    );
                    ConnectionCheck {
                        platform,
                        account_id: session.account_id,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("{} connection test failed: {}", platform, e);
                    ConnectionCheck {
                        platform,
                        account_id: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        });
        Ok(join_all(checks).await)
    }

    /// Processing and privacy state of a video already uploaded to YouTube
    pub async fn youtube_video_status(&self, video_id: &str) -> Result<VideoStatus> {
        let credential = self.credentials.credential(PlatformId::YouTube).await?;
        let mut adapter =
            YouTubeAdapter::new(self.config.youtube.clone(), credential, self.transport.clone())
                .with_request_timeout(self.config.upload.request_timeout);
        let session = adapter.authenticate().await?;
        Ok(adapter.video_status(&session, video_id).await?)
    }

    /// Publish one video to the given platforms
    ///
    /// `deadline` bounds the whole call; platforms still running when it
    /// passes are reported as timed out.
    pub async fn upload_video(
        &self,
        source: VideoSource,
        metadata: VideoMetadata,
        platforms: &[PlatformId],
        deadline: Option<Duration>,
    ) -> Result<UploadResult> {
        self.upload_video_with_cancel(source, metadata, platforms, deadline, CancellationToken::new())
            .await
    }

    /// Like [`upload_video`](Self::upload_video), aborting in-flight
    /// platforms when `cancel` fires
    pub async fn upload_video_with_cancel(
        &self,
        source: VideoSource,
        metadata: VideoMetadata,
        platforms: &[PlatformId],
        deadline: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<UploadResult> {
        let platforms = self.enabled_platforms(platforms)?;
        info!(
            "Uploading {} to {}",
            source.describe(),
            platforms
                .iter()
                .map(PlatformId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let validated = self
            .config
            .validator()
            .validate(source, metadata, &platforms, self.probe.as_ref())
            .await?;

        let mut adapters = Vec::new();
        for platform in validated.report.passing_platforms() {
            adapters.push(self.adapter_for(platform).await);
        }

        let mut orchestrator = UploadOrchestrator::new(self.config.retry_policy())
            .with_platform_timeout(self.config.upload.timeout)
            .with_checkpoints(self.checkpoints.clone())
            .resume_from_checkpoint(self.config.upload.resume_from_checkpoint);
        if let Some(deadline) = deadline {
            orchestrator = orchestrator.with_deadline(deadline);
        }

        let result = orchestrator.run(validated, adapters, cancel).await?;
        log_summary(&result);
        Ok(result)
    }
}

fn log_summary(result: &UploadResult) {
    let succeeded = result.successes().count();
    info!(
        "Upload finished: {}/{} platforms succeeded",
        succeeded,
        result.len()
    );
    for outcome in result.failures() {
        if let Some(error) = &outcome.error {
            warn!("{} failed ({}): {}", outcome.platform, error.kind, error.message);
        }
    }
}
