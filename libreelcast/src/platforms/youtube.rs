//! YouTube Shorts adapter (Data API v3, resumable upload protocol)
//!
//! The transfer opens a resumable session, sends the file in fixed-size
//! chunks and records the acknowledged offset after every chunk. A chunk that
//! fails transiently is re-synchronised with a status query and retried a
//! bounded number of times before the failure is surfaced with the resume
//! state attached.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    classify_transport, send, truncate_chars, AuthSession, PlatformAdapter, PublishFailure,
    PublishedRef,
};
use crate::checkpoint::{CheckpointStore, ResumeState};
use crate::config::YouTubeConfig;
use crate::credentials::PlatformCredential;
use crate::error::PlatformError;
use crate::retry::Classification;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{PlatformId, Privacy, UploadRequest, VideoMetadata};

const TITLE_LIMIT: usize = 100;
const DESCRIPTION_LIMIT: usize = 5000;
/// Combined character budget YouTube allows for all tags
const TAGS_CHAR_LIMIT: usize = 500;
const MAX_HASHTAGS: usize = 10;
const SHORTS_TAG: &str = "Shorts";

/// Build the description sent to YouTube
///
/// Up to ten tags are appended as hashtags and a `#Shorts` marker is added
/// when missing, then the result is cut to the 5000 character limit.
pub fn format_description(description: &str, tags: &[String]) -> String {
    let mut formatted = description.trim_end().to_string();

    let hashtags: Vec<String> = tags
        .iter()
        .take(MAX_HASHTAGS)
        .map(|tag| format!("#{}", tag.replace([' ', '#'], "")))
        .filter(|tag| tag.len() > 1)
        .collect();
    if !hashtags.is_empty() {
        if !formatted.is_empty() {
            formatted.push_str("\n\n");
        }
        formatted.push_str(&hashtags.join(" "));
    }

    if !formatted.to_lowercase().contains("#shorts") {
        if !formatted.is_empty() {
            formatted.push_str("\n\n");
        }
        formatted.push_str("#Shorts");
    }

    truncate_chars(&formatted, DESCRIPTION_LIMIT)
}

/// Tags with the Shorts marker, within YouTube's combined length budget
fn shorts_tags(tags: &[String]) -> Vec<String> {
    let mut all: Vec<String> = tags.to_vec();
    if !all.iter().any(|t| t.eq_ignore_ascii_case(SHORTS_TAG)) {
        all.push(SHORTS_TAG.to_string());
    }

    let mut used = 0;
    all.into_iter()
        .filter(|tag| {
            let len = tag.chars().count();
            if used + len > TAGS_CHAR_LIMIT {
                false
            } else {
                used += len;
                true
            }
        })
        .collect()
}

/// The `snippet` + `status` resource for `videos.insert`
pub fn video_resource(metadata: &VideoMetadata, config: &YouTubeConfig) -> Value {
    let mut status = json!({
        "privacyStatus": metadata.privacy.as_str(),
        "selfDeclaredMadeForKids": config.made_for_kids,
        "embeddable": true,
        "publicStatsViewable": true,
    });

    if let Some(at) = metadata.schedule_time.filter(|_| metadata.privacy != Privacy::Private) {
        // publishAt is only honoured on private videos
        status["privacyStatus"] = json!("private");
        status["publishAt"] = json!(at.to_rfc3339());
    }

    json!({
        "snippet": {
            "title": truncate_chars(&metadata.title, TITLE_LIMIT),
            "description": format_description(&metadata.description, &metadata.tags),
            "tags": shorts_tags(&metadata.tags),
            "categoryId": config.category_id,
        },
        "status": status,
    })
}

/// Turn a non-success response into a platform error
///
/// Handles both the Data API shape (`{"error": {"errors": [{"reason"}]}}`)
/// and the OAuth shape (`{"error": "invalid_token"}`).
fn thumbnail_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn parse_error(context: &str, response: &HttpResponse) -> PlatformError {
    let body: Option<Value> = response.json().ok();

    let (code, message) = match body.as_ref().and_then(|b| b.get("error")) {
        Some(Value::Object(error)) => (
            error
                .get("errors")
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_string),
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        Some(Value::String(code)) => (
            Some(code.clone()),
            body.as_ref()
                .and_then(|b| b.get("error_description"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        _ => (None, None),
    };

    PlatformError::Http {
        context: context.to_string(),
        status: response.status,
        code,
        message: message.unwrap_or_else(|| response.text()),
        retry_after: response.retry_after(),
    }
}

/// Last acknowledged byte from a `Range: bytes=0-N` header, as an offset
fn acknowledged_offset(response: &HttpResponse) -> Option<u64> {
    let range = response.header("Range")?;
    let end = range.trim().strip_prefix("bytes=")?.split('-').nth(1)?;
    end.trim().parse::<u64>().ok().map(|last| last + 1)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Deserialize)]
struct InsertedVideo {
    id: String,
}

#[derive(Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    status: VideoItemStatus,
    #[serde(default)]
    processing_details: ProcessingDetails,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VideoItemStatus {
    upload_status: Option<String>,
    privacy_status: Option<String>,
    publish_at: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProcessingDetails {
    processing_status: Option<String>,
}

/// Processing and visibility state of an uploaded video
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoStatus {
    pub video_id: String,
    pub upload_status: Option<String>,
    pub privacy_status: Option<String>,
    pub processing_status: Option<String>,
    pub publish_at: Option<String>,
}

enum SessionStatus {
    Complete(String),
    Incomplete(u64),
    Expired,
}

pub struct YouTubeAdapter {
    config: YouTubeConfig,
    credential: PlatformCredential,
    transport: Arc<dyn HttpTransport>,
    chunk_retries: u32,
    chunk_backoff: Duration,
    request_timeout: Option<Duration>,
}

impl YouTubeAdapter {
    pub fn new(
        config: YouTubeConfig,
        credential: PlatformCredential,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            credential,
            transport,
            chunk_retries: 3,
            chunk_backoff: Duration::from_secs(1),
            request_timeout: None,
        }
    }

    /// Chunk-level retries before a transient failure is surfaced
    pub fn with_chunk_retries(mut self, retries: u32) -> Self {
        self.chunk_retries = retries;
        self
    }

    /// Base wait between chunk retries, doubled on each retry
    pub fn with_chunk_backoff(mut self, backoff: Duration) -> Self {
        self.chunk_backoff = backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Fetch upload, processing and privacy state for `video_id`
    pub async fn video_status(
        &self,
        session: &AuthSession,
        video_id: &str,
    ) -> Result<VideoStatus, PlatformError> {
        let request = self.request(
            HttpRequest::get(format!("{}/youtube/v3/videos", self.config.api_base))
                .query("part", "status,processingDetails")
                .query("id", video_id)
                .bearer(session.token()),
        );
        let response = send(self.transport.as_ref(), "video status", request).await?;
        if !response.is_success() {
            return Err(parse_error("video status", &response));
        }

        let list: VideoList = response
            .json()
            .map_err(|e| PlatformError::protocol("video status", e.to_string()))?;
        let item = list.items.into_iter().next().ok_or_else(|| {
            PlatformError::protocol("video status", format!("Video {} not found", video_id))
        })?;

        Ok(VideoStatus {
            video_id: item.id,
            upload_status: item.status.upload_status,
            privacy_status: item.status.privacy_status,
            processing_status: item.processing_details.processing_status,
            publish_at: item.status.publish_at,
        })
    }

    /// Set the custom thumbnail; failures are logged, never returned
    async fn upload_thumbnail(&self, session: &AuthSession, video_id: &str, path: &Path) {
        let image = match tokio::fs::read(path).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not read thumbnail {}: {}", path.display(), e);
                return;
            }
        };

        let request = self.request(
            HttpRequest::post(format!(
                "{}/upload/youtube/v3/thumbnails/set",
                self.config.api_base
            ))
            .query("videoId", video_id)
            .bearer(session.token())
            .header("Content-Type", thumbnail_content_type(path))
            .bytes(image),
        );

        match send(self.transport.as_ref(), "set thumbnail", request).await {
            Ok(response) if response.is_success() => {
                info!("Set YouTube thumbnail for {}", video_id);
            }
            Ok(response) => warn!(
                "Failed to set YouTube thumbnail: {}",
                parse_error("set thumbnail", &response)
            ),
            Err(e) => warn!("Failed to set YouTube thumbnail: {}", e),
        }
    }

    async fn published(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        id: String,
    ) -> PublishedRef {
        if let Some(path) = &request.metadata().thumbnail {
            self.upload_thumbnail(session, &id, path).await;
        }
        PublishedRef {
            url: format!("https://youtube.com/shorts/{}", id),
            video_id: id,
        }
    }

    async fn verify(&self) -> Result<AuthSession, PlatformError> {
        let request = self.request(
            HttpRequest::get(format!("{}/tokeninfo", self.config.oauth_base))
                .query("access_token", self.credential.access_token()),
        );
        let response = send(self.transport.as_ref(), "verify token", request).await?;

        if !response.is_success() {
            return Err(parse_error("verify token", &response));
        }

        let info: TokenInfo = response
            .json()
            .map_err(|e| PlatformError::protocol("verify token", e.to_string()))?;
        Ok(AuthSession::new(self.credential.access_token(), info.sub))
    }

    async fn refresh_credential(&mut self) -> Result<(), PlatformError> {
        let refresh_token = self
            .credential
            .refresh_token()
            .ok_or_else(|| {
                PlatformError::Authentication("YouTube token expired and no refresh token is available".to_string())
            })?
            .to_string();

        let (client_id, client_secret) =
            match (&self.config.client_id, &self.config.client_secret) {
                (Some(id), Some(secret)) => (id.clone(), secret.clone()),
                _ => {
                    return Err(PlatformError::Authentication(
                        "youtube.client_id and youtube.client_secret are required to refresh tokens"
                            .to_string(),
                    ))
                }
            };

        let request = self.request(
            HttpRequest::post(format!("{}/token", self.config.oauth_base)).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ]),
        );

        let response = send(self.transport.as_ref(), "refresh token", request)
            .await
            .map_err(|e| PlatformError::Authentication(format!("YouTube token refresh failed: {}", e)))?;

        if !response.is_success() {
            return Err(PlatformError::Authentication(format!(
                "YouTube token refresh failed: {}",
                parse_error("refresh token", &response)
            )));
        }

        let token: TokenResponse = response.json().map_err(|e| {
            PlatformError::Authentication(format!("YouTube token refresh returned invalid JSON: {}", e))
        })?;

        let expiry = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        self.credential
            .apply_refresh(token.access_token, token.refresh_token, expiry);
        info!("Refreshed YouTube access token");
        Ok(())
    }

    async fn start_session(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
    ) -> Result<ResumeState, PlatformError> {
        let total = request.source().len();
        let http = self.request(
            HttpRequest::post(format!("{}/upload/youtube/v3/videos", self.config.api_base))
                .query("uploadType", "resumable")
                .query("part", "snippet,status")
                .query(
                    "notifySubscribers",
                    self.config.notify_subscribers.to_string(),
                )
                .bearer(session.token())
                .header("X-Upload-Content-Length", total.to_string())
                .header("X-Upload-Content-Type", "video/*")
                .json(video_resource(request.metadata(), &self.config)),
        );

        let response = send(self.transport.as_ref(), "start upload session", http).await?;
        if !response.is_success() {
            return Err(parse_error("start upload session", &response));
        }

        let location = response.header("Location").ok_or_else(|| {
            PlatformError::protocol("start upload session", "response has no Location header")
        })?;

        debug!("Opened YouTube upload session for {} bytes", total);
        Ok(ResumeState::new(location, 0, total))
    }

    async fn query_status(
        &self,
        session: &AuthSession,
        state: &ResumeState,
    ) -> Result<SessionStatus, PlatformError> {
        let http = self.request(
            HttpRequest::put(&state.session_uri)
                .bearer(session.token())
                .header("Content-Range", format!("bytes */{}", state.total)),
        );

        let response = send(self.transport.as_ref(), "query upload status", http).await?;
        match response.status {
            200 | 201 => {
                let video: InsertedVideo = response
                    .json()
                    .map_err(|e| PlatformError::protocol("query upload status", e.to_string()))?;
                Ok(SessionStatus::Complete(video.id))
            }
            308 => Ok(SessionStatus::Incomplete(
                acknowledged_offset(&response).unwrap_or(0),
            )),
            404 | 410 => Ok(SessionStatus::Expired),
            _ => Err(parse_error("query upload status", &response)),
        }
    }

    async fn save_checkpoint(
        &self,
        checkpoints: &dyn CheckpointStore,
        request: &UploadRequest,
        state: &ResumeState,
    ) {
        if let Err(e) = checkpoints
            .save(PlatformId::YouTube, request.fingerprint(), state)
            .await
        {
            warn!("Failed to record YouTube upload checkpoint: {}", e);
        }
    }

    /// Send chunks from `state.offset` until the platform returns the video id
    async fn transfer(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        state: &mut ResumeState,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<String, PlatformError> {
        let mut failures = 0u32;

        loop {
            if state.is_complete() {
                match self.query_status(session, state).await? {
                    SessionStatus::Complete(id) => return Ok(id),
                    SessionStatus::Incomplete(offset) if offset < state.total => {
                        state.offset = offset;
                    }
                    _ => {
                        return Err(PlatformError::protocol(
                            "upload chunk",
                            "all bytes sent but no video id returned",
                        ))
                    }
                }
            }

            let chunk = request
                .source()
                .read_range(state.offset, self.config.chunk_size)
                .await
                .map_err(|e| PlatformError::protocol("read video chunk", e.to_string()))?;
            let end = state.offset + chunk.len() as u64;

            let http = self.request(
                HttpRequest::put(&state.session_uri)
                    .bearer(session.token())
                    .header(
                        "Content-Range",
                        format!("bytes {}-{}/{}", state.offset, end.saturating_sub(1), state.total),
                    )
                    .bytes(chunk),
            );

            let outcome = match send(self.transport.as_ref(), "upload chunk", http).await {
                Ok(response) if response.status == 200 || response.status == 201 => {
                    let video: InsertedVideo = response
                        .json()
                        .map_err(|e| PlatformError::protocol("upload chunk", e.to_string()))?;
                    return Ok(video.id);
                }
                Ok(response) if response.status == 308 => {
                    Ok(acknowledged_offset(&response).unwrap_or(0))
                }
                Ok(response) => Err(parse_error("upload chunk", &response)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(offset) if offset <= state.offset => {
                    failures += 1;
                    if failures > self.chunk_retries {
                        return Err(PlatformError::protocol(
                            "upload chunk",
                            format!("session stopped acknowledging bytes at offset {}", offset),
                        ));
                    }
                    warn!(
                        "YouTube chunk not acknowledged past byte {} (retry {}/{})",
                        offset, failures, self.chunk_retries
                    );
                    state.offset = offset;
                    self.save_checkpoint(checkpoints, request, state).await;
                    sleep(self.chunk_backoff.saturating_mul(2u32.saturating_pow(failures - 1))).await;
                }
                Ok(offset) => {
                    state.offset = offset;
                    failures = 0;
                    self.save_checkpoint(checkpoints, request, state).await;
                    debug!(
                        "YouTube upload progress: {}/{} bytes",
                        state.offset, state.total
                    );
                }
                Err(e) if self.classify(&e) == Classification::Transient => {
                    failures += 1;
                    if failures > self.chunk_retries {
                        return Err(e);
                    }
                    warn!(
                        "YouTube chunk failed (retry {}/{}): {}",
                        failures, self.chunk_retries, e
                    );
                    sleep(self.chunk_backoff.saturating_mul(2u32.saturating_pow(failures - 1))).await;

                    match self.query_status(session, state).await? {
                        SessionStatus::Complete(id) => return Ok(id),
                        SessionStatus::Incomplete(offset) => {
                            state.offset = offset;
                            self.save_checkpoint(checkpoints, request, state).await;
                        }
                        SessionStatus::Expired => {
                            return Err(PlatformError::protocol(
                                "upload chunk",
                                "upload session expired",
                            ))
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for YouTubeAdapter {
    fn platform(&self) -> PlatformId {
        PlatformId::YouTube
    }

    async fn authenticate(&mut self) -> Result<AuthSession, PlatformError> {
        if self.credential.is_expired_at(Utc::now()) && self.credential.can_refresh() {
            self.refresh_credential().await?;
        }

        match self.verify().await {
            Ok(session) => Ok(session),
            Err(e)
                if self.classify(&e) == Classification::AuthExpired
                    && self.credential.can_refresh() =>
            {
                info!("YouTube token rejected ({}), refreshing", e);
                self.refresh_credential().await?;
                self.verify().await
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&mut self) -> Result<AuthSession, PlatformError> {
        self.refresh_credential().await?;
        Ok(AuthSession::new(self.credential.access_token(), None))
    }

    async fn publish(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        resume: Option<ResumeState>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<PublishedRef, PublishFailure> {
        let total = request.source().len();

        let resumed = match resume.filter(|s| s.total == total) {
            Some(previous) => match self.query_status(session, &previous).await {
                Ok(SessionStatus::Complete(id)) => {
                    return Ok(self.published(session, request, id).await)
                }
                Ok(SessionStatus::Incomplete(offset)) => {
                    info!(
                        "Resuming YouTube upload at {}/{} bytes",
                        offset, previous.total
                    );
                    Some(ResumeState::new(previous.session_uri, offset, previous.total))
                }
                Ok(SessionStatus::Expired) => {
                    info!("YouTube upload session expired, starting over");
                    None
                }
                Err(e) => return Err(PublishFailure::new(e, Some(previous))),
            },
            None => None,
        };

        let mut state = match resumed {
            Some(state) => state,
            None => {
                let state = self.start_session(session, request).await?;
                self.save_checkpoint(checkpoints, request, &state).await;
                state
            }
        };

        match self.transfer(session, request, &mut state, checkpoints).await {
            Ok(id) => {
                info!("YouTube upload complete: {}", id);
                Ok(self.published(session, request, id).await)
            }
            Err(e) => Err(PublishFailure::new(e, Some(state))),
        }
    }

    fn classify(&self, error: &PlatformError) -> Classification {
        match error {
            PlatformError::Http {
                status,
                code,
                retry_after,
                ..
            } => {
                let code = code.as_deref();
                if *status == 401 || matches!(code, Some("authError" | "invalid_token")) {
                    Classification::AuthExpired
                } else if *status == 429
                    || (*status == 403
                        && matches!(
                            code,
                            Some("quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded")
                        ))
                {
                    Classification::RateLimited(*retry_after)
                } else if matches!(status, 500 | 502 | 503 | 504) {
                    Classification::Transient
                } else {
                    Classification::Permanent
                }
            }
            PlatformError::Transport { kind, .. } => classify_transport(*kind),
            PlatformError::Protocol { .. }
            | PlatformError::Authentication(_)
            | PlatformError::Rejected(_)
            | PlatformError::NotConfigured(_) => Classification::Permanent,
        }
    }
}
