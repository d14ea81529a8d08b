//! Instagram Reels adapter (Graph API, resumable upload)
//!
//! Publishing is a four step exchange: create a REELS container, push the
//! bytes to the container's upload URI, wait for processing to finish, then
//! publish the container. The upload URI doubles as the resume session; the
//! container id is its last path segment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    classify_transport, send, truncate_chars, AuthSession, PlatformAdapter, PublishFailure,
    PublishedRef,
};
use crate::checkpoint::{CheckpointStore, ResumeState};
use crate::config::InstagramConfig;
use crate::credentials::PlatformCredential;
use crate::error::{PlatformError, TransportErrorKind};
use crate::retry::Classification;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{CoverFrame, PlatformId, UploadRequest, VideoMetadata};

const CAPTION_LIMIT: usize = 2200;

const AUTH_CODES: [i64; 1] = [190];
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];
const TRANSIENT_CODES: [i64; 2] = [1, 2];

/// Caption text for a Reel
///
/// Uses the explicit Instagram caption when given, otherwise title and
/// description. A `#Reels` marker is appended when missing. Captions over
/// the 2200 character limit are shortened, keeping hashtag lines intact.
pub fn format_caption(metadata: &VideoMetadata) -> String {
    let mut caption = match &metadata.instagram_caption {
        Some(caption) => caption.trim().to_string(),
        None if metadata.description.trim().is_empty() => metadata.title.clone(),
        None => format!("{}\n\n{}", metadata.title, metadata.description.trim()),
    };

    if !caption.to_lowercase().contains("#reels") {
        caption.push_str("\n\n#Reels");
    }

    if caption.chars().count() <= CAPTION_LIMIT {
        return caption;
    }

    let (hashtag_lines, content_lines): (Vec<&str>, Vec<&str>) = caption
        .lines()
        .partition(|line| line.trim_start().starts_with('#'));
    let hashtags = hashtag_lines.join("\n");
    let content = content_lines.join("\n");

    let hashtag_space = if hashtags.is_empty() {
        0
    } else {
        hashtags.chars().count() + 2
    };
    let room = CAPTION_LIMIT.saturating_sub(hashtag_space);

    let content = if content.trim_end().chars().count() > room {
        format!(
            "{}...",
            truncate_chars(content.trim_end(), room.saturating_sub(3))
        )
    } else {
        content.trim_end().to_string()
    };

    let shortened = if hashtags.is_empty() {
        content
    } else {
        format!("{}\n\n{}", content, hashtags)
    };
    truncate_chars(&shortened, CAPTION_LIMIT)
}

/// Turn a Graph API error response into a platform error
///
/// The numeric Graph error code is kept as the error code. Errors the API
/// flags with `is_transient` and that are not auth or throttling errors are
/// coded `transient`.
fn parse_error(context: &str, response: &HttpResponse) -> PlatformError {
    let body: Option<Value> = response.json().ok();
    let error = body.as_ref().and_then(|b| b.get("error"));

    let numeric = error.and_then(|e| e.get("code")).and_then(Value::as_i64);
    let is_transient = error
        .and_then(|e| e.get("is_transient"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let code = match numeric {
        Some(c) if AUTH_CODES.contains(&c) || RATE_LIMIT_CODES.contains(&c) => Some(c.to_string()),
        _ if is_transient => Some("transient".to_string()),
        Some(c) => Some(c.to_string()),
        None => None,
    };

    PlatformError::Http {
        context: context.to_string(),
        status: response.status,
        code,
        message: error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| response.text()),
        retry_after: response.retry_after(),
    }
}

#[derive(Deserialize)]
struct Me {
    id: String,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct Container {
    id: String,
    uri: Option<String>,
}

#[derive(Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct Published {
    id: String,
}

#[derive(Deserialize)]
struct Permalink {
    permalink: Option<String>,
}

pub struct InstagramAdapter {
    config: InstagramConfig,
    credential: PlatformCredential,
    transport: Arc<dyn HttpTransport>,
    request_timeout: Option<Duration>,
}

impl InstagramAdapter {
    pub fn new(
        config: InstagramConfig,
        credential: PlatformCredential,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            credential,
            transport,
            request_timeout: None,
        }
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

    async fn verify(&self) -> Result<AuthSession, PlatformError> {
        let request = self.request(
            HttpRequest::get(format!("{}/me", self.config.graph_base))
                .query("fields", "id,username")
                .query("access_token", self.credential.access_token()),
        );
        let response = send(self.transport.as_ref(), "verify token", request).await?;
        if !response.is_success() {
            return Err(parse_error("verify token", &response));
        }

        let me: Me = response
            .json()
            .map_err(|e| PlatformError::protocol("verify token", e.to_string()))?;
        let account = self.config.account_id.clone().unwrap_or(me.id);
        Ok(AuthSession::new(self.credential.access_token(), Some(account)))
    }

    /// Exchange the long-lived token for a new one
    async fn refresh_credential(&mut self) -> Result<(), PlatformError> {
        let current = self
            .credential
            .refresh_token()
            .unwrap_or_else(|| self.credential.access_token())
            .to_string();

        let request = self.request(
            HttpRequest::get(format!("{}/refresh_access_token", self.config.refresh_base))
                .query("grant_type", "ig_refresh_token")
                .query("access_token", current),
        );

        let response = send(self.transport.as_ref(), "refresh token", request)
            .await
            .map_err(|e| {
                PlatformError::Authentication(format!("Instagram token refresh failed: {}", e))
            })?;
        if !response.is_success() {
            return Err(PlatformError::Authentication(format!(
                "Instagram token refresh failed: {}",
                parse_error("refresh token", &response)
            )));
        }

        let token: RefreshedToken = response.json().map_err(|e| {
            PlatformError::Authentication(format!(
                "Instagram token refresh returned invalid JSON: {}",
                e
            ))
        })?;
        let expiry = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        self.credential.apply_refresh(token.access_token, None, expiry);
        info!("Refreshed Instagram access token");
        Ok(())
    }

    fn account_id<'a>(&'a self, session: &'a AuthSession) -> Result<&'a str, PlatformError> {
        self.config
            .account_id
            .as_deref()
            .or(session.account_id.as_deref())
            .ok_or_else(|| PlatformError::NotConfigured("instagram.account_id".to_string()))
    }

    async fn create_container(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
    ) -> Result<ResumeState, PlatformError> {
        let metadata = request.metadata();
        let mut http = HttpRequest::post(format!(
            "{}/{}/media",
            self.config.graph_base,
            self.account_id(session)?
        ))
        .query("media_type", "REELS")
        .query("upload_type", "resumable")
        .query("caption", format_caption(metadata))
        .query("share_to_feed", self.config.share_to_feed.to_string())
        .query("access_token", session.token());

        match &metadata.cover {
            Some(CoverFrame::Url(url)) => http = http.query("cover_url", url.clone()),
            Some(CoverFrame::OffsetMs(ms)) => http = http.query("thumb_offset", ms.to_string()),
            None => {}
        }
        if metadata.share_to_story {
            http = http.query("share_to_story", "true");
        }
        if metadata.share_to_facebook {
            http = http.query("share_to_facebook", "true");
        }

        let response =
            send(self.transport.as_ref(), "create container", self.request(http)).await?;
        if !response.is_success() {
            return Err(parse_error("create container", &response));
        }

        let container: Container = response
            .json()
            .map_err(|e| PlatformError::protocol("create container", e.to_string()))?;
        let uri = container
            .uri
            .unwrap_or_else(|| format!("{}/{}", self.config.rupload_base, container.id));

        debug!("Created Instagram container {}", container.id);
        Ok(ResumeState::new(uri, 0, request.source().len()))
    }

    async fn upload_bytes(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        state: &mut ResumeState,
    ) -> Result<(), PlatformError> {
        let remaining = request
            .source()
            .read_range(state.offset, state.remaining())
            .await
            .map_err(|e| PlatformError::protocol("read video", e.to_string()))?;

        let http = self.request(
            HttpRequest::post(&state.session_uri)
                .header("Authorization", format!("OAuth {}", session.token()))
                .header("offset", state.offset.to_string())
                .header("file_size", state.total.to_string())
                .bytes(remaining),
        );

        let response = send(self.transport.as_ref(), "upload video", http).await?;
        if !response.is_success() {
            return Err(parse_error("upload video", &response));
        }

        state.offset = state.total;
        Ok(())
    }

    /// Wait until the container has been processed
    async fn await_processing(
        &self,
        session: &AuthSession,
        container_id: &str,
    ) -> Result<(), PlatformError> {
        for check in 1..=self.config.status_poll_attempts {
            let http = self.request(
                HttpRequest::get(format!("{}/{}", self.config.graph_base, container_id))
                    .query("fields", "status_code,status")
                    .query("access_token", session.token()),
            );
            let response = send(self.transport.as_ref(), "check container status", http).await?;
            if !response.is_success() {
                return Err(parse_error("check container status", &response));
            }

            let status: ContainerStatus = response
                .json()
                .map_err(|e| PlatformError::protocol("check container status", e.to_string()))?;

            match status.status_code.as_deref() {
                Some("FINISHED") | Some("PUBLISHED") => return Ok(()),
                Some("ERROR") => {
                    return Err(PlatformError::Rejected(format!(
                        "Instagram could not process the video: {}",
                        status.status.unwrap_or_else(|| "unknown error".to_string())
                    )))
                }
                Some("EXPIRED") => {
                    return Err(PlatformError::protocol(
                        "check container status",
                        "container expired before publishing",
                    ))
                }
                other => {
                    debug!(
                        "Instagram container {} status {:?} (check {}/{})",
                        container_id, other, check, self.config.status_poll_attempts
                    );
                    if check < self.config.status_poll_attempts {
                        sleep(self.config.status_poll_interval).await;
                    }
                }
            }
        }

        Err(PlatformError::transport(
            "check container status",
            TransportErrorKind::Timeout,
            format!(
                "still processing after {} checks",
                self.config.status_poll_attempts
            ),
        ))
    }

    async fn publish_container(
        &self,
        session: &AuthSession,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        let http = self.request(
            HttpRequest::post(format!(
                "{}/{}/media_publish",
                self.config.graph_base,
                self.account_id(session)?
            ))
            .query("creation_id", container_id)
            .query("access_token", session.token()),
        );

        let response = send(self.transport.as_ref(), "publish container", http).await?;
        if !response.is_success() {
            return Err(parse_error("publish container", &response));
        }

        let published: Published = response
            .json()
            .map_err(|e| PlatformError::protocol("publish container", e.to_string()))?;
        Ok(published.id)
    }

    async fn permalink(&self, session: &AuthSession, media_id: &str) -> String {
        let fallback = format!("https://instagram.com/reel/{}", media_id);
        let http = self.request(
            HttpRequest::get(format!("{}/{}", self.config.graph_base, media_id))
                .query("fields", "permalink")
                .query("access_token", session.token()),
        );

        match send(self.transport.as_ref(), "fetch permalink", http).await {
            Ok(response) if response.is_success() => response
                .json::<Permalink>()
                .ok()
                .and_then(|p| p.permalink)
                .unwrap_or(fallback),
            Ok(response) => {
                warn!(
                    "Could not fetch Instagram permalink: {}",
                    parse_error("fetch permalink", &response)
                );
                fallback
            }
            Err(e) => {
                warn!("Could not fetch Instagram permalink: {}", e);
                fallback
            }
        }
    }

    async fn save_checkpoint(
        &self,
        checkpoints: &dyn CheckpointStore,
        request: &UploadRequest,
        state: &ResumeState,
    ) {
        if let Err(e) = checkpoints
            .save(PlatformId::Instagram, request.fingerprint(), state)
            .await
        {
            warn!("Failed to record Instagram upload checkpoint: {}", e);
        }
    }

    async fn transfer(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        state: &mut ResumeState,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<PublishedRef, PlatformError> {
        let container_id = container_id(&state.session_uri)?;

        if !state.is_complete() {
            self.upload_bytes(session, request, state).await?;
            self.save_checkpoint(checkpoints, request, state).await;
            debug!("Instagram upload sent {} bytes", state.total);
        }

        self.await_processing(session, &container_id).await?;
        let media_id = self.publish_container(session, &container_id).await?;
        let url = self.permalink(session, &media_id).await;

        info!("Instagram Reel published: {}", media_id);
        Ok(PublishedRef {
            video_id: media_id,
            url,
        })
    }
}

fn container_id(upload_uri: &str) -> Result<String, PlatformError> {
    upload_uri
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PlatformError::protocol("upload video", "upload URI has no container id"))
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> PlatformId {
        PlatformId::Instagram
    }

    async fn authenticate(&mut self) -> Result<AuthSession, PlatformError> {
        match self.verify().await {
            Ok(session) => Ok(session),
            Err(e) if self.classify(&e) == Classification::AuthExpired => {
                info!("Instagram token rejected ({}), refreshing", e);
                self.refresh_credential().await?;
                self.verify().await
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&mut self) -> Result<AuthSession, PlatformError> {
        self.refresh_credential().await?;
        self.verify().await
    }

    async fn publish(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        resume: Option<ResumeState>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<PublishedRef, PublishFailure> {
        let total = request.source().len();

        let mut state = match resume.filter(|s| s.total == total) {
            Some(previous) => {
                info!(
                    "Resuming Instagram upload at {}/{} bytes",
                    previous.offset, previous.total
                );
                previous
            }
            None => {
                let state = self.create_container(session, request).await?;
                self.save_checkpoint(checkpoints, request, &state).await;
                state
            }
        };

        self.transfer(session, request, &mut state, checkpoints)
            .await
            .map_err(|e| PublishFailure::new(e, Some(state)))
    }

    fn classify(&self, error: &PlatformError) -> Classification {
        match error {
            PlatformError::Http {
                status,
                code,
                retry_after,
                ..
            } => {
                let numeric = code.as_deref().and_then(|c| c.parse::<i64>().ok());
                let is_code = |set: &[i64]| numeric.map(|c| set.contains(&c)).unwrap_or(false);

                if *status == 401 || is_code(&AUTH_CODES) {
                    Classification::AuthExpired
                } else if *status == 429 || is_code(&RATE_LIMIT_CODES) {
                    Classification::RateLimited(*retry_after)
                } else if is_code(&TRANSIENT_CODES)
                    || code.as_deref() == Some("transient")
                    || (500..600).contains(status)
                {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::media::VideoSource;
    use crate::transport::{Method, ScriptedTransport};
    use serde_json::json;

    fn config() -> InstagramConfig {
        InstagramConfig {
            account_id: Some("17841".to_string()),
            graph_base: "https://graph.test".to_string(),
            rupload_base: "https://rupload.test".to_string(),
            refresh_base: "https://refresh.test".to_string(),
            status_poll_interval: Duration::ZERO,
            status_poll_attempts: 3,
            ..InstagramConfig::default()
        }
    }

    fn request(metadata: VideoMetadata) -> UploadRequest {
        UploadRequest::new(
            VideoSource::from_bytes(b"0123456789".to_vec()),
            metadata,
            None,
            "fp".to_string(),
            vec![PlatformId::Instagram],
        )
    }

    fn adapter(transport: Arc<ScriptedTransport>) -> InstagramAdapter {
        InstagramAdapter::new(config(), PlatformCredential::new("ig-token"), transport)
    }

    fn session() -> AuthSession {
        AuthSession::new("ig-token", Some("17841".to_string()))
    }

    fn json_response(value: Value) -> HttpResponse {
        HttpResponse::new(200).with_json(value)
    }

    fn graph_error(status: u16, code: i64, transient: bool) -> HttpResponse {
        HttpResponse::new(status).with_json(json!({
            "error": {
                "message": "graph error",
                "type": "OAuthException",
                "code": code,
                "is_transient": transient
            }
        }))
    }

    fn script_happy_path(transport: &ScriptedTransport) {
        transport
            .on(
                Method::Post,
                "/17841/media",
                json_response(json!({"id": "c-1", "uri": "https://rupload.test/c-1"})),
            )
            .on(Method::Post, "rupload.test/c-1", json_response(json!({"success": true})))
            .on(
                Method::Get,
                "graph.test/c-1",
                json_response(json!({"status_code": "IN_PROGRESS"})),
            )
            .on(
                Method::Get,
                "graph.test/c-1",
                json_response(json!({"status_code": "FINISHED"})),
            )
            .on(Method::Post, "/media_publish", json_response(json!({"id": "m-1"})))
            .on(
                Method::Get,
                "graph.test/m-1",
                json_response(json!({"permalink": "https://www.instagram.com/reel/ABC/"})),
            );
    }

    #[test]
    fn test_caption_from_title_and_description() {
        let caption = format_caption(&VideoMetadata::new("Title", "Body"));
        assert_eq!(caption, "Title\n\nBody\n\n#Reels");

        let explicit =
            format_caption(&VideoMetadata::new("Title", "Body").with_instagram_caption("Mine #reels"));
        assert_eq!(explicit, "Mine #reels");
    }

    #[test]
    fn test_long_caption_keeps_hashtag_lines() {
        let long = format!("{}\n#football #stats", "word ".repeat(600));
        let caption =
            format_caption(&VideoMetadata::new("Title", "").with_instagram_caption(long));

        assert!(caption.chars().count() <= CAPTION_LIMIT);
        assert!(caption.ends_with("#football #stats\n#Reels"));
        assert!(caption.contains("...\n\n#football"));
    }

    #[test]
    fn test_container_id_from_upload_uri() {
        assert_eq!(container_id("https://rupload.test/v21.0/c-1").unwrap(), "c-1");
        assert_eq!(container_id("https://rupload.test/c-2/").unwrap(), "c-2");
    }

    #[test]
    fn test_classification_table() {
        let adapter = adapter(Arc::new(ScriptedTransport::new()));
        let classify = |response: HttpResponse| adapter.classify(&parse_error("publish", &response));

        assert_eq!(classify(graph_error(400, 190, false)), Classification::AuthExpired);
        assert_eq!(classify(HttpResponse::new(401)), Classification::AuthExpired);
        for code in RATE_LIMIT_CODES {
            assert_eq!(
                classify(graph_error(400, code, false)),
                Classification::RateLimited(None)
            );
        }
        assert_eq!(
            classify(HttpResponse::new(429).with_header("Retry-After", "12")),
            Classification::RateLimited(Some(Duration::from_secs(12)))
        );
        assert_eq!(classify(graph_error(500, 1, false)), Classification::Transient);
        assert_eq!(classify(graph_error(400, 2, false)), Classification::Transient);
        assert_eq!(classify(graph_error(400, 9004, true)), Classification::Transient);
        assert_eq!(classify(HttpResponse::new(503)), Classification::Transient);
        assert_eq!(classify(graph_error(400, 100, false)), Classification::Permanent);
        assert_eq!(
            adapter.classify(&PlatformError::Rejected("ERROR".into())),
            Classification::Permanent
        );
    }

    #[tokio::test]
    async fn test_publish_full_flow() {
        let transport = Arc::new(ScriptedTransport::new());
        script_happy_path(&transport);

        let metadata = VideoMetadata {
            cover: Some(CoverFrame::OffsetMs(1500)),
            share_to_story: true,
            ..VideoMetadata::new("Title", "Body")
        };
        let store = MemoryCheckpointStore::new();
        let published = adapter(transport.clone())
            .publish(&session(), &request(metadata), None, &store)
            .await
            .unwrap();

        assert_eq!(published.video_id, "m-1");
        assert_eq!(published.url, "https://www.instagram.com/reel/ABC/");

        let create = &transport.requests_to(Method::Post, "/17841/media")[0];
        assert_eq!(create.query_value("media_type"), Some("REELS"));
        assert_eq!(create.query_value("upload_type"), Some("resumable"));
        assert_eq!(create.query_value("thumb_offset"), Some("1500"));
        assert_eq!(create.query_value("share_to_story"), Some("true"));
        assert_eq!(create.query_value("caption"), Some("Title\n\nBody\n\n#Reels"));

        let upload = &transport.requests_to(Method::Post, "rupload.test/c-1")[0];
        assert_eq!(upload.header_value("offset"), Some("0"));
        assert_eq!(upload.header_value("file_size"), Some("10"));
        assert_eq!(upload.header_value("Authorization"), Some("OAuth ig-token"));

        let saved = store.load(PlatformId::Instagram, "fp").await.unwrap().unwrap();
        assert!(saved.is_complete());
        assert_eq!(transport.pending(), 0);
    }

    #[tokio::test]
    async fn test_permalink_fallback() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(
                Method::Post,
                "/17841/media",
                json_response(json!({"id": "c-1"})),
            )
            .on(Method::Post, "rupload.test/c-1", json_response(json!({"success": true})))
            .on(
                Method::Get,
                "graph.test/c-1",
                json_response(json!({"status_code": "FINISHED"})),
            )
            .on(Method::Post, "/media_publish", json_response(json!({"id": "m-9"})))
            .on(Method::Get, "graph.test/m-9", HttpResponse::new(500));

        let published = adapter(transport)
            .publish(
                &session(),
                &request(VideoMetadata::new("Title", "")),
                None,
                &MemoryCheckpointStore::new(),
            )
            .await
            .unwrap();

        assert_eq!(published.url, "https://instagram.com/reel/m-9");
    }

    #[tokio::test]
    async fn test_container_error_is_permanent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(
                Method::Post,
                "/17841/media",
                json_response(json!({"id": "c-1", "uri": "https://rupload.test/c-1"})),
            )
            .on(Method::Post, "rupload.test/c-1", json_response(json!({"success": true})))
            .on(
                Method::Get,
                "graph.test/c-1",
                json_response(json!({"status_code": "ERROR", "status": "Error: unsupported codec"})),
            );

        let adapter = adapter(transport);
        let failure = adapter
            .publish(
                &session(),
                &request(VideoMetadata::new("Title", "")),
                None,
                &MemoryCheckpointStore::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PlatformError::Rejected(_)));
        assert_eq!(adapter.classify(&failure.error), Classification::Permanent);
    }

    #[tokio::test]
    async fn test_processing_never_finishes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(
                Method::Post,
                "/17841/media",
                json_response(json!({"id": "c-1", "uri": "https://rupload.test/c-1"})),
            )
            .on(Method::Post, "rupload.test/c-1", json_response(json!({"success": true})))
            .always(
                Method::Get,
                "graph.test/c-1",
                json_response(json!({"status_code": "IN_PROGRESS"})),
            );

        let adapter = adapter(transport.clone());
        let failure = adapter
            .publish(
                &session(),
                &request(VideoMetadata::new("Title", "")),
                None,
                &MemoryCheckpointStore::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(adapter.classify(&failure.error), Classification::Transient);
        assert_eq!(transport.requests_to(Method::Get, "graph.test/c-1").len(), 3);
        // bytes already uploaded, a retry only polls again
        assert!(failure.resume.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_resume_skips_container_creation() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(Method::Post, "rupload.test/c-7", json_response(json!({"success": true})))
            .on(
                Method::Get,
                "graph.test/c-7",
                json_response(json!({"status_code": "FINISHED"})),
            )
            .on(Method::Post, "/media_publish", json_response(json!({"id": "m-7"})))
            .on(
                Method::Get,
                "graph.test/m-7",
                json_response(json!({"permalink": "https://www.instagram.com/reel/XYZ/"})),
            );

        let published = adapter(transport.clone())
            .publish(
                &session(),
                &request(VideoMetadata::new("Title", "")),
                Some(ResumeState::new("https://rupload.test/c-7", 6, 10)),
                &MemoryCheckpointStore::new(),
            )
            .await
            .unwrap();

        assert_eq!(published.video_id, "m-7");
        // only the publish call, no new container
        assert_eq!(transport.requests_to(Method::Post, "/17841/media").len(), 1);
        let upload = &transport.requests_to(Method::Post, "rupload.test/c-7")[0];
        assert_eq!(upload.header_value("offset"), Some("6"));
        assert_eq!(upload.body, crate::transport::Body::Bytes(b"6789".to_vec()));
        let publish = &transport.requests_to(Method::Post, "/media_publish")[0];
        assert_eq!(publish.query_value("creation_id"), Some("c-7"));
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_on_code_190() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(Method::Get, "graph.test/me", graph_error(400, 190, false))
            .on(
                Method::Get,
                "/refresh_access_token",
                json_response(json!({"access_token": "ig-token-2", "expires_in": 5183944})),
            )
            .on(Method::Get, "graph.test/me", json_response(json!({"id": "17841"})));

        let mut adapter = adapter(transport.clone());
        let session = adapter.authenticate().await.unwrap();

        assert_eq!(session.token(), "ig-token-2");
        assert_eq!(session.account_id.as_deref(), Some("17841"));
        let refresh = &transport.requests_to(Method::Get, "/refresh_access_token")[0];
        assert_eq!(refresh.query_value("grant_type"), Some("ig_refresh_token"));
        assert_eq!(refresh.query_value("access_token"), Some("ig-token"));
    }

    #[tokio::test]
    async fn test_refresh_failure_is_authentication_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .on(Method::Get, "graph.test/me", graph_error(400, 190, false))
            .on(
                Method::Get,
                "/refresh_access_token",
                graph_error(400, 190, false),
            );

        let mut adapter = adapter(transport);
        let err = adapter.authenticate().await.unwrap_err();
        assert!(matches!(err, PlatformError::Authentication(_)));
        assert_eq!(adapter.classify(&err), Classification::Permanent);
    }
}
