//! Platform abstraction and implementations
//!
//! Each platform is a [`PlatformAdapter`]: it authenticates with its own
//! credential, transfers the shared video, and maps its failures onto the
//! four retry classes. Adapters never retry a whole publish themselves; the
//! orchestrator owns that loop and its counters.
//!
//! # Examples
//!
//! ```no_run
//! use libreelcast::checkpoint::MemoryCheckpointStore;
//! use libreelcast::platforms::PlatformAdapter;
//! use libreelcast::types::UploadRequest;
//!
//! # async fn example(
//! #     mut adapter: Box<dyn PlatformAdapter>,
//! #     request: &UploadRequest,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let checkpoints = MemoryCheckpointStore::new();
//! let session = adapter.authenticate().await?;
//! match adapter.publish(&session, request, None, &checkpoints).await {
//!     Ok(published) => println!("{} -> {}", adapter.platform(), published.url),
//!     Err(failure) => println!("{:?}", adapter.classify(&failure.error)),
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::checkpoint::{CheckpointStore, ResumeState};
use crate::error::{PlatformError, TransportErrorKind};
use crate::retry::Classification;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{PlatformId, UploadRequest};

pub mod instagram;
pub mod youtube;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Proof of a successful authentication, valid for one publish
#[derive(Debug)]
pub struct AuthSession {
    token: SecretString,
    /// Platform account the token belongs to, when the platform reports one
    pub account_id: Option<String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, account_id: Option<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            account_id,
        }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Where a published video ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRef {
    pub video_id: String,
    pub url: String,
}

/// A failed publish, carrying how far the transfer got
#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub error: PlatformError,
    /// Latest acknowledged progress; `None` if no session was opened
    pub resume: Option<ResumeState>,
}

impl PublishFailure {
    pub fn new(error: PlatformError, resume: Option<ResumeState>) -> Self {
        Self { error, resume }
    }
}

impl From<PlatformError> for PublishFailure {
    fn from(error: PlatformError) -> Self {
        Self {
            error,
            resume: None,
        }
    }
}

/// Capability interface every publishing platform implements
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> PlatformId;

    /// Verify the credential, refreshing it once if the platform reports it expired
    async fn authenticate(&mut self) -> Result<AuthSession, PlatformError>;

    /// Force a credential refresh and return a new session
    async fn refresh_session(&mut self) -> Result<AuthSession, PlatformError>;

    /// Transfer and publish the video
    ///
    /// When `resume` is given the transfer continues from its offset. Progress
    /// is written to `checkpoints` after every acknowledged chunk.
    async fn publish(
        &self,
        session: &AuthSession,
        request: &UploadRequest,
        resume: Option<ResumeState>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<PublishedRef, PublishFailure>;

    /// Map a failure onto a retry class
    fn classify(&self, error: &PlatformError) -> Classification;
}

/// Send a request, turning a missing response into a platform transport error
pub(crate) async fn send(
    transport: &dyn HttpTransport,
    context: &str,
    request: HttpRequest,
) -> Result<HttpResponse, PlatformError> {
    transport
        .send(request)
        .await
        .map_err(|failure| PlatformError::transport(context, failure.kind, failure.message))
}

/// Retry class for a request that got no response
pub(crate) fn classify_transport(kind: TransportErrorKind) -> Classification {
    match kind {
        TransportErrorKind::Timeout | TransportErrorKind::Reset | TransportErrorKind::Connect => {
            Classification::Transient
        }
        TransportErrorKind::Other => Classification::Permanent,
    }
}

/// Truncate to at most `max` characters, never splitting a character
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_auth_session_hides_token() {
        let session = AuthSession::new("secret-token", Some("channel".to_string()));
        assert_eq!(session.token(), "secret-token");
        assert!(!format!("{:?}", session).contains("secret-token"));
    }

    #[test]
    fn test_publish_failure_from_platform_error() {
        let failure: PublishFailure = PlatformError::Rejected("duplicate".into()).into();
        assert!(failure.resume.is_none());
    }
}
