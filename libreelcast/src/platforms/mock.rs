//! Mock platform adapter for testing
//!
//! Simulates authentication failures, scripted publish failures, partial
//! transfers and latency without credentials or network access. Counters
//! live behind `Arc`s so a test can keep a clone of the [`MockConfig`] after
//! handing the adapter to the orchestrator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{classify_transport, AuthSession, PlatformAdapter, PublishFailure, PublishedRef};
use crate::checkpoint::{CheckpointStore, ResumeState};
use crate::error::PlatformError;
use crate::retry::Classification;
use crate::types::{PlatformId, UploadRequest};

/// One scripted publish attempt
#[derive(Debug, Clone)]
pub enum MockStep {
    Succeed,
    Fail(PlatformError),
    /// Fail after the transfer reached `offset` bytes
    FailAt { error: PlatformError, offset: u64 },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: PlatformId,

    /// Error returned by every authentication
    pub auth_error: Option<PlatformError>,

    /// Error returned by every forced refresh
    pub refresh_error: Option<PlatformError>,

    /// Steps consumed by successive publish calls; success once exhausted
    pub steps: Arc<Mutex<VecDeque<MockStep>>>,

    /// Latency added to every publish call
    pub delay: Duration,

    pub auth_calls: Arc<Mutex<usize>>,
    pub refresh_calls: Arc<Mutex<usize>>,
    pub publish_calls: Arc<Mutex<usize>>,

    /// Resume state passed to each publish call, in order
    pub resumes_seen: Arc<Mutex<Vec<Option<ResumeState>>>>,
}

impl MockConfig {
    pub fn new(platform: PlatformId) -> Self {
        Self {
            platform,
            auth_error: None,
            refresh_error: None,
            steps: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            auth_calls: Arc::new(Mutex::new(0)),
            refresh_calls: Arc::new(Mutex::new(0)),
            publish_calls: Arc::new(Mutex::new(0)),
            resumes_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_steps(self, steps: impl IntoIterator<Item = MockStep>) -> Self {
        lock(&self.steps).extend(steps);
        self
    }

    pub fn auth_calls(&self) -> usize {
        *lock(&self.auth_calls)
    }

    pub fn refresh_calls(&self) -> usize {
        *lock(&self.refresh_calls)
    }

    pub fn publish_calls(&self) -> usize {
        *lock(&self.publish_calls)
    }

    pub fn resumes_seen(&self) -> Vec<Option<ResumeState>> {
        lock(&self.resumes_seen).clone()
    }
}

/// Mock adapter for testing
pub struct MockAdapter {
    config: MockConfig,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// An adapter whose every call succeeds
    pub fn success(platform: PlatformId) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// An adapter that fails with each error in turn, then succeeds
    pub fn failing(platform: PlatformId, errors: impl IntoIterator<Item = PlatformError>) -> Self {
        Self::new(MockConfig::new(platform).with_steps(errors.into_iter().map(MockStep::Fail)))
    }

    /// An adapter whose authentication always fails
    pub fn auth_failure(platform: PlatformId, error: PlatformError) -> Self {
        Self::new(MockConfig {
            auth_error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// An adapter that takes `delay` for every publish
    pub fn with_delay(platform: PlatformId, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    fn session(&self) -> AuthSession {
        AuthSession::new("mock-token", Some(format!("mock-{}", self.config.platform)))
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> PlatformId {
        self.config.platform
    }

    async fn authenticate(&mut self) -> Result<AuthSession, PlatformError> {
        *lock(&self.config.auth_calls) += 1;
        match &self.config.auth_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.session()),
        }
    }

    async fn refresh_session(&mut self) -> Result<AuthSession, PlatformError> {
        *lock(&self.config.refresh_calls) += 1;
        match &self.config.refresh_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.session()),
        }
    }

    async fn publish(
        &self,
        _session: &AuthSession,
        request: &UploadRequest,
        resume: Option<ResumeState>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<PublishedRef, PublishFailure> {
        *lock(&self.config.publish_calls) += 1;
        lock(&self.config.resumes_seen).push(resume.clone());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let step = lock(&self.config.steps)
            .pop_front()
            .unwrap_or(MockStep::Succeed);

        match step {
            MockStep::Succeed => {
                let video_id = format!("mock-{}-{}", self.config.platform, uuid::Uuid::new_v4());
                Ok(PublishedRef {
                    url: format!("https://mock.invalid/{}/{}", self.config.platform, video_id),
                    video_id,
                })
            }
            MockStep::Fail(error) => Err(PublishFailure::new(error, resume)),
            MockStep::FailAt { error, offset } => {
                let total = request.source().len();
                let state = ResumeState::new(
                    format!("https://mock.invalid/session/{}", self.config.platform),
                    offset.min(total),
                    total,
                );
                // recorded like a real adapter would after an acknowledged chunk
                let _ = checkpoints
                    .save(self.config.platform, request.fingerprint(), &state)
                    .await;
                Err(PublishFailure::new(error, Some(state)))
            }
        }
    }

    fn classify(&self, error: &PlatformError) -> Classification {
        match error {
            PlatformError::Http {
                status,
                retry_after,
                ..
            } => match status {
                401 => Classification::AuthExpired,
                429 => Classification::RateLimited(*retry_after),
                500..=599 => Classification::Transient,
                _ => Classification::Permanent,
            },
            PlatformError::Transport { kind, .. } => classify_transport(*kind),
            _ => Classification::Permanent,
        }
    }
}
