//! Concurrent per-platform publishing with retry
//!
//! Every platform that passed validation runs as its own unit: authenticate,
//! publish, classify failures, consult the [`RetryPolicy`], sleep and retry.
//! Units share nothing but the read-only request and the checkpoint store,
//! so a failure on one platform never affects another.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, ResumeState};
use crate::error::{PlatformError, ReelcastError, Result};
use crate::platforms::{AuthSession, PlatformAdapter, PublishedRef};
use crate::retry::{Classification, RetryDecision, RetryPolicy};
use crate::types::{ErrorKind, PlatformId, UploadOutcome, UploadRequest, UploadResult};
use crate::validation::Validated;

/// Why a unit stopped without publishing
#[derive(Debug)]
struct UnitFailure {
    kind: ErrorKind,
    message: String,
}

impl UnitFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome kind for a failure the policy gave up on
fn failure_kind(classification: Classification, error: &PlatformError) -> ErrorKind {
    match classification {
        Classification::Transient => ErrorKind::Transient,
        Classification::RateLimited(_) => ErrorKind::RateLimited,
        Classification::AuthExpired => ErrorKind::Authentication,
        Classification::Permanent => match error {
            PlatformError::Authentication(_) | PlatformError::NotConfigured(_) => {
                ErrorKind::Authentication
            }
            _ => ErrorKind::Rejected,
        },
    }
}

/// Runs one upload request against a set of platform adapters
pub struct UploadOrchestrator {
    policy: RetryPolicy,
    platform_timeout: Option<Duration>,
    deadline: Option<Duration>,
    checkpoints: Arc<dyn CheckpointStore>,
    resume_from_checkpoint: bool,
}

impl UploadOrchestrator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            platform_timeout: None,
            deadline: None,
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            resume_from_checkpoint: false,
        }
    }

    /// Bound each platform's unit, retries and sleeps included
    pub fn with_platform_timeout(mut self, timeout: Duration) -> Self {
        self.platform_timeout = Some(timeout);
        self
    }

    /// Bound the whole call; units still running when it passes time out
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Continue transfers recorded by an earlier call for the same content
    pub fn resume_from_checkpoint(mut self, enabled: bool) -> Self {
        self.resume_from_checkpoint = enabled;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Publish a validated request to every platform that passed validation
    ///
    /// Returns one outcome per requested platform, in request order.
    /// Platforms that failed validation get a validation outcome without any
    /// network call. Adapters for platforms that were not requested, or that
    /// failed validation, are dropped unused.
    ///
    /// # Errors
    ///
    /// Returns `ReelcastError::InvalidInput` if a platform that passed
    /// validation has no adapter.
    pub async fn run(
        &self,
        validated: Validated,
        adapters: Vec<Box<dyn PlatformAdapter>>,
        cancel: CancellationToken,
    ) -> Result<UploadResult> {
        let Validated { report, request } = validated;
        let requested = request.platforms().to_vec();

        let mut outcomes: Vec<UploadOutcome> = report
            .failing_platforms()
            .into_iter()
            .map(|p| UploadOutcome::validation_failure(p, report.failure_summary(p)))
            .collect();

        if report.all_failed() {
            warn!("Video failed validation for every requested platform");
            return Ok(aggregate(&requested, outcomes));
        }

        let mut adapters = adapters;
        let mut units = Vec::new();
        for platform in report.passing_platforms() {
            let index = adapters
                .iter()
                .position(|a| a.platform() == platform)
                .ok_or_else(|| {
                    ReelcastError::InvalidInput(format!("No adapter supplied for {}", platform))
                })?;
            units.push(adapters.swap_remove(index));
        }

        let deadline = self.deadline.map(|d| Instant::now() + d);
        let futures = units
            .into_iter()
            .map(|adapter| self.run_unit(adapter, request.clone(), cancel.clone(), deadline));

        outcomes.extend(join_all(futures).await);
        Ok(aggregate(&requested, outcomes))
    }

    async fn run_unit(
        &self,
        mut adapter: Box<dyn PlatformAdapter>,
        request: Arc<UploadRequest>,
        cancel: CancellationToken,
        call_deadline: Option<Instant>,
    ) -> UploadOutcome {
        let platform = adapter.platform();
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        if cancel.is_cancelled() {
            return UploadOutcome::failure(
                platform,
                ErrorKind::Cancelled,
                "Upload cancelled before it started",
                Duration::ZERO,
                0,
            );
        }

        let unit_deadline = self.platform_timeout.map(|t| started + t);
        let deadline = match (unit_deadline, call_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let work = self.attempt_loop(adapter.as_mut(), &request, &attempts);
        let bounded = async {
            match deadline {
                Some(at) => timeout_at(at, work).await.unwrap_or_else(|_| {
                    Err(UnitFailure::new(
                        ErrorKind::TimedOut,
                        format!("Upload to {} timed out", platform),
                    ))
                }),
                None => work.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UnitFailure::new(
                ErrorKind::Cancelled,
                format!("Upload to {} cancelled", platform),
            )),
            result = bounded => result,
        };

        let elapsed = started.elapsed();
        let attempts = attempts.load(Ordering::SeqCst);
        match result {
            Ok(published) => {
                info!(
                    "Published to {} in {:.1}s ({} attempt(s)): {}",
                    platform,
                    elapsed.as_secs_f64(),
                    attempts,
                    published.url
                );
                UploadOutcome::success(platform, published.video_id, published.url, elapsed, attempts)
            }
            Err(failure) => {
                warn!(
                    "Upload to {} failed ({}): {}",
                    platform, failure.kind, failure.message
                );
                UploadOutcome::failure(platform, failure.kind, failure.message, elapsed, attempts)
            }
        }
    }

    async fn load_checkpoint(
        &self,
        platform: PlatformId,
        request: &UploadRequest,
    ) -> Option<ResumeState> {
        if !self.resume_from_checkpoint {
            return None;
        }
        match self.checkpoints.load(platform, request.fingerprint()).await {
            Ok(Some(state)) if state.total == request.source().len() => {
                info!(
                    "Found {} checkpoint at {}/{} bytes",
                    platform, state.offset, state.total
                );
                Some(state)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Could not load {} checkpoint: {}", platform, e);
                None
            }
        }
    }

    /// Authenticate, retrying failures the policy considers retryable
    async fn authenticate(
        &self,
        adapter: &mut dyn PlatformAdapter,
    ) -> std::result::Result<AuthSession, UnitFailure> {
        let platform = adapter.platform();
        let mut attempt_index = 0u32;
        loop {
            match adapter.authenticate().await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    let classification = adapter.classify(&e);
                    let decision = match classification {
                        Classification::Transient | Classification::RateLimited(_) => self
                            .policy
                            .decide(classification, attempt_index, rand::random::<f64>()),
                        _ => RetryDecision::GiveUp,
                    };
                    match decision {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(
                                "Authentication with {} failed: {}. Retrying in {:.1}s",
                                platform,
                                e,
                                delay.as_secs_f64()
                            );
                            sleep(delay).await;
                            attempt_index += 1;
                        }
                        RetryDecision::GiveUp => {
                            let kind = match classification {
                                Classification::Transient => ErrorKind::Transient,
                                Classification::RateLimited(_) => ErrorKind::RateLimited,
                                _ => ErrorKind::Authentication,
                            };
                            return Err(UnitFailure::new(kind, e.to_string()));
                        }
                    }
                }
            }
        }
    }

    async fn attempt_loop(
        &self,
        adapter: &mut dyn PlatformAdapter,
        request: &UploadRequest,
        attempts: &AtomicU32,
    ) -> std::result::Result<PublishedRef, UnitFailure> {
        let platform = adapter.platform();
        let mut session = self.authenticate(adapter).await?;
        let mut resume = self.load_checkpoint(platform, request).await;
        let mut refreshed = false;
        // publish calls made right after a forced refresh are not charged
        let mut uncharged = 0u32;

        loop {
            let call = attempts.fetch_add(1, Ordering::SeqCst);
            let attempt_index = call.saturating_sub(uncharged);
            debug!("Publishing to {} (call {})", platform, call + 1);

            let given = resume.clone();
            let failure = match adapter
                .publish(&session, request, resume.take(), self.checkpoints.as_ref())
                .await
            {
                Ok(published) => {
                    if let Err(e) = self.checkpoints.clear(platform, request.fingerprint()).await {
                        warn!("Could not clear {} checkpoint: {}", platform, e);
                    }
                    return Ok(published);
                }
                Err(failure) => failure,
            };

            resume = failure.resume.or(given);
            let classification = adapter.classify(&failure.error);

            if classification == Classification::AuthExpired && !refreshed {
                refreshed = true;
                uncharged += 1;
                warn!("{} session expired, refreshing credential", platform);
                session = adapter
                    .refresh_session()
                    .await
                    .map_err(|e| UnitFailure::new(ErrorKind::Authentication, e.to_string()))?;
                continue;
            }

            match self
                .policy
                .decide(classification, attempt_index, rand::random::<f64>())
            {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Upload to {} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                        platform,
                        attempt_index + 1,
                        self.policy.max_attempts,
                        failure.error,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    return Err(UnitFailure::new(
                        failure_kind(classification, &failure.error),
                        failure.error.to_string(),
                    ));
                }
            }
        }
    }
}
