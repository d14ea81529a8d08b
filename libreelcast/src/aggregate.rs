//! Collect per-platform outcomes into a request-ordered result

use std::time::Duration;

use tracing::debug;

use crate::types::{ErrorKind, PlatformId, UploadOutcome, UploadResult};

/// Order outcomes by the requested platform order
///
/// Completion order is irrelevant. A requested platform without an outcome
/// is reported as cancelled; outcomes for platforms that were not requested
/// are dropped.
pub fn aggregate(requested: &[PlatformId], outcomes: Vec<UploadOutcome>) -> UploadResult {
    let mut remaining: Vec<Option<UploadOutcome>> = outcomes.into_iter().map(Some).collect();

    let ordered = requested
        .iter()
        .map(|platform| {
            remaining
                .iter_mut()
                .find(|slot| matches!(slot, Some(o) if o.platform == *platform))
                .and_then(Option::take)
                .unwrap_or_else(|| {
                    UploadOutcome::failure(
                        *platform,
                        ErrorKind::Cancelled,
                        "Upload did not run",
                        Duration::ZERO,
                        0,
                    )
                })
        })
        .collect();

    for extra in remaining.into_iter().flatten() {
        debug!("Dropping outcome for unrequested platform {}", extra.platform);
    }

    UploadResult::from_ordered(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(platform: PlatformId) -> UploadOutcome {
        UploadOutcome::success(
            platform,
            "id".to_string(),
            "https://example.invalid".to_string(),
            Duration::from_secs(1),
            1,
        )
    }

    #[test]
    fn test_orders_by_request() {
        let result = aggregate(
            &[PlatformId::YouTube, PlatformId::Instagram],
            vec![ok(PlatformId::Instagram), ok(PlatformId::YouTube)],
        );

        let order: Vec<PlatformId> = result.outcomes().iter().map(|o| o.platform).collect();
        assert_eq!(order, vec![PlatformId::YouTube, PlatformId::Instagram]);
    }

    #[test]
    fn test_missing_outcome_is_cancelled() {
        let result = aggregate(
            &[PlatformId::YouTube, PlatformId::Instagram],
            vec![ok(PlatformId::YouTube)],
        );

        assert_eq!(result.len(), 2);
        let instagram = result.get(PlatformId::Instagram).unwrap();
        assert!(!instagram.success);
        assert_eq!(instagram.error_kind(), Some(ErrorKind::Cancelled));
        assert_eq!(instagram.attempts, 0);
    }

    #[test]
    fn test_unrequested_outcomes_dropped() {
        let result = aggregate(
            &[PlatformId::Instagram],
            vec![ok(PlatformId::YouTube), ok(PlatformId::Instagram)],
        );
        assert_eq!(result.len(), 1);
        assert!(result.all_succeeded());
    }
}
