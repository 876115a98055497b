//! Post-publish verification
//!
//! A platform accepting a publish call is not proof the content is live.
//! [`PublishVerifier`] asks the adapter whether the post exists, retrying
//! with a linear backoff before settling on an unconfirmed report.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::OrchestratorSettings;
use crate::error::{ErrorKind, PlatformError};
use crate::platforms::PlatformAdapter;
use crate::retry::RetryPolicy;
use crate::types::PlatformAccount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Confirmed,
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    /// Number of `verify_exists` calls made
    pub attempts: u32,
    /// Last raised error, or a `VerificationTimeout` when the platform only
    /// ever answered "not found"
    pub last_error: Option<PlatformError>,
}

impl VerificationReport {
    pub fn is_confirmed(&self) -> bool {
        self.status == VerificationStatus::Confirmed
    }
}

#[derive(Debug, Clone)]
pub struct PublishVerifier {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for PublishVerifier {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl PublishVerifier {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self::new(settings.verify_max_attempts, settings.verify_retry_delay())
    }

    pub async fn verify(
        &self,
        adapter: &dyn PlatformAdapter,
        external_id: &str,
        account: &PlatformAccount,
    ) -> VerificationReport {
        let platform = adapter.platform();
        let policy = RetryPolicy::linear(self.max_retries.max(1), self.retry_delay);
        let mut last_error = None;
        let mut attempt = 0;

        while attempt < policy.max_attempts {
            attempt += 1;

            match adapter.verify_exists(external_id, account).await {
                Ok(true) => {
                    debug!(%platform, external_id, attempt, "Post confirmed");
                    return VerificationReport {
                        status: VerificationStatus::Confirmed,
                        attempts: attempt,
                        last_error: None,
                    };
                }
                Ok(false) => {
                    debug!(%platform, external_id, attempt, "Post not visible yet");
                }
                Err(e) => {
                    debug!(%platform, external_id, attempt, error = %e, "Verification call failed");
                    last_error = Some(e);
                }
            }

            if attempt < policy.max_attempts {
                sleep(policy.delay_for(attempt)).await;
            }
        }

        warn!(%platform, external_id, attempts = attempt, "Could not confirm post");

        VerificationReport {
            status: VerificationStatus::Unconfirmed,
            attempts: attempt,
            last_error: Some(last_error.unwrap_or_else(|| {
                PlatformError::new(
                    ErrorKind::VerificationTimeout,
                    format!(
                        "{} post {} was not found after {} checks",
                        platform, external_id, attempt
                    ),
                )
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockAdapter;
    use crate::types::Platform;
    use std::time::Instant;

    fn account() -> PlatformAccount {
        PlatformAccount::new("u", Platform::Instagram, "17841", "studio", "token")
    }

    fn fast() -> PublishVerifier {
        PublishVerifier::new(3, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_confirmed_on_first_check() {
        let adapter = MockAdapter::success(Platform::Instagram);
        let report = fast().verify(&adapter, "media-1", &account()).await;

        assert!(report.is_confirmed());
        assert_eq!(report.attempts, 1);
        assert!(report.last_error.is_none());
        assert_eq!(adapter.verify_call_count(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_after_errors() {
        let adapter = MockAdapter::success(Platform::Instagram).verify_script(
            vec![Err(PlatformError::transient("503")), Ok(false)],
            Ok(true),
        );
        let report = fast().verify(&adapter, "media-1", &account()).await;

        assert!(report.is_confirmed());
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn test_never_found_is_verification_timeout() {
        let adapter = MockAdapter::success(Platform::Instagram).verify_script(vec![], Ok(false));
        let report = fast().verify(&adapter, "media-1", &account()).await;

        assert_eq!(report.status, VerificationStatus::Unconfirmed);
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.last_error.unwrap().kind,
            ErrorKind::VerificationTimeout
        );
        assert_eq!(adapter.verify_call_count(), 3);
    }

    #[tokio::test]
    async fn test_keeps_last_raised_error() {
        let adapter = MockAdapter::success(Platform::Instagram).verify_script(
            vec![Err(PlatformError::rate_limited("slow down")), Ok(false)],
            Ok(false),
        );
        let report = fast().verify(&adapter, "media-1", &account()).await;

        let error = report.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert_eq!(error.message, "slow down");
    }

    #[tokio::test]
    async fn test_linear_backoff_without_trailing_sleep() {
        let verifier = PublishVerifier::new(3, Duration::from_millis(40));
        let adapter = MockAdapter::success(Platform::Instagram).verify_script(vec![], Ok(false));

        let started = Instant::now();
        verifier.verify(&adapter, "media-1", &account()).await;
        let elapsed = started.elapsed();

        // 40ms + 80ms between three checks, nothing after the last
        assert!(elapsed >= Duration::from_millis(120));
        assert!(elapsed < Duration::from_millis(235));
    }
}
