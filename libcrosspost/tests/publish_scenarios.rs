//! End-to-end publish flows against scripted platform adapters

use libcrosspost::accounts::InMemoryAccountStore;
use libcrosspost::config::OrchestratorSettings;
use libcrosspost::error::{ErrorKind, PlatformError};
use libcrosspost::platforms::mock::MockAdapter;
use libcrosspost::platforms::AdapterRegistry;
use libcrosspost::retry_queue::{InMemoryRetryQueue, RetryQueueStore};
use libcrosspost::transform::transform;
use libcrosspost::types::{LegOutcome, MediaRef, Platform, PlatformAccount, PublishRequest};
use libcrosspost::{AccountStore, Database, PublishOrchestrator};
use std::sync::Arc;
use tempfile::TempDir;

fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        post_base_delay_ms: 1,
        verify_retry_delay_ms: 1,
        ..Default::default()
    }
}

fn account(platform: Platform) -> PlatformAccount {
    PlatformAccount::new("user-1", platform, "ext-1", "studio", "token-1")
        .with_refresh_token("refresh-1")
}

fn image() -> MediaRef {
    MediaRef::new("https://cdn.example.com/photo.jpg", "image/jpeg", 2048)
}

struct Harness {
    orchestrator: PublishOrchestrator,
    queue: Arc<InMemoryRetryQueue>,
}

fn harness(adapters: &[Arc<MockAdapter>], accounts: Vec<PlatformAccount>) -> Harness {
    let mut builder = AdapterRegistry::builder();
    for adapter in adapters {
        builder = builder.register(adapter.clone());
    }

    let queue = Arc::new(InMemoryRetryQueue::new());
    let orchestrator = PublishOrchestrator::new(
        builder.build(),
        Arc::new(InMemoryAccountStore::with_accounts(accounts)),
        queue.clone(),
        fast_settings(),
    );

    Harness {
        orchestrator,
        queue,
    }
}

#[tokio::test]
async fn overlong_tweet_is_rejected_without_network_call() {
    let twitter = Arc::new(MockAdapter::success(Platform::Twitter));
    let h = harness(&[twitter.clone()], vec![account(Platform::Twitter)]);

    let request = PublishRequest::new("user-1", "a".repeat(300), vec![Platform::Twitter]);
    let result = h.orchestrator.publish(&request).await;

    let leg = result.leg(Platform::Twitter).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Failed);
    let error = leg.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::ContentRejected);
    assert!(error.details.iter().any(|e| e.contains("280")));
    assert_eq!(leg.attempts, 0);
    assert_eq!(twitter.post_call_count(), 0);
    assert_eq!(twitter.verify_call_count(), 0);
}

#[tokio::test]
async fn instagram_without_media_is_rejected_without_network_call() {
    let instagram = Arc::new(MockAdapter::success(Platform::Instagram));
    let h = harness(&[instagram.clone()], vec![account(Platform::Instagram)]);

    let request = PublishRequest::new("user-1", "Sunset", vec![Platform::Instagram]);
    let result = h.orchestrator.publish(&request).await;

    let error = result.leg(Platform::Instagram).unwrap().error.clone().unwrap();
    assert_eq!(error.kind, ErrorKind::ContentRejected);
    assert!(error.message.contains("requires at least one media item"));
    assert_eq!(instagram.post_call_count(), 0);
}

#[tokio::test]
async fn verification_succeeds_on_third_check() {
    let facebook = Arc::new(
        MockAdapter::success(Platform::Facebook).verify_script(vec![Ok(false), Ok(false)], Ok(true)),
    );
    let h = harness(&[facebook.clone()], vec![account(Platform::Facebook)]);

    let request = PublishRequest::new("user-1", "New menu is live", vec![Platform::Facebook]);
    let result = h.orchestrator.publish(&request).await;

    let leg = result.leg(Platform::Facebook).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Succeeded);
    assert!(leg.verified);
    assert_eq!(leg.verification_attempts, 3);
    assert_eq!(leg.external_post_id.as_deref(), Some("facebook-post-1"));
    assert_eq!(facebook.verify_call_count(), 3);
}

#[tokio::test]
async fn unconfirmed_post_is_reported_unverified() {
    let linkedin = Arc::new(MockAdapter::success(Platform::LinkedIn).verify_script(vec![], Ok(false)));
    let h = harness(&[linkedin.clone()], vec![account(Platform::LinkedIn)]);

    let request = PublishRequest::new("user-1", "Hiring!", vec![Platform::LinkedIn]);
    let result = h.orchestrator.publish(&request).await;

    assert_eq!(result.summary.unverified, 1);
    let leg = &result.unverified[0];
    assert!(!leg.verified);
    assert!(leg.external_post_id.is_some());
    assert_eq!(
        leg.error.as_ref().unwrap().kind,
        ErrorKind::VerificationTimeout
    );
}

#[tokio::test]
async fn rate_limited_leg_is_queued_after_three_attempts() {
    let facebook = Arc::new(MockAdapter::post_failure(
        Platform::Facebook,
        PlatformError::rate_limited("Too many calls"),
    ));
    let h = harness(&[facebook.clone()], vec![account(Platform::Facebook)]);

    let request = PublishRequest::new("user-1", "Weekend sale", vec![Platform::Facebook]);
    let result = h.orchestrator.publish(&request).await;

    assert_eq!(result.summary.queued, 1);
    assert_eq!(result.summary.succeeded, 0);
    let leg = &result.pending[0];
    assert_eq!(leg.outcome, LegOutcome::QueuedForRetry);
    assert_eq!(leg.attempts, 3);
    assert_eq!(facebook.post_call_count(), 3);
    assert_eq!(facebook.verify_call_count(), 0);

    let entries = h.queue.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.platform, Platform::Facebook);
    assert_eq!(entry.attempt_count, 3);
    assert!(entry.next_retry_at >= entry.created_at + 60 * 8);
    assert_eq!(
        entry.content().unwrap(),
        transform(Platform::Facebook, &request)
    );
}

#[tokio::test]
async fn missing_account_does_not_affect_other_leg() {
    let twitter = Arc::new(MockAdapter::success(Platform::Twitter));
    let linkedin = Arc::new(MockAdapter::success(Platform::LinkedIn));
    let h = harness(
        &[twitter.clone(), linkedin.clone()],
        vec![account(Platform::LinkedIn)],
    );

    for platforms in [
        vec![Platform::Twitter, Platform::LinkedIn],
        vec![Platform::LinkedIn, Platform::Twitter],
    ] {
        let request = PublishRequest::new("user-1", "Both please", platforms);
        let result = h.orchestrator.publish(&request).await;

        assert_eq!(result.summary.requested, 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.successful.len(), 1);
        assert_eq!(result.failed[0].platform, Platform::Twitter);
        assert_eq!(
            result.failed[0].error.as_ref().unwrap().kind,
            ErrorKind::AccountNotConnected
        );
        assert_eq!(result.successful[0].platform, Platform::LinkedIn);
    }
    assert_eq!(twitter.post_call_count(), 0);
}

#[tokio::test]
async fn one_result_per_distinct_platform() {
    let adapters: Vec<Arc<MockAdapter>> = [Platform::Twitter, Platform::Facebook, Platform::LinkedIn]
        .into_iter()
        .map(|p| Arc::new(MockAdapter::success(p)))
        .collect();
    let h = harness(
        &adapters,
        vec![
            account(Platform::Twitter),
            account(Platform::Facebook),
            account(Platform::LinkedIn),
        ],
    );

    let request = PublishRequest::new(
        "user-1",
        "Everywhere at once",
        vec![
            Platform::LinkedIn,
            Platform::Twitter,
            Platform::LinkedIn,
            Platform::Facebook,
            Platform::Pinterest,
        ],
    );
    let result = h.orchestrator.publish(&request).await;

    assert_eq!(result.summary.requested, 4);
    assert_eq!(result.legs().count(), 4);
    assert_eq!(result.summary.succeeded, 3);
    assert_eq!(
        result.leg(Platform::Pinterest).unwrap().error.as_ref().unwrap().kind,
        ErrorKind::Unsupported
    );
    // Successful legs keep request order
    let order: Vec<Platform> = result.successful.iter().map(|l| l.platform).collect();
    assert_eq!(
        order,
        vec![Platform::LinkedIn, Platform::Twitter, Platform::Facebook]
    );
    assert_eq!(adapters[2].post_call_count(), 1);
}

#[tokio::test]
async fn empty_platform_list_yields_empty_result() {
    let h = harness(&[], vec![]);
    let request = PublishRequest::new("user-1", "Nowhere", vec![]);
    let result = h.orchestrator.publish(&request).await;

    assert_eq!(result.summary.requested, 0);
    assert_eq!(result.legs().count(), 0);
}

#[tokio::test]
async fn permanent_error_is_not_retried_or_queued() {
    let instagram = Arc::new(MockAdapter::post_failure(
        Platform::Instagram,
        PlatformError::new(ErrorKind::PermissionDenied, "Page not authorized"),
    ));
    let h = harness(&[instagram.clone()], vec![account(Platform::Instagram)]);

    let request = PublishRequest::new("user-1", "Carousel", vec![Platform::Instagram])
        .with_media(vec![image(), image()]);
    let result = h.orchestrator.publish(&request).await;

    let leg = result.leg(Platform::Instagram).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Failed);
    assert_eq!(leg.attempts, 1);
    assert_eq!(instagram.post_call_count(), 1);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn transient_error_recovers_within_attempts() {
    let facebook = Arc::new(MockAdapter::with_post_script(
        Platform::Facebook,
        vec![
            Err(PlatformError::transient("502 Bad Gateway")),
            Err(PlatformError::timeout("timed out")),
        ],
    ));
    let h = harness(&[facebook.clone()], vec![account(Platform::Facebook)]);

    let request = PublishRequest::new("user-1", "Third time lucky", vec![Platform::Facebook]);
    let result = h.orchestrator.publish(&request).await;

    let leg = result.leg(Platform::Facebook).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Succeeded);
    assert_eq!(leg.attempts, 3);
    assert_eq!(leg.external_post_id.as_deref(), Some("facebook-post-3"));
}

#[tokio::test]
async fn failed_pre_publish_refresh_fails_leg() {
    let youtube = Arc::new(
        MockAdapter::success(Platform::YouTube)
            .refresh_failure(PlatformError::new(ErrorKind::InvalidCredentials, "invalid_grant")),
    );
    let expired = account(Platform::YouTube).with_expiry(1);
    let h = harness(&[youtube.clone()], vec![expired]);

    let request = PublishRequest::new("user-1", "Launch", vec![Platform::YouTube]).with_media(vec![
        MediaRef::new("https://cdn.example.com/launch.mp4", "video/mp4", 4096),
    ]);
    let result = h.orchestrator.publish(&request).await;

    let leg = result.leg(Platform::YouTube).unwrap();
    assert_eq!(leg.outcome, LegOutcome::Failed);
    assert_eq!(leg.error.as_ref().unwrap().kind, ErrorKind::CredentialInvalid);
    assert_eq!(youtube.refresh_call_count(), 1);
    assert_eq!(youtube.post_call_count(), 0);
}

#[test]
fn transform_is_idempotent() {
    let request = PublishRequest::new(
        "user-1",
        format!("{} #Launch #launch #rust", "word ".repeat(700)),
        Platform::ALL.to_vec(),
    )
    .with_media(vec![image()]);

    for platform in Platform::ALL {
        let first = transform(platform, &request);
        let second = transform(platform, &request);
        assert_eq!(first, second, "{} transform must be deterministic", platform);
    }
}

#[tokio::test]
async fn sqlite_stores_back_the_orchestrator() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crosspost.db");
    let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());
    db.save_account(&account(Platform::LinkedIn)).await.unwrap();

    let linkedin = Arc::new(MockAdapter::post_failure(
        Platform::LinkedIn,
        PlatformError::transient("503"),
    ));
    let orchestrator = PublishOrchestrator::new(
        AdapterRegistry::builder().register(linkedin).build(),
        db.clone(),
        db.clone(),
        fast_settings(),
    );

    let request = PublishRequest::new("user-1", "Persist me", vec![Platform::LinkedIn]);
    let result = orchestrator.publish(&request).await;

    assert_eq!(result.summary.queued, 1);
    assert_eq!(db.len().await.unwrap(), 1);
    let due = db.due(i64::MAX, 10).await.unwrap();
    assert_eq!(due[0].content().unwrap().text, "Persist me");
}
