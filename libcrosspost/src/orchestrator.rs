//! Multi-platform publish orchestration
//!
//! [`PublishOrchestrator::publish`] fans one [`PublishRequest`] out to one leg
//! per requested platform. Each leg runs independently:
//!
//! 1. look up the adapter
//! 2. resolve the linked account, refreshing an expired token first
//! 3. transform and validate the content (no network call on rejection)
//! 4. post with retry, refreshing once if the platform rejects the token
//! 5. verify the post exists
//! 6. queue retryable failures for a later redrive
//!
//! A leg never fails the request. Every leg's outcome is reported on its own
//! in the [`AggregateResult`].

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::accounts::{AccountStore, CredentialResolver};
use crate::config::OrchestratorSettings;
use crate::error::{ErrorKind, PlatformError};
use crate::events::{Event, EventBus};
use crate::platforms::{AdapterRegistry, PlatformAdapter, VerificationGuarantee};
use crate::retry::{retry_when, RetryPolicy};
use crate::retry_queue::{next_retry_at, RetryQueueEntry, RetryQueueStore};
use crate::transform::{transform, PlatformContent};
use crate::types::{
    AggregateResult, LegOutcome, Platform, PlatformAccount, PostReceipt, PublishLegResult,
    PublishRequest,
};
use crate::verifier::{PublishVerifier, VerificationReport};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// How a leg ended, before timestamps and counters are attached
enum LegEnd {
    Posted {
        receipt: PostReceipt,
        report: VerificationReport,
        guarantee: VerificationGuarantee,
    },
    Failed(PlatformError),
    Queued(PlatformError),
}

#[derive(Default)]
struct LegCounters {
    attempts: u32,
    verification_attempts: u32,
}

pub struct PublishOrchestrator {
    registry: AdapterRegistry,
    credentials: CredentialResolver,
    retry_queue: Arc<dyn RetryQueueStore>,
    verifier: PublishVerifier,
    settings: OrchestratorSettings,
    events: Option<EventBus>,
}

impl PublishOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        accounts: Arc<dyn AccountStore>,
        retry_queue: Arc<dyn RetryQueueStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            credentials: CredentialResolver::new(accounts),
            retry_queue,
            verifier: PublishVerifier::from_settings(&settings),
            settings,
            events: None,
        }
    }

    /// Report leg progress on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Publish `request` to every requested platform
    ///
    /// Returns once every leg has reached a terminal state. Duplicate
    /// platforms are collapsed to their first occurrence.
    pub async fn publish(&self, request: &PublishRequest) -> AggregateResult {
        let platforms = request.distinct_platforms();
        info!(
            request_id = %request.id,
            user_id = %request.user_id,
            platforms = platforms.len(),
            "Publishing to platforms"
        );
        self.emit(Event::PublishStarted {
            request_id: request.id.clone(),
            platforms: platforms.clone(),
        });

        let mut legs: Vec<(usize, PublishLegResult)> = stream::iter(platforms.into_iter().enumerate())
            .map(|(index, platform)| async move { (index, self.run_leg(request, platform).await) })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        legs.sort_by_key(|(index, _)| *index);

        let result = AggregateResult::from_legs(
            request.id.clone(),
            legs.into_iter().map(|(_, leg)| leg).collect(),
        );

        info!(
            request_id = %request.id,
            succeeded = result.summary.succeeded,
            unverified = result.summary.unverified,
            failed = result.summary.failed,
            queued = result.summary.queued,
            "Publish finished"
        );
        self.emit(Event::PublishCompleted {
            request_id: request.id.clone(),
            summary: result.summary,
        });

        result
    }

    async fn run_leg(&self, request: &PublishRequest, platform: Platform) -> PublishLegResult {
        let started_at = now();
        self.emit(Event::LegStarted {
            request_id: request.id.clone(),
            platform,
        });

        let mut counters = LegCounters::default();
        let end = self.drive_leg(request, platform, &mut counters).await;

        let mut leg = PublishLegResult {
            platform,
            outcome: LegOutcome::Failed,
            external_post_id: None,
            external_url: None,
            error: None,
            verified: false,
            verification: None,
            attempts: counters.attempts,
            verification_attempts: counters.verification_attempts,
            started_at,
            finished_at: now(),
        };

        match end {
            LegEnd::Posted {
                receipt,
                report,
                guarantee,
            } => {
                leg.verified = report.is_confirmed();
                leg.verification = Some(guarantee);
                leg.outcome = if leg.verified {
                    LegOutcome::Succeeded
                } else {
                    LegOutcome::SucceededUnverified
                };
                leg.error = report.last_error;
                leg.external_post_id = Some(receipt.external_id);
                leg.external_url = receipt.external_url;
            }
            LegEnd::Failed(error) => leg.error = Some(error),
            LegEnd::Queued(error) => {
                leg.outcome = LegOutcome::QueuedForRetry;
                leg.error = Some(error);
            }
        }

        match &leg.error {
            Some(error) if leg.outcome != LegOutcome::Succeeded => warn!(
                %platform,
                outcome = %leg.outcome,
                attempts = leg.attempts,
                kind = %error.kind,
                error = %error.message,
                "Leg finished without confirmation"
            ),
            _ => info!(
                %platform,
                outcome = %leg.outcome,
                attempts = leg.attempts,
                external_id = leg.external_post_id.as_deref().unwrap_or(""),
                "Leg finished"
            ),
        }

        self.emit(Event::LegCompleted {
            request_id: request.id.clone(),
            platform,
            outcome: leg.outcome,
            external_post_id: leg.external_post_id.clone(),
            error: leg.error.as_ref().map(|e| e.to_string()),
        });

        leg
    }

    async fn drive_leg(
        &self,
        request: &PublishRequest,
        platform: Platform,
        counters: &mut LegCounters,
    ) -> LegEnd {
        let Some(adapter) = self.registry.get(platform) else {
            return LegEnd::Failed(PlatformError::new(
                ErrorKind::Unsupported,
                format!("No adapter is registered for {}", platform),
            ));
        };
        let adapter = adapter.as_ref();
        let content = transform(platform, request);

        let mut account = match self.credentials.resolve(&request.user_id, platform).await {
            Ok(account) => account,
            Err(e) if e.is_retryable() => return self.enqueue(request, &content, e, 0).await,
            Err(e) => return LegEnd::Failed(e),
        };

        let mut refreshed = false;
        if CredentialResolver::is_expired(&account, now()) {
            debug!(%platform, "Access token expired, refreshing before publish");
            account = match self.credentials.refresh(adapter, &account, now()).await {
                Ok(account) => account,
                Err(e) => return LegEnd::Failed(e),
            };
            refreshed = true;
        }

        let validation = adapter.validate(&content);
        if !validation.valid {
            warn!(%platform, errors = ?validation.errors, "Content rejected before publishing");
            return LegEnd::Failed(PlatformError::content_rejected(validation.errors));
        }

        let (result, account) = self
            .post_with_retry(request, adapter, account, &content, refreshed, counters)
            .await;

        match result {
            Ok(receipt) => {
                let report = self
                    .verifier
                    .verify(adapter, &receipt.external_id, &account)
                    .await;
                counters.verification_attempts = report.attempts;
                LegEnd::Posted {
                    receipt,
                    report,
                    guarantee: adapter.verification_guarantee(),
                }
            }
            Err(e) if e.is_retryable() => {
                self.enqueue(request, &content, e, counters.attempts).await
            }
            Err(e) => LegEnd::Failed(e),
        }
    }

    /// Post through the retry loop
    ///
    /// A rejected token is refreshed at most once per leg, and only if no
    /// refresh happened before publishing. The attempt after a successful
    /// refresh uses the new token.
    async fn post_with_retry(
        &self,
        request: &PublishRequest,
        adapter: &dyn PlatformAdapter,
        account: PlatformAccount,
        content: &PlatformContent,
        already_refreshed: bool,
        counters: &mut LegCounters,
    ) -> (Result<PostReceipt, PlatformError>, PlatformAccount) {
        let platform = adapter.platform();
        let policy = RetryPolicy::exponential(
            self.settings.post_max_attempts,
            self.settings.post_base_delay(),
        );

        let current = Mutex::new(account);
        let refresh_used = AtomicBool::new(already_refreshed);
        let token_replaced = AtomicBool::new(false);

        let current_ref = &current;
        let refresh_used = &refresh_used;
        let token_replaced = &token_replaced;

        let outcome = retry_when(
            &policy,
            move |attempt| async move {
                let account = current_ref.lock().await.clone();
                debug!(%platform, attempt, "Posting");

                match adapter.post(&account, content).await {
                    Err(e)
                        if e.kind == ErrorKind::InvalidCredentials
                            && account.refresh_token.is_some()
                            && !refresh_used.swap(true, Ordering::SeqCst) =>
                    {
                        info!(%platform, attempt, "Platform rejected token, refreshing");
                        let fresh = self.credentials.refresh(adapter, &account, now()).await?;
                        *current_ref.lock().await = fresh;
                        token_replaced.store(true, Ordering::SeqCst);
                        Err(e)
                    }
                    other => other,
                }
            },
            |e| e.is_retryable() || token_replaced.swap(false, Ordering::SeqCst),
            |attempt, e, delay| {
                warn!(
                    %platform,
                    attempt,
                    kind = %e.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Post attempt failed, retrying"
                );
                self.emit(Event::LegRetrying {
                    request_id: request.id.clone(),
                    platform,
                    attempt,
                    kind: e.kind,
                    delay_ms: delay.as_millis() as u64,
                });
            },
        )
        .await;

        counters.attempts = outcome.attempts;
        (outcome.result, current.into_inner())
    }

    /// Record a retryable failure in the retry queue
    ///
    /// The leg is reported as queued only if the entry was stored.
    async fn enqueue(
        &self,
        request: &PublishRequest,
        content: &PlatformContent,
        error: PlatformError,
        attempts: u32,
    ) -> LegEnd {
        let platform = content.platform;
        let queued_at = now();
        let next_at = next_retry_at(queued_at, self.settings.queue_base_delay(), attempts);

        let entry = match RetryQueueEntry::new(
            request.user_id.clone(),
            content,
            attempts,
            &error,
            next_at,
            queued_at,
        ) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%platform, error = %e, "Could not serialize leg for the retry queue");
                return LegEnd::Failed(error);
            }
        };

        let entry_id = entry.id.clone();
        match self.retry_queue.enqueue(entry).await {
            Ok(()) => {
                info!(%platform, entry_id = %entry_id, next_retry_at = next_at, "Leg queued for retry");
                LegEnd::Queued(error)
            }
            Err(e) => {
                warn!(%platform, error = %e, "Failed to enqueue leg for retry");
                LegEnd::Failed(error)
            }
        }
    }
}
