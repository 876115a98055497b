//! Mock platform adapter for testing
//!
//! A scriptable adapter that simulates platform behavior without network
//! access. Results for `post`, `verify_exists` and `refresh_token` are taken
//! from per-call scripts first and fall back to a configurable default once a
//! script runs out. Every call is counted, and the access token used for each
//! post is recorded so token refresh flows can be asserted.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::{validate_rules, PlatformAdapter, ValidationResult, VerificationGuarantee};
use crate::transform::PlatformContent;
use crate::types::{Platform, PlatformAccount, PostReceipt, TokenGrant};

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Results returned by successive `post` calls
    pub post_script: VecDeque<PlatformResult<PostReceipt>>,

    /// Error returned once the post script is exhausted (success if `None`)
    pub post_error: Option<PlatformError>,

    /// Results returned by successive `verify_exists` calls
    pub verify_script: VecDeque<PlatformResult<bool>>,

    /// Result once the verify script is exhausted
    pub verify_default: PlatformResult<bool>,

    /// Results returned by successive `refresh_token` calls
    pub refresh_script: VecDeque<PlatformResult<TokenGrant>>,

    /// Error returned once the refresh script is exhausted (success if `None`)
    pub refresh_error: Option<PlatformError>,

    /// Validation errors reported in addition to the rule-table checks
    pub validation_errors: Vec<String>,

    /// Delay before completing `post` (simulates network latency)
    pub delay: Duration,

    pub guarantee: VerificationGuarantee,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            post_script: VecDeque::new(),
            post_error: None,
            verify_script: VecDeque::new(),
            verify_default: Ok(true),
            refresh_script: VecDeque::new(),
            refresh_error: None,
            validation_errors: Vec::new(),
            delay: Duration::ZERO,
            guarantee: VerificationGuarantee::Confirmed,
        }
    }
}

/// Call counters and captured inputs shared with the test that owns the mock
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    pub post: Arc<Mutex<usize>>,
    pub verify: Arc<Mutex<usize>>,
    pub refresh: Arc<Mutex<usize>>,
    /// Access token presented on each `post` call
    pub tokens: Arc<Mutex<Vec<String>>>,
    /// Content handed to each `post` call
    pub posted: Arc<Mutex<Vec<PlatformContent>>>,
}

/// Mock adapter for testing
pub struct MockAdapter {
    config: Mutex<MockConfig>,
    calls: MockCalls,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config: Mutex::new(config),
            calls: MockCalls::default(),
        }
    }

    /// An adapter whose every call succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// An adapter whose `post` always fails with `error`
    pub fn post_failure(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            post_error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// An adapter whose `post` returns the scripted results in order
    pub fn with_post_script(
        platform: Platform,
        script: Vec<PlatformResult<PostReceipt>>,
    ) -> Self {
        Self::new(MockConfig {
            post_script: script.into(),
            ..MockConfig::new(platform)
        })
    }

    /// An adapter whose `post` sleeps before answering
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    /// Script `verify_exists`; `default` answers once the script runs out
    pub fn verify_script(
        self,
        script: Vec<PlatformResult<bool>>,
        default: PlatformResult<bool>,
    ) -> Self {
        self.configure(|c| {
            c.verify_script = script.into();
            c.verify_default = default;
        })
    }

    /// Script `refresh_token` results
    pub fn refresh_script(self, script: Vec<PlatformResult<TokenGrant>>) -> Self {
        self.configure(|c| c.refresh_script = script.into())
    }

    /// Make every `refresh_token` call fail
    pub fn refresh_failure(self, error: PlatformError) -> Self {
        self.configure(|c| c.refresh_error = Some(error))
    }

    pub fn validation_errors(self, errors: Vec<String>) -> Self {
        self.configure(|c| c.validation_errors = errors)
    }

    pub fn guarantee(self, guarantee: VerificationGuarantee) -> Self {
        self.configure(|c| c.guarantee = guarantee)
    }

    fn configure(self, apply: impl FnOnce(&mut MockConfig)) -> Self {
        apply(&mut self.config.lock().unwrap());
        self
    }

    /// A receipt the way the mock fabricates them
    pub fn receipt(platform: Platform, n: usize) -> PostReceipt {
        PostReceipt {
            external_id: format!("{}-post-{}", platform, n),
            external_url: Some(format!("https://{}.example/posts/{}", platform, n)),
        }
    }

    /// A token grant with the given access token
    pub fn grant(access_token: &str) -> TokenGrant {
        TokenGrant {
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: None,
            expires_in: Some(3600),
        }
    }

    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }

    pub fn post_call_count(&self) -> usize {
        *self.calls.post.lock().unwrap()
    }

    pub fn verify_call_count(&self) -> usize {
        *self.calls.verify.lock().unwrap()
    }

    pub fn refresh_call_count(&self) -> usize {
        *self.calls.refresh.lock().unwrap()
    }

    /// Access tokens presented to `post`, in call order
    pub fn tokens_used(&self) -> Vec<String> {
        self.calls.tokens.lock().unwrap().clone()
    }

    pub fn posted_content(&self) -> Vec<PlatformContent> {
        self.calls.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.lock().unwrap().platform
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let extra = self.config.lock().unwrap().validation_errors.clone();
        validate_rules(content).merge(extra)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let n = {
            let mut count = self.calls.post.lock().unwrap();
            *count += 1;
            *count
        };
        self.calls
            .tokens
            .lock()
            .unwrap()
            .push(account.access_token.expose_secret().to_string());
        self.calls.posted.lock().unwrap().push(content.clone());

        let (delay, scripted, fallback, platform) = {
            let mut config = self.config.lock().unwrap();
            (
                config.delay,
                config.post_script.pop_front(),
                config.post_error.clone(),
                config.platform,
            )
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        match (scripted, fallback) {
            (Some(result), _) => result,
            (None, Some(error)) => Err(error),
            (None, None) => Ok(Self::receipt(platform, n)),
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> PlatformResult<TokenGrant> {
        let n = {
            let mut count = self.calls.refresh.lock().unwrap();
            *count += 1;
            *count
        };

        let mut config = self.config.lock().unwrap();
        match (config.refresh_script.pop_front(), config.refresh_error.clone()) {
            (Some(result), _) => result,
            (None, Some(error)) => Err(error),
            (None, None) => Ok(Self::grant(&format!("refreshed-token-{}", n))),
        }
    }

    async fn verify_exists(
        &self,
        _external_id: &str,
        _account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        *self.calls.verify.lock().unwrap() += 1;

        let mut config = self.config.lock().unwrap();
        config
            .verify_script
            .pop_front()
            .unwrap_or_else(|| config.verify_default.clone())
    }

    fn verification_guarantee(&self) -> VerificationGuarantee {
        self.config.lock().unwrap().guarantee
    }
}
