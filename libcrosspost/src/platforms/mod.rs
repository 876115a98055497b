//! Platform adapters
//!
//! Every supported network is reached through a [`PlatformAdapter`]. Adapters
//! hide endpoint shapes, upload protocols and token exchange, and classify
//! every failure into an [`ErrorKind`](crate::error::ErrorKind) at the HTTP
//! boundary. They never retry their own publish calls; the orchestrator owns
//! retries.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosspost::config::Config;
//! use libcrosspost::platforms::AdapterRegistry;
//! use libcrosspost::types::Platform;
//!
//! # fn example() -> libcrosspost::error::Result<()> {
//! let config = Config::load()?;
//! let registry = AdapterRegistry::from_config(&config)?;
//!
//! if let Some(adapter) = registry.get(Platform::LinkedIn) {
//!     println!("{} adapter registered", adapter.platform());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, PlatformCredentialsConfig};
use crate::error::{PlatformError, PlatformResult, Result};
use crate::transform::{rules, PlatformContent};
use crate::types::{MediaKind, Platform, PlatformAccount, PostReceipt, TokenGrant};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod media;
pub mod pinterest;
pub mod snapchat;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Available outside tests so integration tests can script platform behavior
pub mod mock;

pub use crate::types::VerificationGuarantee;

use self::http::HttpClient;
use self::media::{HttpMediaFetcher, MediaFetcher, MediaSettings};

/// Outcome of content validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Append further errors, keeping the existing ones
    pub fn merge(mut self, errors: Vec<String>) -> Self {
        self.errors.extend(errors);
        self.valid = self.errors.is_empty();
        self
    }

    /// Convert into `Err(ContentRejected)` carrying every error
    pub fn into_result(self) -> PlatformResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(PlatformError::content_rejected(self.errors))
        }
    }
}

/// Check content against the platform's rule table
///
/// Covers emptiness, body and title length, required media and the media
/// count ceiling. Adapters layer their own checks on top.
pub fn validate_rules(content: &PlatformContent) -> ValidationResult {
    let platform = content.platform;
    let rules = rules(platform);
    let mut errors = Vec::new();

    if content.text.trim().is_empty() && content.media.is_empty() {
        errors.push("Content cannot be empty".to_string());
    }

    let length = content.char_count();
    if length > rules.max_length {
        errors.push(format!(
            "Content exceeds {}'s {} character limit (current: {} characters)",
            platform, rules.max_length, length
        ));
    }

    if rules.requires_media && content.media.is_empty() {
        errors.push(format!("{} requires at least one media item", platform));
    }

    if content.media.len() > rules.max_media {
        errors.push(format!(
            "{} allows at most {} media items (current: {})",
            platform,
            rules.max_media,
            content.media.len()
        ));
    }

    if let (Some(limit), Some(title)) = (rules.title_length, content.title.as_deref()) {
        let title_length = title.chars().count();
        if title_length > limit {
            errors.push(format!(
                "Title exceeds {}'s {} character limit (current: {} characters)",
                platform, limit, title_length
            ));
        }
    }

    ValidationResult::from_errors(errors)
}

/// Errors for media whose type the platform cannot take
pub(crate) fn check_media_kinds(content: &PlatformContent, allowed: &[MediaKind]) -> Vec<String> {
    content
        .media
        .iter()
        .filter(|m| !allowed.contains(&m.kind()))
        .map(|m| {
            format!(
                "{} does not accept media of type '{}'",
                content.platform, m.mime_type
            )
        })
        .collect()
}

/// Unified interface to one social network
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Check content against platform constraints without any I/O
    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        validate_rules(content)
    }

    /// Publish content and return the platform's identifiers
    ///
    /// May run several dependent requests (media upload, processing status
    /// polls, a final publish call); any of them failing fails the post.
    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt>;

    /// Exchange a refresh token for new credentials
    ///
    /// A rejection by the platform is `CredentialInvalid`.
    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant>;

    /// Ask the platform whether a published post exists
    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool>;

    fn verification_guarantee(&self) -> VerificationGuarantee {
        VerificationGuarantee::Confirmed
    }
}

/// OAuth application credentials
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl From<&PlatformCredentialsConfig> for AppCredentials {
    fn from(config: &PlatformCredentialsConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: SecretString::from(config.client_secret.clone()),
        }
    }
}

/// Everything an HTTP adapter needs besides its own endpoints
#[derive(Clone)]
pub struct AdapterContext {
    pub http: HttpClient,
    pub credentials: AppCredentials,
    /// Replaces every default endpoint base when set
    pub api_base: Option<String>,
    pub media: MediaSettings,
    pub fetcher: Arc<dyn MediaFetcher>,
}

impl AdapterContext {
    pub fn new(http: HttpClient, credentials: AppCredentials) -> Self {
        let fetcher = Arc::new(HttpMediaFetcher::new(http.clone()));
        Self {
            http,
            credentials,
            api_base: None,
            media: MediaSettings::default(),
            fetcher,
        }
    }

    pub fn with_api_base(mut self, api_base: Option<String>) -> Self {
        self.api_base = api_base;
        self
    }

    pub fn with_media(mut self, media: MediaSettings) -> Self {
        self.media = media;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Join `path` onto the configured base, or `default_base`
    pub fn url(&self, default_base: &str, path: &str) -> String {
        let base = self.api_base.as_deref().unwrap_or(default_base);
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> AdapterContext {
    let http = HttpClient::new(std::time::Duration::from_secs(1))
        .expect("test HTTP client builds");
    AdapterContext::new(
        http,
        AppCredentials {
            client_id: "client-id".to_string(),
            client_secret: SecretString::from("client-secret".to_string()),
        },
    )
}

/// Build the HTTP adapter for `platform`
pub fn build_adapter(platform: Platform, ctx: AdapterContext) -> Arc<dyn PlatformAdapter> {
    match platform {
        Platform::Twitter => Arc::new(twitter::TwitterAdapter::new(ctx)),
        Platform::Facebook => Arc::new(facebook::FacebookAdapter::new(ctx)),
        Platform::Instagram => Arc::new(instagram::InstagramAdapter::new(ctx)),
        Platform::LinkedIn => Arc::new(linkedin::LinkedInAdapter::new(ctx)),
        Platform::TikTok => Arc::new(tiktok::TikTokAdapter::new(ctx)),
        Platform::YouTube => Arc::new(youtube::YouTubeAdapter::new(ctx)),
        Platform::Pinterest => Arc::new(pinterest::PinterestAdapter::new(ctx)),
        Platform::Snapchat => Arc::new(snapchat::SnapchatAdapter::new(ctx)),
    }
}

/// Immutable platform → adapter map, cheap to clone and share across legs
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<HashMap<Platform, Arc<dyn PlatformAdapter>>>,
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    /// Register an HTTP adapter for every enabled platform section
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpClient::new(config.orchestrator.http_timeout())?;
        let media = MediaSettings::from(&config.orchestrator);
        let mut builder = Self::builder();

        for platform in config.platforms.enabled() {
            let Some(section) = config.platforms.get(platform) else {
                continue;
            };

            let ctx = AdapterContext::new(http.clone(), AppCredentials::from(section))
                .with_api_base(section.api_base.clone())
                .with_media(media);

            debug!(%platform, "Registering platform adapter");
            builder = builder.register(build_adapter(platform, ctx));
        }

        Ok(builder.build())
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    /// Registered platforms in canonical order
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Collects adapters before the registry is frozen
#[derive(Default)]
pub struct AdapterRegistryBuilder {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistryBuilder {
    /// Add an adapter, replacing any earlier one for the same platform
    pub fn register(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn build(self) -> AdapterRegistry {
        AdapterRegistry {
            adapters: Arc::new(self.adapters),
        }
    }
}
