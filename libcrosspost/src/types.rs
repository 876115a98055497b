//! Core types for Crosspost

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PlatformError;

/// Supported social-media platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Facebook,
    Instagram,
    LinkedIn,
    TikTok,
    YouTube,
    Pinterest,
    Snapchat,
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Platform::Twitter,
        Platform::Facebook,
        Platform::Instagram,
        Platform::LinkedIn,
        Platform::TikTok,
        Platform::YouTube,
        Platform::Pinterest,
        Platform::Snapchat,
    ];

    /// Lowercase identifier used in config files, storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::LinkedIn => "linkedin",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
            Platform::Pinterest => "pinterest",
            Platform::Snapchat => "snapchat",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::LinkedIn),
            "tiktok" => Ok(Platform::TikTok),
            "youtube" => Ok(Platform::YouTube),
            "pinterest" => Ok(Platform::Pinterest),
            "snapchat" => Ok(Platform::Snapchat),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: twitter, facebook, instagram, linkedin, tiktok, youtube, pinterest, snapchat",
                s
            )),
        }
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Audience of a published post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// A poll attached to a post (Twitter only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    pub options: Vec<String>,
    pub duration_minutes: u32,
}

/// Per-request publishing options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    #[serde(default)]
    pub visibility: Visibility,
    /// Platform post ID this post replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSpec>,
    /// Outbound link (Pinterest pin link, LinkedIn article)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Target board for Pinterest pins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

/// Broad class of a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Reference to media already hosted by the media collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    /// Publicly reachable URL of the media
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

impl MediaRef {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            mime_type: mime_type.into(),
            size_bytes,
            alt_text: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        let mime = self.mime_type.to_lowercase();
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

/// One logical post to be delivered to several platforms
///
/// Immutable once handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub options: PublishOptions,
}

impl PublishRequest {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>, platforms: Vec<Platform>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            text: text.into(),
            media: Vec::new(),
            platforms,
            options: PublishOptions::default(),
        }
    }

    pub fn with_media(mut self, media: Vec<MediaRef>) -> Self {
        self.media = media;
        self
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Requested platforms with duplicates removed, in request order
    pub fn distinct_platforms(&self) -> Vec<Platform> {
        let mut seen = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            if !seen.contains(platform) {
                seen.push(*platform);
            }
        }
        seen
    }
}

// ============================================================================
// Account Types
// ============================================================================

/// A user's linked account on one platform
#[derive(Debug, Clone)]
pub struct PlatformAccount {
    pub account_id: String,
    pub user_id: String,
    pub platform: Platform,
    /// Platform-side account, page or channel ID
    pub external_account_id: String,
    pub username: String,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Unix timestamp after which the access token is no longer valid
    pub token_expiry: Option<i64>,
    pub active: bool,
}

impl PlatformAccount {
    pub fn new(
        user_id: impl Into<String>,
        platform: Platform,
        external_account_id: impl Into<String>,
        username: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            platform,
            external_account_id: external_account_id.into(),
            username: username.into(),
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            token_expiry: None,
            active: true,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.into()));
        self
    }

    pub fn with_expiry(mut self, token_expiry: i64) -> Self {
        self.token_expiry = Some(token_expiry);
        self
    }
}

/// New credentials returned by a token refresh
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Present only when the platform rotates refresh tokens
    pub refresh_token: Option<SecretString>,
    /// Lifetime of the new access token in seconds
    pub expires_in: Option<i64>,
}

// ============================================================================
// Result Types
// ============================================================================

/// Identifiers returned by a successful publish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub external_id: String,
    pub external_url: Option<String>,
}

/// How much a positive `verify_exists` answer can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationGuarantee {
    /// The platform was asked and confirmed the post exists
    Confirmed,
    /// The platform offers no reliable read-back; success is assumed
    BestEffort,
}

/// Terminal state of a platform leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegOutcome {
    /// Posted and independently confirmed
    Succeeded,
    /// Posted, but existence could not be confirmed
    SucceededUnverified,
    Failed,
    /// Failed with a retryable error and recorded in the retry queue
    QueuedForRetry,
}

impl std::fmt::Display for LegOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegOutcome::Succeeded => write!(f, "succeeded"),
            LegOutcome::SucceededUnverified => write!(f, "succeeded-unverified"),
            LegOutcome::Failed => write!(f, "failed"),
            LegOutcome::QueuedForRetry => write!(f, "queued-for-retry"),
        }
    }
}

/// Outcome of one platform leg of a publish request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishLegResult {
    pub platform: Platform,
    pub outcome: LegOutcome,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub error: Option<PlatformError>,
    pub verified: bool,
    /// Strength of `verified`; `None` when nothing was posted
    pub verification: Option<VerificationGuarantee>,
    /// Number of `post` calls made
    pub attempts: u32,
    /// Number of `verify_exists` calls made
    pub verification_attempts: u32,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub unverified: usize,
    pub failed: usize,
    pub queued: usize,
}

/// Per-platform results of one publish request
///
/// There is no single pass/fail verdict: every leg is reported on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub request_id: String,
    pub successful: Vec<PublishLegResult>,
    pub unverified: Vec<PublishLegResult>,
    pub failed: Vec<PublishLegResult>,
    pub pending: Vec<PublishLegResult>,
    pub summary: ResultSummary,
}

impl AggregateResult {
    /// Project a set of leg results into the aggregate view
    pub fn from_legs(request_id: impl Into<String>, legs: Vec<PublishLegResult>) -> Self {
        let mut result = Self {
            request_id: request_id.into(),
            successful: Vec::new(),
            unverified: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            summary: ResultSummary {
                requested: legs.len(),
                ..Default::default()
            },
        };

        for leg in legs {
            match leg.outcome {
                LegOutcome::Succeeded => result.successful.push(leg),
                LegOutcome::SucceededUnverified => result.unverified.push(leg),
                LegOutcome::Failed => result.failed.push(leg),
                LegOutcome::QueuedForRetry => result.pending.push(leg),
            }
        }

        result.summary.succeeded = result.successful.len();
        result.summary.unverified = result.unverified.len();
        result.summary.failed = result.failed.len();
        result.summary.queued = result.pending.len();
        result
    }

    /// All leg results regardless of outcome
    pub fn legs(&self) -> impl Iterator<Item = &PublishLegResult> {
        self.successful
            .iter()
            .chain(self.unverified.iter())
            .chain(self.failed.iter())
            .chain(self.pending.iter())
    }

    /// Leg result for a platform, if it was requested
    pub fn leg(&self, platform: Platform) -> Option<&PublishLegResult> {
        self.legs().find(|leg| leg.platform == platform)
    }
}
