//! YouTube adapter (Data API v3, resumable upload)

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, Platform, PlatformAccount, PostReceipt, TokenGrant, Visibility};

const API_BASE: &str = "https://www.googleapis.com";
const OAUTH_BASE: &str = "https://oauth2.googleapis.com";

/// Google APIs put the machine-readable reason in `error.errors[0].reason`
fn refine(_: StatusCode, body: &Value) -> Option<ErrorKind> {
    match body.pointer("/error/errors/0/reason").and_then(Value::as_str)? {
        "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded" => {
            Some(ErrorKind::RateLimited)
        }
        "authError" => Some(ErrorKind::InvalidCredentials),
        "forbidden" | "youtubeSignupRequired" => Some(ErrorKind::PermissionDenied),
        "uploadLimitExceeded" | "invalidTitle" | "invalidDescription" => {
            Some(ErrorKind::ContentRejected)
        }
        "backendError" => Some(ErrorKind::Transient),
        _ => None,
    }
}

fn privacy_status(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Unlisted => "unlisted",
        Visibility::Private => "private",
    }
}

fn video_resource(content: &PlatformContent) -> Value {
    json!({
        "snippet": {
            "title": content.title.as_deref().unwrap_or_default(),
            "description": content.description.as_deref().unwrap_or(&content.text),
            "tags": content.hashtags,
        },
        "status": {
            "privacyStatus": privacy_status(content.options.visibility),
        },
    })
}

pub struct YouTubeAdapter {
    ctx: AdapterContext,
}

impl YouTubeAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PlatformAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let mut errors = check_media_kinds(content, &[MediaKind::Video]);
        if content.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push("YouTube videos need a title".to_string());
        }
        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let video = content
            .media
            .first()
            .ok_or_else(|| PlatformError::content_rejected(vec!["No video to upload".to_string()]))?;
        let bytes = self.ctx.fetcher.fetch(Platform::YouTube, video).await?;

        let request = self
            .ctx
            .http
            .post(
                &self.ctx.url(API_BASE, "upload/youtube/v3/videos"),
                &account.access_token,
            )
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", video.mime_type.as_str())
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .json(&video_resource(content));
        let session = self
            .ctx
            .http
            .execute(Platform::YouTube, "start upload session", request, refine)
            .await?;

        let upload_url = session
            .header("location")
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::invalid_response("YouTube did not return an upload session URL")
            })?;

        let request = self
            .ctx
            .http
            .put(&upload_url, &account.access_token)
            .header(CONTENT_TYPE, video.mime_type.as_str())
            .body(bytes);
        let response = self
            .ctx
            .http
            .execute(Platform::YouTube, "upload video", request, refine)
            .await?;

        let id = response.str_at("/id")?;
        info!(platform = "youtube", external_id = %id, "YouTube video uploaded");

        Ok(PostReceipt {
            external_url: Some(format!("https://www.youtube.com/watch?v={}", id)),
            external_id: id,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(Method::POST, &self.ctx.url(OAUTH_BASE, "token"))
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ]);

        self.ctx.http.refresh_grant(Platform::YouTube, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        let request = self
            .ctx
            .http
            .get(
                &self.ctx.url(API_BASE, "youtube/v3/videos"),
                &account.access_token,
            )
            .query(&[("part", "id"), ("id", external_id)]);
        let response = self
            .ctx
            .http
            .execute(Platform::YouTube, "list videos", request, refine)
            .await?;

        Ok(response
            .body
            .get("items")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty()))
    }
}
