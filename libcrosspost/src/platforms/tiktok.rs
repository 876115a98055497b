//! TikTok adapter (Content Posting API)
//!
//! Videos are published with `PULL_FROM_URL`: TikTok downloads the media
//! itself and the publish is tracked through the status endpoint until it
//! completes.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ErrorKind, PlatformResult};
use crate::platforms::http::json_str;
use crate::platforms::media::{poll_until_ready, ProcessingState};
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, Platform, PlatformAccount, PostReceipt, TokenGrant, Visibility};

const API_BASE: &str = "https://open.tiktokapis.com";

/// TikTok reports errors as string codes under `error.code`
fn refine(_: StatusCode, body: &Value) -> Option<ErrorKind> {
    match body.pointer("/error/code").and_then(Value::as_str)? {
        "rate_limit_exceeded" | "spam_risk_too_many_posts" => Some(ErrorKind::RateLimited),
        "access_token_invalid" | "token_not_authorized_for_specified_deployment" => {
            Some(ErrorKind::InvalidCredentials)
        }
        "scope_not_authorized" | "spam_risk_user_banned_from_posting" => {
            Some(ErrorKind::PermissionDenied)
        }
        "invalid_params" | "url_ownership_unverified" => Some(ErrorKind::ContentRejected),
        "internal_error" => Some(ErrorKind::Transient),
        _ => None,
    }
}

fn privacy_level(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "PUBLIC_TO_EVERYONE",
        Visibility::Unlisted => "MUTUAL_FOLLOW_FRIENDS",
        Visibility::Private => "SELF_ONLY",
    }
}

/// Interpret a publish status response
///
/// Ready carries the public post id when TikTok exposes one, else the
/// publish id.
fn publish_state(body: &Value, publish_id: &str) -> ProcessingState<String> {
    match body.pointer("/data/status").and_then(Value::as_str) {
        Some("PUBLISH_COMPLETE") => ProcessingState::Ready(
            // Field name is spelled this way by the API
            json_str(body, "/data/publicaly_available_post_id/0")
                .unwrap_or_else(|_| publish_id.to_string()),
        ),
        Some("FAILED") => ProcessingState::Failed(
            body.pointer("/data/fail_reason")
                .and_then(Value::as_str)
                .unwrap_or("publish failed")
                .to_string(),
        ),
        _ => ProcessingState::Pending { check_after: None },
    }
}

pub struct TikTokAdapter {
    ctx: AdapterContext,
}

impl TikTokAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn publish_status(
        &self,
        account: &PlatformAccount,
        publish_id: &str,
    ) -> PlatformResult<ProcessingState<String>> {
        let request = self
            .ctx
            .http
            .post(
                &self.ctx.url(API_BASE, "v2/post/publish/status/fetch/"),
                &account.access_token,
            )
            .json(&json!({ "publish_id": publish_id }));
        let response = self
            .ctx
            .http
            .execute(Platform::TikTok, "publish status", request, refine)
            .await?;
        Ok(publish_state(&response.body, publish_id))
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let errors = check_media_kinds(content, &[MediaKind::Video]);
        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let video_url = content
            .media
            .first()
            .map(|m| m.url.as_str())
            .unwrap_or_default();

        let body = json!({
            "post_info": {
                "title": content.text,
                "privacy_level": privacy_level(content.options.visibility),
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": video_url,
            },
        });
        let request = self
            .ctx
            .http
            .post(
                &self.ctx.url(API_BASE, "v2/post/publish/video/init/"),
                &account.access_token,
            )
            .json(&body);
        let response = self
            .ctx
            .http
            .execute(Platform::TikTok, "publish init", request, refine)
            .await?;
        let publish_id = response.str_at("/data/publish_id")?;

        let id = poll_until_ready(
            self.ctx.media.poll_interval,
            self.ctx.media.processing_timeout,
            || self.publish_status(account, &publish_id),
        )
        .await?;

        info!(platform = "tiktok", external_id = %id, publish_id = %publish_id, "TikTok video published");

        let external_url = (id != publish_id)
            .then(|| format!("https://www.tiktok.com/@{}/video/{}", account.username, id));

        Ok(PostReceipt {
            external_id: id,
            external_url,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(Method::POST, &self.ctx.url(API_BASE, "v2/oauth/token/"))
            .form(&[
                ("client_key", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        self.ctx.http.refresh_grant(Platform::TikTok, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        let request = self
            .ctx
            .http
            .post(
                &self.ctx.url(API_BASE, "v2/video/query/"),
                &account.access_token,
            )
            .query(&[("fields", "id")])
            .json(&json!({ "filters": { "video_ids": [external_id] } }));
        let response = self
            .ctx
            .http
            .execute(Platform::TikTok, "query video", request, refine)
            .await?;

        Ok(response
            .body
            .pointer("/data/videos")
            .and_then(Value::as_array)
            .is_some_and(|videos| !videos.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform;
    use crate::types::{MediaRef, PublishRequest};

    #[test]
    fn test_publish_state() {
        let complete = json!({"data": {"status": "PUBLISH_COMPLETE", "publicaly_available_post_id": [7312345]}});
        assert_eq!(
            publish_state(&complete, "v_pub_1"),
            ProcessingState::Ready("7312345".to_string())
        );

        let private = json!({"data": {"status": "PUBLISH_COMPLETE"}});
        assert_eq!(
            publish_state(&private, "v_pub_1"),
            ProcessingState::Ready("v_pub_1".to_string())
        );

        let downloading = json!({"data": {"status": "PROCESSING_DOWNLOAD"}});
        assert_eq!(
            publish_state(&downloading, "v_pub_1"),
            ProcessingState::Pending { check_after: None }
        );

        let failed = json!({"data": {"status": "FAILED", "fail_reason": "video_pull_failed"}});
        assert_eq!(
            publish_state(&failed, "v_pub_1"),
            ProcessingState::Failed("video_pull_failed".to_string())
        );
    }

    #[test]
    fn test_refine_string_codes() {
        let body = |code: &str| json!({"error": {"code": code, "message": "", "log_id": "x"}});
        assert_eq!(
            refine(StatusCode::TOO_MANY_REQUESTS, &body("rate_limit_exceeded")),
            Some(ErrorKind::RateLimited)
        );
        assert_eq!(
            refine(StatusCode::UNAUTHORIZED, &body("access_token_invalid")),
            Some(ErrorKind::InvalidCredentials)
        );
        assert_eq!(refine(StatusCode::BAD_REQUEST, &body("something_new")), None);
    }

    #[test]
    fn test_validate_video_only() {
        let adapter = TikTokAdapter::new(crate::platforms::test_context());
        let image = MediaRef::new("https://cdn.example.com/a.jpg", "image/jpeg", 10);
        let content = transform(
            Platform::TikTok,
            &PublishRequest::new("u", "dance", vec![Platform::TikTok]).with_media(vec![image]),
        );

        let result = adapter.validate(&content);
        assert_eq!(
            result.errors,
            vec!["tiktok does not accept media of type 'image/jpeg'"]
        );
    }
}
