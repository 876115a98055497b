//! Facebook Page adapter (Graph API)
//!
//! Posts are published to the page in `external_account_id` with a page
//! access token. Graph API helpers shared with the Instagram adapter live
//! here as well.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::info;

use crate::error::{ErrorKind, PlatformResult};
use crate::platforms::http::Refine;
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, MediaRef, Platform, PlatformAccount, PostReceipt, TokenGrant};

pub(crate) const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

/// Map Graph API error codes
pub(crate) fn refine_graph_error(_: StatusCode, body: &Value) -> Option<ErrorKind> {
    let error = body.get("error")?;
    let code = error.get("code").and_then(Value::as_i64);

    match code {
        Some(4 | 17 | 32 | 613) => Some(ErrorKind::RateLimited),
        Some(190 | 102) => Some(ErrorKind::InvalidCredentials),
        Some(506) => Some(ErrorKind::DuplicatePost),
        Some(10 | 200..=299) => Some(ErrorKind::PermissionDenied),
        Some(1 | 2) => Some(ErrorKind::Transient),
        _ if error.get("is_transient").and_then(Value::as_bool) == Some(true) => {
            Some(ErrorKind::Transient)
        }
        _ => None,
    }
}

/// Reads of deleted or unknown objects fail with HTTP 400 and code 100
pub(crate) fn graph_object_missing(status: StatusCode, body: &Value) -> bool {
    status == StatusCode::NOT_FOUND
        || body.pointer("/error/code").and_then(Value::as_i64) == Some(100)
}

/// Long-lived token exchange used by both Meta platforms
pub(crate) async fn exchange_token(
    ctx: &AdapterContext,
    platform: Platform,
    token: &str,
) -> PlatformResult<TokenGrant> {
    let request = ctx
        .http
        .anonymous(Method::GET, &ctx.url(GRAPH_BASE, "oauth/access_token"))
        .query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", ctx.credentials.client_id.as_str()),
            ("client_secret", ctx.credentials.client_secret.expose_secret()),
            ("fb_exchange_token", token),
        ]);

    ctx.http.refresh_grant(platform, request).await
}

/// Whether a Graph object can still be read
pub(crate) async fn object_exists(
    ctx: &AdapterContext,
    platform: Platform,
    object_id: &str,
    token: &SecretString,
    refine: Refine,
) -> PlatformResult<bool> {
    let request = ctx
        .http
        .get(&ctx.url(GRAPH_BASE, object_id), token)
        .query(&[("fields", "id")]);
    let response = ctx
        .http
        .execute_lookup(platform, "lookup object", request, refine, graph_object_missing)
        .await?;

    Ok(response.is_some_and(|r| r.body.get("id").is_some()))
}

pub struct FacebookAdapter {
    ctx: AdapterContext,
}

impl FacebookAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn page_url(&self, account: &PlatformAccount, edge: &str) -> String {
        self.ctx
            .url(GRAPH_BASE, &format!("{}/{}", account.external_account_id, edge))
    }

    async fn publish(
        &self,
        account: &PlatformAccount,
        edge: &str,
        context: &str,
        form: &[(String, String)],
    ) -> PlatformResult<String> {
        let request = self
            .ctx
            .http
            .post(&self.page_url(account, edge), &account.access_token)
            .form(form);
        let response = self
            .ctx
            .http
            .execute(Platform::Facebook, context, request, refine_graph_error)
            .await?;

        // Photo uploads report both the photo id and the feed story id
        response
            .str_at("/post_id")
            .or_else(|_| response.str_at("/id"))
    }

    async fn upload_unpublished_photo(
        &self,
        account: &PlatformAccount,
        media: &MediaRef,
    ) -> PlatformResult<String> {
        let mut form = vec![
            ("url".to_string(), media.url.clone()),
            ("published".to_string(), "false".to_string()),
        ];
        if let Some(alt_text) = &media.alt_text {
            form.push(("alt_text_custom".to_string(), alt_text.clone()));
        }

        let request = self
            .ctx
            .http
            .post(&self.page_url(account, "photos"), &account.access_token)
            .form(&form);
        let response = self
            .ctx
            .http
            .execute(Platform::Facebook, "upload photo", request, refine_graph_error)
            .await?;
        response.str_at("/id")
    }
}

/// Form for a text or link post, optionally with pre-uploaded photos
fn feed_form(content: &PlatformContent, photo_ids: &[String]) -> Vec<(String, String)> {
    let mut form = vec![("message".to_string(), content.text.clone())];

    if let Some(link) = &content.options.link {
        form.push(("link".to_string(), link.clone()));
    }
    for (index, id) in photo_ids.iter().enumerate() {
        form.push((
            format!("attached_media[{}]", index),
            format!(r#"{{"media_fbid":"{}"}}"#, id),
        ));
    }

    form
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let mut errors = check_media_kinds(content, &[MediaKind::Image, MediaKind::Video]);

        let has_video = content.media.iter().any(|m| m.kind() == MediaKind::Video);
        if has_video && content.media.len() > 1 {
            errors.push("Facebook videos must be posted on their own".to_string());
        }

        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let id = match content.media.as_slice() {
            [] => {
                self.publish(account, "feed", "publish post", &feed_form(content, &[]))
                    .await?
            }
            [video] if video.kind() == MediaKind::Video => {
                let form = vec![
                    ("file_url".to_string(), video.url.clone()),
                    ("description".to_string(), content.text.clone()),
                ];
                self.publish(account, "videos", "publish video", &form)
                    .await?
            }
            [photo] => {
                let form = vec![
                    ("url".to_string(), photo.url.clone()),
                    ("caption".to_string(), content.text.clone()),
                ];
                self.publish(account, "photos", "publish photo", &form)
                    .await?
            }
            photos => {
                let mut photo_ids = Vec::with_capacity(photos.len());
                for photo in photos {
                    photo_ids.push(self.upload_unpublished_photo(account, photo).await?);
                }
                self.publish(
                    account,
                    "feed",
                    "publish album post",
                    &feed_form(content, &photo_ids),
                )
                .await?
            }
        };

        info!(platform = "facebook", external_id = %id, "Page post published");

        Ok(PostReceipt {
            external_url: Some(format!("https://www.facebook.com/{}", id)),
            external_id: id,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        exchange_token(&self.ctx, Platform::Facebook, refresh_token).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        object_exists(
            &self.ctx,
            Platform::Facebook,
            external_id,
            &account.access_token,
            refine_graph_error,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform;
    use crate::types::{PublishOptions, PublishRequest};
    use serde_json::json;

    fn content(text: &str, media: Vec<MediaRef>, options: PublishOptions) -> PlatformContent {
        transform(
            Platform::Facebook,
            &PublishRequest::new("u", text, vec![Platform::Facebook])
                .with_media(media)
                .with_options(options),
        )
    }

    #[test]
    fn test_refine_graph_error() {
        let status = StatusCode::BAD_REQUEST;
        let body = |code: i64| json!({"error": {"code": code, "message": "m"}});

        assert_eq!(refine_graph_error(status, &body(4)), Some(ErrorKind::RateLimited));
        assert_eq!(refine_graph_error(status, &body(613)), Some(ErrorKind::RateLimited));
        assert_eq!(
            refine_graph_error(status, &body(190)),
            Some(ErrorKind::InvalidCredentials)
        );
        assert_eq!(refine_graph_error(status, &body(506)), Some(ErrorKind::DuplicatePost));
        assert_eq!(
            refine_graph_error(status, &body(200)),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(refine_graph_error(status, &body(100)), None);

        let transient = json!({"error": {"code": 9999, "is_transient": true}});
        assert_eq!(refine_graph_error(status, &transient), Some(ErrorKind::Transient));
    }

    #[test]
    fn test_graph_object_missing() {
        let deleted = json!({
            "error": {
                "message": "Unsupported get request. Object with ID '123' does not exist",
                "type": "GraphMethodException",
                "code": 100,
                "error_subcode": 33
            }
        });
        assert!(graph_object_missing(StatusCode::BAD_REQUEST, &deleted));
        assert!(graph_object_missing(StatusCode::NOT_FOUND, &Value::Null));

        let expired = json!({"error": {"code": 190, "message": "Session has expired"}});
        assert!(!graph_object_missing(StatusCode::BAD_REQUEST, &expired));
        assert!(!graph_object_missing(StatusCode::INTERNAL_SERVER_ERROR, &Value::Null));
    }

    #[test]
    fn test_feed_form_with_link_and_photos() {
        let options = PublishOptions {
            link: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let form = feed_form(
            &content("Read this", vec![], options),
            &["11".to_string(), "12".to_string()],
        );

        assert_eq!(form[0], ("message".to_string(), "Read this".to_string()));
        assert_eq!(form[1].1, "https://example.com");
        assert_eq!(form[2].0, "attached_media[0]");
        assert_eq!(form[3].1, r#"{"media_fbid":"12"}"#);
    }

    #[test]
    fn test_validate_video_with_photos() {
        let video = MediaRef::new("https://cdn.example.com/v.mp4", "video/mp4", 10);
        let photo = MediaRef::new("https://cdn.example.com/p.jpg", "image/jpeg", 10);
        let adapter = FacebookAdapter::new(crate::platforms::test_context());

        let result = adapter.validate(&content("mixed", vec![video, photo], Default::default()));
        assert_eq!(result.errors, vec!["Facebook videos must be posted on their own"]);

        assert!(adapter.validate(&content("text only", vec![], Default::default())).valid);
    }
}
