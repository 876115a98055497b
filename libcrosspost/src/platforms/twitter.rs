//! Twitter/X adapter
//!
//! Tweets go through the v2 API. Media uses the v1.1 chunked upload
//! endpoint (INIT, APPEND, FINALIZE, then STATUS while the upload is
//! processed), with each segment sent base64-encoded.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ErrorKind, PlatformResult};
use crate::platforms::http::{json_str, ApiResponse};
use crate::platforms::media::{chunk_payload, poll_until_ready, settled, ProcessingState};
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, MediaRef, Platform, PlatformAccount, PollSpec, PostReceipt, TokenGrant};

const API_BASE: &str = "https://api.twitter.com";
const UPLOAD_BASE: &str = "https://upload.twitter.com";

const POLL_MIN_OPTIONS: usize = 2;
const POLL_MAX_OPTIONS: usize = 4;
const POLL_OPTION_LENGTH: usize = 25;
const POLL_MIN_MINUTES: u32 = 5;
const POLL_MAX_MINUTES: u32 = 10_080;

/// Map v1.1-style error codes in the body
fn refine(_: StatusCode, body: &Value) -> Option<ErrorKind> {
    match body.pointer("/errors/0/code").and_then(Value::as_i64)? {
        187 => Some(ErrorKind::DuplicatePost),
        88 => Some(ErrorKind::RateLimited),
        89 | 32 => Some(ErrorKind::InvalidCredentials),
        186 | 324 => Some(ErrorKind::ContentRejected),
        130 | 131 => Some(ErrorKind::Transient),
        _ => None,
    }
}

fn validate_poll(poll: &PollSpec, has_media: bool) -> Vec<String> {
    let mut errors = Vec::new();

    if !(POLL_MIN_OPTIONS..=POLL_MAX_OPTIONS).contains(&poll.options.len()) {
        errors.push(format!(
            "Polls need between {} and {} options (current: {})",
            POLL_MIN_OPTIONS,
            POLL_MAX_OPTIONS,
            poll.options.len()
        ));
    }

    for option in &poll.options {
        let length = option.chars().count();
        if option.trim().is_empty() || length > POLL_OPTION_LENGTH {
            errors.push(format!(
                "Poll option '{}' must be 1-{} characters",
                option, POLL_OPTION_LENGTH
            ));
        }
    }

    if !(POLL_MIN_MINUTES..=POLL_MAX_MINUTES).contains(&poll.duration_minutes) {
        errors.push(format!(
            "Poll duration must be between {} and {} minutes",
            POLL_MIN_MINUTES, POLL_MAX_MINUTES
        ));
    }

    if has_media {
        errors.push("Polls cannot be combined with media".to_string());
    }

    errors
}

fn media_category(media: &MediaRef) -> &'static str {
    match media.kind() {
        MediaKind::Video => "tweet_video",
        _ if media.mime_type.eq_ignore_ascii_case("image/gif") => "tweet_gif",
        _ => "tweet_image",
    }
}

/// Read `processing_info` from a FINALIZE or STATUS response
///
/// No `processing_info` means the media is usable right away.
fn processing_state(body: &Value, media_id: &str) -> ProcessingState<String> {
    let Some(info) = body.get("processing_info") else {
        return ProcessingState::Ready(media_id.to_string());
    };

    match info.get("state").and_then(Value::as_str) {
        Some("succeeded") | None => ProcessingState::Ready(media_id.to_string()),
        Some("failed") => ProcessingState::Failed(
            info.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("processing failed")
                .to_string(),
        ),
        Some(_) => ProcessingState::Pending {
            check_after: info
                .get("check_after_secs")
                .and_then(Value::as_u64)
                .map(Duration::from_secs),
        },
    }
}

fn tweet_body(content: &PlatformContent, media_ids: &[String]) -> Value {
    let mut body = json!({ "text": content.text });

    if !media_ids.is_empty() {
        body["media"] = json!({ "media_ids": media_ids });
    }
    if let Some(poll) = &content.options.poll {
        body["poll"] = json!({
            "options": poll.options,
            "duration_minutes": poll.duration_minutes,
        });
    }
    if let Some(reply_to) = &content.options.reply_to {
        body["reply"] = json!({ "in_reply_to_tweet_id": reply_to });
    }

    body
}

pub struct TwitterAdapter {
    ctx: AdapterContext,
}

impl TwitterAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn upload_url(&self) -> String {
        self.ctx.url(UPLOAD_BASE, "1.1/media/upload.json")
    }

    async fn upload_command(
        &self,
        account: &PlatformAccount,
        context: &str,
        form: &[(&str, String)],
    ) -> PlatformResult<ApiResponse> {
        let request = self
            .ctx
            .http
            .post(&self.upload_url(), &account.access_token)
            .form(form);
        self.ctx
            .http
            .execute(Platform::Twitter, context, request, refine)
            .await
    }

    async fn media_status(
        &self,
        account: &PlatformAccount,
        media_id: &str,
    ) -> PlatformResult<ProcessingState<String>> {
        let request = self
            .ctx
            .http
            .get(&self.upload_url(), &account.access_token)
            .query(&[("command", "STATUS"), ("media_id", media_id)]);
        let response = self
            .ctx
            .http
            .execute(Platform::Twitter, "media STATUS", request, refine)
            .await?;
        Ok(processing_state(&response.body, media_id))
    }

    /// Upload one media item and return its media id
    async fn upload_media(
        &self,
        account: &PlatformAccount,
        media: &MediaRef,
    ) -> PlatformResult<String> {
        let bytes = self.ctx.fetcher.fetch(Platform::Twitter, media).await?;

        let init = self
            .upload_command(
                account,
                "media INIT",
                &[
                    ("command", "INIT".to_string()),
                    ("total_bytes", bytes.len().to_string()),
                    ("media_type", media.mime_type.clone()),
                    ("media_category", media_category(media).to_string()),
                ],
            )
            .await?;
        let media_id = json_str(&init.body, "/media_id_string")?;

        for (index, segment) in chunk_payload(&bytes, self.ctx.media.chunk_size).enumerate() {
            debug!(media_id = %media_id, segment = index, "Uploading media segment");
            self.upload_command(
                account,
                "media APPEND",
                &[
                    ("command", "APPEND".to_string()),
                    ("media_id", media_id.clone()),
                    ("segment_index", index.to_string()),
                    ("media_data", STANDARD.encode(segment)),
                ],
            )
            .await?;
        }

        let finalize = self
            .upload_command(
                account,
                "media FINALIZE",
                &[
                    ("command", "FINALIZE".to_string()),
                    ("media_id", media_id.clone()),
                ],
            )
            .await?;

        let media_id = match settled(processing_state(&finalize.body, &media_id))? {
            Some(id) => id,
            None => {
                poll_until_ready(
                    self.ctx.media.poll_interval,
                    self.ctx.media.processing_timeout,
                    || self.media_status(account, &media_id),
                )
                .await?
            }
        };

        if let Some(alt_text) = &media.alt_text {
            let request = self
                .ctx
                .http
                .post(
                    &self.ctx.url(UPLOAD_BASE, "1.1/media/metadata/create.json"),
                    &account.access_token,
                )
                .json(&json!({ "media_id": media_id, "alt_text": { "text": alt_text } }));
            self.ctx
                .http
                .execute(Platform::Twitter, "media metadata", request, refine)
                .await?;
        }

        Ok(media_id)
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let mut errors = check_media_kinds(content, &[MediaKind::Image, MediaKind::Video]);

        let has_video = content.media.iter().any(|m| m.kind() == MediaKind::Video);
        if has_video && content.media.len() > 1 {
            errors.push("A video must be the only media item in a tweet".to_string());
        }

        if let Some(poll) = &content.options.poll {
            errors.extend(validate_poll(poll, !content.media.is_empty()));
        }

        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let mut media_ids = Vec::with_capacity(content.media.len());
        for media in &content.media {
            media_ids.push(self.upload_media(account, media).await?);
        }

        let request = self
            .ctx
            .http
            .post(&self.ctx.url(API_BASE, "2/tweets"), &account.access_token)
            .json(&tweet_body(content, &media_ids));
        let response = self
            .ctx
            .http
            .execute(Platform::Twitter, "create tweet", request, refine)
            .await?;

        let id = response.str_at("/data/id")?;
        info!(platform = "twitter", external_id = %id, "Tweet created");

        Ok(PostReceipt {
            external_url: Some(format!(
                "https://twitter.com/{}/status/{}",
                account.username, id
            )),
            external_id: id,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(Method::POST, &self.ctx.url(API_BASE, "2/oauth2/token"))
            .basic_auth(
                &credentials.client_id,
                Some(credentials.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credentials.client_id.as_str()),
            ]);

        self.ctx.http.refresh_grant(Platform::Twitter, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        let url = self.ctx.url(API_BASE, &format!("2/tweets/{}", external_id));
        let request = self.ctx.http.get(&url, &account.access_token);
        let response = self
            .ctx
            .http
            .execute_optional(Platform::Twitter, "lookup tweet", request, refine)
            .await?;

        // Deleted tweets come back as 200 with only an `errors` array
        Ok(response.is_some_and(|r| r.body.pointer("/data/id").is_some()))
    }
}
