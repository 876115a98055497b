//! Instagram adapter (Graph API content publishing)
//!
//! Publishing is a two-step protocol: create a media container, wait until
//! Instagram has fetched and processed it, then publish the container.
//! Carousels create one child container per item first.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::info;

use crate::error::{ErrorKind, PlatformResult};
use crate::platforms::facebook::{exchange_token, object_exists, refine_graph_error, GRAPH_BASE};
use crate::platforms::media::{poll_until_ready, ProcessingState};
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, MediaRef, Platform, PlatformAccount, PostReceipt, TokenGrant};

/// Graph errors plus Instagram's "media not ready" code
fn refine(status: StatusCode, body: &Value) -> Option<ErrorKind> {
    match body.pointer("/error/code").and_then(Value::as_i64) {
        Some(9007) => Some(ErrorKind::Transient),
        Some(36003) => Some(ErrorKind::ContentRejected),
        _ => refine_graph_error(status, body),
    }
}

/// Interpret a container's `status_code`
fn container_state(body: &Value, container_id: &str) -> ProcessingState<String> {
    match body.get("status_code").and_then(Value::as_str) {
        Some("FINISHED") | Some("PUBLISHED") => ProcessingState::Ready(container_id.to_string()),
        Some("ERROR") | Some("EXPIRED") => ProcessingState::Failed(
            body.get("status")
                .and_then(Value::as_str)
                .unwrap_or("container could not be processed")
                .to_string(),
        ),
        _ => ProcessingState::Pending { check_after: None },
    }
}

/// Form fields describing one media item
fn media_fields(media: &MediaRef, carousel_item: bool) -> Vec<(String, String)> {
    let mut form = Vec::new();

    match media.kind() {
        MediaKind::Video => {
            let media_type = if carousel_item { "VIDEO" } else { "REELS" };
            form.push(("media_type".to_string(), media_type.to_string()));
            form.push(("video_url".to_string(), media.url.clone()));
        }
        _ => form.push(("image_url".to_string(), media.url.clone())),
    }

    if carousel_item {
        form.push(("is_carousel_item".to_string(), "true".to_string()));
    }
    if let Some(alt_text) = media.alt_text.as_ref().filter(|_| !carousel_item) {
        form.push(("alt_text".to_string(), alt_text.clone()));
    }

    form
}

pub struct InstagramAdapter {
    ctx: AdapterContext,
}

impl InstagramAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    async fn create(
        &self,
        account: &PlatformAccount,
        edge: &str,
        context: &str,
        form: &[(String, String)],
    ) -> PlatformResult<String> {
        let url = self.ctx.url(
            GRAPH_BASE,
            &format!("{}/{}", account.external_account_id, edge),
        );
        let request = self.ctx.http.post(&url, &account.access_token).form(form);
        let response = self
            .ctx
            .http
            .execute(Platform::Instagram, context, request, refine)
            .await?;
        response.str_at("/id")
    }

    async fn container_status(
        &self,
        account: &PlatformAccount,
        container_id: &str,
    ) -> PlatformResult<ProcessingState<String>> {
        let request = self
            .ctx
            .http
            .get(&self.ctx.url(GRAPH_BASE, container_id), &account.access_token)
            .query(&[("fields", "status_code,status")]);
        let response = self
            .ctx
            .http
            .execute(Platform::Instagram, "container status", request, refine)
            .await?;
        Ok(container_state(&response.body, container_id))
    }

    async fn wait_until_ready(
        &self,
        account: &PlatformAccount,
        container_id: &str,
    ) -> PlatformResult<String> {
        poll_until_ready(
            self.ctx.media.poll_interval,
            self.ctx.media.processing_timeout,
            || self.container_status(account, container_id),
        )
        .await
    }

    async fn create_container(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<String> {
        if let [single] = content.media.as_slice() {
            let mut form = media_fields(single, false);
            form.push(("caption".to_string(), content.text.clone()));
            return self
                .create(account, "media", "create container", &form)
                .await;
        }

        let mut children = Vec::with_capacity(content.media.len());
        for item in &content.media {
            let child = self
                .create(
                    account,
                    "media",
                    "create carousel item",
                    &media_fields(item, true),
                )
                .await?;
            children.push(self.wait_until_ready(account, &child).await?);
        }

        let form = vec![
            ("media_type".to_string(), "CAROUSEL".to_string()),
            ("children".to_string(), children.join(",")),
            ("caption".to_string(), content.text.clone()),
        ];
        self.create(account, "media", "create carousel", &form)
            .await
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let errors = check_media_kinds(content, &[MediaKind::Image, MediaKind::Video]);
        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let container = self.create_container(account, content).await?;
        let container = self.wait_until_ready(account, &container).await?;

        let id = self
            .create(
                account,
                "media_publish",
                "publish container",
                &[("creation_id".to_string(), container)],
            )
            .await?;

        info!(platform = "instagram", external_id = %id, "Instagram media published");

        // The permalink needs another lookup; callers can resolve it from the id
        Ok(PostReceipt {
            external_id: id,
            external_url: None,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        exchange_token(&self.ctx, Platform::Instagram, refresh_token).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        object_exists(
            &self.ctx,
            Platform::Instagram,
            external_id,
            &account.access_token,
            refine,
        )
        .await
    }
}
