//! Pinterest adapter (API v5)

use async_trait::async_trait;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;

use crate::error::PlatformResult;
use crate::platforms::http::no_refine;
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, Platform, PlatformAccount, PostReceipt, TokenGrant};

const API_BASE: &str = "https://api.pinterest.com/v5";

fn pin_body(content: &PlatformContent) -> Value {
    let mut body = json!({
        "board_id": content.options.board_id,
        "title": content.title.as_deref().unwrap_or_default(),
        "description": content.description.as_deref().unwrap_or(&content.text),
    });

    if let Some(link) = &content.options.link {
        body["link"] = json!(link);
    }
    if let Some(image) = content.media.first() {
        body["media_source"] = json!({ "source_type": "image_url", "url": image.url });
        if let Some(alt_text) = &image.alt_text {
            body["alt_text"] = json!(alt_text);
        }
    }

    body
}

pub struct PinterestAdapter {
    ctx: AdapterContext,
}

impl PinterestAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PlatformAdapter for PinterestAdapter {
    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let mut errors = check_media_kinds(content, &[MediaKind::Image]);
        if content
            .options
            .board_id
            .as_deref()
            .map_or(true, |b| b.trim().is_empty())
        {
            errors.push("Pinterest pins need a board_id".to_string());
        }
        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let request = self
            .ctx
            .http
            .post(&self.ctx.url(API_BASE, "pins"), &account.access_token)
            .json(&pin_body(content));
        let response = self
            .ctx
            .http
            .execute(Platform::Pinterest, "create pin", request, no_refine)
            .await?;

        let id = response.str_at("/id")?;
        info!(platform = "pinterest", external_id = %id, "Pin created");

        Ok(PostReceipt {
            external_url: Some(format!("https://www.pinterest.com/pin/{}/", id)),
            external_id: id,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(Method::POST, &self.ctx.url(API_BASE, "oauth/token"))
            .basic_auth(
                &credentials.client_id,
                Some(credentials.client_secret.expose_secret()),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);

        self.ctx.http.refresh_grant(Platform::Pinterest, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        let url = self.ctx.url(API_BASE, &format!("pins/{}", external_id));
        let request = self.ctx.http.get(&url, &account.access_token);
        let response = self
            .ctx
            .http
            .execute_optional(Platform::Pinterest, "lookup pin", request, no_refine)
            .await?;

        Ok(response.is_some())
    }
}
