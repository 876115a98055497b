//! Snapchat adapter (public profile stories)
//!
//! Snapchat has no API to read a story back, so verification is best
//! effort: a successful publish call is taken as proof the story exists.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;

use crate::error::PlatformResult;
use crate::platforms::http::no_refine;
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
    VerificationGuarantee,
};
use crate::transform::PlatformContent;
use crate::types::{MediaKind, Platform, PlatformAccount, PostReceipt, TokenGrant};

const API_BASE: &str = "https://businessapi.snapchat.com/v1";
const OAUTH_BASE: &str = "https://accounts.snapchat.com";

fn story_body(content: &PlatformContent) -> Value {
    let media = content.media.first();
    let media_type = match media.map(|m| m.kind()) {
        Some(MediaKind::Video) => "VIDEO",
        _ => "IMAGE",
    };

    json!({
        "story": {
            "media_url": media.map(|m| m.url.as_str()),
            "media_type": media_type,
            "caption": content.text,
        }
    })
}

pub struct SnapchatAdapter {
    ctx: AdapterContext,
}

impl SnapchatAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PlatformAdapter for SnapchatAdapter {
    fn platform(&self) -> Platform {
        Platform::Snapchat
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
        let url = self.ctx.url(
            API_BASE,
            &format!("public_profiles/{}/stories", account.external_account_id),
        );
        let request = self
            .ctx
            .http
            .post(&url, &account.access_token)
            .json(&story_body(content));
        let response = self
            .ctx
            .http
            .execute(Platform::Snapchat, "publish story", request, no_refine)
            .await?;

        let id = response
            .str_at("/story/id")
            .or_else(|_| response.str_at("/id"))?;
        info!(platform = "snapchat", external_id = %id, "Story published");

        Ok(PostReceipt {
            external_id: id,
            external_url: None,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(
                Method::POST,
                &self.ctx.url(OAUTH_BASE, "login/oauth2/access_token"),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret()),
            ]);

        self.ctx.http.refresh_grant(Platform::Snapchat, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        _account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        info!(
            platform = "snapchat",
            external_id,
            "Snapchat cannot read stories back; treating publish as verified"
        );
        Ok(true)
    }

    fn verification_guarantee(&self) -> VerificationGuarantee {
        VerificationGuarantee::BestEffort
    }
}
