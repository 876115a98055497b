//! LinkedIn adapter (versioned REST Posts API)
//!
//! Commentary uses LinkedIn's "little text" format, so reserved characters
//! are escaped and hashtags are rendered with the hashtag template. Images
//! are registered with `initializeUpload` and then PUT to the returned URL.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::platforms::http::json_str;
use crate::platforms::{
    check_media_kinds, validate_rules, AdapterContext, PlatformAdapter, ValidationResult,
};
use crate::transform::{hashtag_regex, PlatformContent};
use crate::types::{MediaKind, MediaRef, Platform, PlatformAccount, PostReceipt, TokenGrant, Visibility};

const API_BASE: &str = "https://api.linkedin.com";
const OAUTH_BASE: &str = "https://www.linkedin.com";
const API_VERSION: &str = "202401";
const RESTLI_PROTOCOL: &str = "2.0.0";

const RESERVED: &[char] = &[
    '\\', '|', '{', '}', '@', '[', ']', '(', ')', '<', '>', '#', '*', '_', '~',
];

fn refine(_: StatusCode, body: &Value) -> Option<ErrorKind> {
    match body.get("code").and_then(Value::as_str)? {
        "DUPLICATE_POST" => Some(ErrorKind::DuplicatePost),
        "REVOKED_ACCESS_TOKEN" | "EXPIRED_ACCESS_TOKEN" => Some(ErrorKind::InvalidCredentials),
        "ACCESS_DENIED" => Some(ErrorKind::PermissionDenied),
        "THROTTLE_LIMIT_REACHED" => Some(ErrorKind::RateLimited),
        _ => None,
    }
}

fn escape_little_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render post text as little text, keeping hashtags clickable
fn commentary(text: &str) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;

    for capture in hashtag_regex().captures_iter(text) {
        let (Some(whole), Some(tag)) = (capture.get(0), capture.get(1)) else {
            continue;
        };
        rendered.push_str(&escape_little_text(&text[last..whole.start()]));
        rendered.push_str(&format!("{{hashtag|\\#|{}}}", tag.as_str()));
        last = whole.end();
    }
    rendered.push_str(&escape_little_text(&text[last..]));

    rendered
}

/// Author URN for the account (member or organization)
fn author_urn(account: &PlatformAccount) -> String {
    if account.external_account_id.starts_with("urn:li:") {
        account.external_account_id.clone()
    } else {
        format!("urn:li:person:{}", account.external_account_id)
    }
}

/// Percent-encode a URN for use as a path segment
fn encode_urn(urn: &str) -> String {
    urn.replace(':', "%3A")
        .replace(',', "%2C")
        .replace('(', "%28")
        .replace(')', "%29")
}

fn visibility(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "PUBLIC",
        Visibility::Unlisted => "LOGGED_IN",
        Visibility::Private => "CONNECTIONS",
    }
}

fn post_body(author: &str, content: &PlatformContent, images: &[(String, &MediaRef)]) -> Value {
    let mut body = json!({
        "author": author,
        "commentary": commentary(&content.text),
        "visibility": visibility(content.options.visibility),
        "distribution": {
            "feedDistribution": "MAIN_FEED",
            "targetEntities": [],
            "thirdPartyDistributionChannels": [],
        },
        "lifecycleState": "PUBLISHED",
        "isReshareDisabledByAuthor": false,
    });

    let image = |(urn, media): &(String, &MediaRef)| {
        json!({ "id": urn, "altText": media.alt_text.clone().unwrap_or_default() })
    };

    match images {
        [] => {
            if let Some(link) = &content.options.link {
                body["content"] = json!({ "article": { "source": link, "title": link } });
            }
        }
        [single] => body["content"] = json!({ "media": image(single) }),
        many => {
            let images: Vec<Value> = many.iter().map(image).collect();
            body["content"] = json!({ "multiImage": { "images": images } });
        }
    }

    body
}

pub struct LinkedInAdapter {
    ctx: AdapterContext,
}

impl LinkedInAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx }
    }

    fn rest(&self, method: Method, path: &str, account: &PlatformAccount) -> reqwest::RequestBuilder {
        let url = self.ctx.url(API_BASE, path);
        let request = match method {
            Method::GET => self.ctx.http.get(&url, &account.access_token),
            _ => self.ctx.http.post(&url, &account.access_token),
        };
        request
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL)
    }

    async fn upload_image(
        &self,
        account: &PlatformAccount,
        author: &str,
        media: &MediaRef,
    ) -> PlatformResult<String> {
        let request = self
            .rest(Method::POST, "rest/images?action=initializeUpload", account)
            .json(&json!({ "initializeUploadRequest": { "owner": author } }));
        let response = self
            .ctx
            .http
            .execute(Platform::LinkedIn, "initialize image upload", request, refine)
            .await?;

        let upload_url = json_str(&response.body, "/value/uploadUrl")?;
        let image_urn = json_str(&response.body, "/value/image")?;

        let bytes = self.ctx.fetcher.fetch(Platform::LinkedIn, media).await?;
        let request = self
            .ctx
            .http
            .put(&upload_url, &account.access_token)
            .header(reqwest::header::CONTENT_TYPE, media.mime_type.as_str())
            .body(bytes);
        self.ctx
            .http
            .execute(Platform::LinkedIn, "upload image", request, refine)
            .await?;

        Ok(image_urn)
    }
}

#[async_trait]
impl PlatformAdapter for LinkedInAdapter {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn validate(&self, content: &PlatformContent) -> ValidationResult {
        let mut errors = Vec::new();
        if content.media.iter().any(|m| m.kind() == MediaKind::Video) {
            errors.push("LinkedIn video posts are not supported".to_string());
        }
        errors.extend(check_media_kinds(content, &[MediaKind::Image, MediaKind::Video]));

        validate_rules(content).merge(errors)
    }

    async fn post(
        &self,
        account: &PlatformAccount,
        content: &PlatformContent,
    ) -> PlatformResult<PostReceipt> {
        let author = author_urn(account);

        let mut images = Vec::with_capacity(content.media.len());
        for media in &content.media {
            images.push((self.upload_image(account, &author, media).await?, media));
        }

        let request = self
            .rest(Method::POST, "rest/posts", account)
            .json(&post_body(&author, content, &images));
        let response = self
            .ctx
            .http
            .execute(Platform::LinkedIn, "create post", request, refine)
            .await?;

        // The new post URN is only returned in a header
        let urn = response
            .header("x-restli-id")
            .map(str::to_string)
            .ok_or_else(|| PlatformError::invalid_response("LinkedIn did not return a post id"))?;

        info!(platform = "linkedin", external_id = %urn, "LinkedIn post created");

        Ok(PostReceipt {
            external_url: Some(format!("https://www.linkedin.com/feed/update/{}", urn)),
            external_id: urn,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        let credentials = &self.ctx.credentials;
        let request = self
            .ctx
            .http
            .anonymous(Method::POST, &self.ctx.url(OAUTH_BASE, "oauth/v2/accessToken"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret()),
            ]);

        self.ctx.http.refresh_grant(Platform::LinkedIn, request).await
    }

    async fn verify_exists(
        &self,
        external_id: &str,
        account: &PlatformAccount,
    ) -> PlatformResult<bool> {
        let path = format!("rest/posts/{}", encode_urn(external_id));
        let request = self.rest(Method::GET, &path, account);
        let response = self
            .ctx
            .http
            .execute_optional(Platform::LinkedIn, "lookup post", request, refine)
            .await?;

        Ok(response.is_some())
    }
}
