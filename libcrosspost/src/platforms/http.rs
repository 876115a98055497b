//! Shared HTTP plumbing for platform adapters
//!
//! Every adapter talks to its platform through [`HttpClient::execute`], which
//! turns transport failures and non-2xx responses into classified
//! [`PlatformError`]s. Adapters pass a [`Refine`] function to map their
//! platform's structured error codes onto a more precise [`ErrorKind`].

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::types::{Platform, TokenGrant};

/// Platform-specific refinement of an error response
pub type Refine = fn(StatusCode, &Value) -> Option<ErrorKind>;

/// Use the status-code classification as is
pub fn no_refine(_: StatusCode, _: &Value) -> Option<ErrorKind> {
    None
}

/// Whether an error response means the object does not exist
pub type Missing = fn(StatusCode, &Value) -> bool;

/// Plain 404
pub fn not_found(status: StatusCode, _: &Value) -> bool {
    status == StatusCode::NOT_FOUND
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    raw: String,
}

/// A successful response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `Value::Null` for empty bodies
    pub body: Value,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// String (or numeric) field at a JSON pointer such as `/data/id`
    pub fn str_at(&self, pointer: &str) -> PlatformResult<String> {
        json_str(&self.body, pointer)
    }
}

/// Read a string or number at a JSON pointer
pub fn json_str(value: &Value, pointer: &str) -> PlatformResult<String> {
    match value.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PlatformError::invalid_response(format!(
            "Response is missing '{}'",
            pointer
        ))),
    }
}

/// Map an HTTP status to an error kind
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 => ErrorKind::InvalidCredentials,
        403 => ErrorKind::PermissionDenied,
        408 | 504 => ErrorKind::Timeout,
        409 => ErrorKind::DuplicatePost,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Transient,
        400..=499 => ErrorKind::ContentRejected,
        _ => ErrorKind::InvalidResponse,
    }
}

/// `Retry-After` in its delta-seconds form
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Best human-readable message in a platform error body
fn error_message(body: &Value, raw: &str) -> String {
    const POINTERS: [&str; 6] = [
        "/error/message",
        "/error_description",
        "/detail",
        "/message",
        "/errors/0/message",
        "/title",
    ];

    let message = POINTERS
        .iter()
        .find_map(|p| body.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| raw.trim().to_string());

    message.chars().take(300).collect()
}

fn parse_body(raw: &str) -> Value {
    if raw.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).unwrap_or(Value::Null)
    }
}

fn transport_error(platform: Platform, context: &str, error: reqwest::Error) -> PlatformError {
    let kind = if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_decode() {
        ErrorKind::InvalidResponse
    } else {
        ErrorKind::Transient
    };

    PlatformError::new(
        kind,
        format!("{} {} request failed: {}", platform, context, error),
    )
}

/// Thin wrapper around a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client whose calls each time out after `timeout`
    pub fn new(timeout: Duration) -> PlatformResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crosspost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::transient(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn get(&self, url: &str, token: &SecretString) -> RequestBuilder {
        self.client.get(url).bearer_auth(token.expose_secret())
    }

    pub fn post(&self, url: &str, token: &SecretString) -> RequestBuilder {
        self.client.post(url).bearer_auth(token.expose_secret())
    }

    pub fn put(&self, url: &str, token: &SecretString) -> RequestBuilder {
        self.client.put(url).bearer_auth(token.expose_secret())
    }

    /// Request without credentials (token endpoints, public media)
    pub fn anonymous(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    async fn send(
        &self,
        platform: Platform,
        context: &str,
        request: RequestBuilder,
    ) -> PlatformResult<RawResponse> {
        debug!(%platform, context, "Sending platform request");

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(platform, context, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(platform, context, e))?;

        Ok(RawResponse {
            status,
            headers,
            raw,
        })
    }

    fn finish(
        platform: Platform,
        context: &str,
        response: RawResponse,
        refine: Refine,
    ) -> PlatformResult<ApiResponse> {
        let RawResponse {
            status,
            headers,
            raw,
        } = response;

        let body = parse_body(&raw);

        if status.is_success() {
            if body.is_null() && !raw.trim().is_empty() {
                return Err(PlatformError::invalid_response(format!(
                    "{} {} returned a non-JSON body",
                    platform, context
                )));
            }
            return Ok(ApiResponse {
                status,
                headers,
                body,
            });
        }

        let kind = refine(status, &body).unwrap_or_else(|| classify_status(status));
        debug!(%platform, context, status = status.as_u16(), %kind, "Platform request failed");

        Err(PlatformError::new(
            kind,
            format!(
                "{} {} failed with HTTP {}: {}",
                platform,
                context,
                status.as_u16(),
                error_message(&body, &raw)
            ),
        )
        .with_retry_after(parse_retry_after(&headers)))
    }

    /// Send a request and classify any failure
    pub async fn execute(
        &self,
        platform: Platform,
        context: &str,
        request: RequestBuilder,
        refine: Refine,
    ) -> PlatformResult<ApiResponse> {
        let response = self.send(platform, context, request).await?;
        Self::finish(platform, context, response, refine)
    }

    /// Like [`execute`](Self::execute) but a 404 yields `Ok(None)`
    pub async fn execute_optional(
        &self,
        platform: Platform,
        context: &str,
        request: RequestBuilder,
        refine: Refine,
    ) -> PlatformResult<Option<ApiResponse>> {
        self.execute_lookup(platform, context, request, refine, not_found)
            .await
    }

    /// Like [`execute`](Self::execute) but any response `missing` accepts
    /// yields `Ok(None)`
    pub async fn execute_lookup(
        &self,
        platform: Platform,
        context: &str,
        request: RequestBuilder,
        refine: Refine,
        missing: Missing,
    ) -> PlatformResult<Option<ApiResponse>> {
        let response = self.send(platform, context, request).await?;
        Self::finish_lookup(platform, context, response, refine, missing)
    }

    fn finish_lookup(
        platform: Platform,
        context: &str,
        response: RawResponse,
        refine: Refine,
        missing: Missing,
    ) -> PlatformResult<Option<ApiResponse>> {
        if !response.status.is_success() && missing(response.status, &parse_body(&response.raw)) {
            debug!(%platform, context, status = response.status.as_u16(), "Object not found");
            return Ok(None);
        }
        Self::finish(platform, context, response, refine).map(Some)
    }

    /// Download raw bytes (media fetch, no JSON parsing)
    pub async fn download(&self, platform: Platform, url: &str) -> PlatformResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(platform, "media download", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::new(
                classify_status(status),
                format!("Media download from {} failed with HTTP {}", url, status.as_u16()),
            )
            .with_retry_after(parse_retry_after(response.headers())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(platform, "media download", e))?;
        Ok(bytes.to_vec())
    }

    /// Standard OAuth2 token response handling shared by refresh flows
    ///
    /// Any rejection by the token endpoint is terminal: the account has to
    /// be re-authorized out of band.
    pub async fn refresh_grant(
        &self,
        platform: Platform,
        request: RequestBuilder,
    ) -> PlatformResult<TokenGrant> {
        let response = self
            .execute(platform, "token refresh", request, no_refine)
            .await
            .map_err(|e| match e.kind {
                ErrorKind::ContentRejected
                | ErrorKind::InvalidCredentials
                | ErrorKind::PermissionDenied => PlatformError::credential_invalid(e.message),
                _ => e,
            })?;

        let access_token = response.str_at("/access_token")?;
        let refresh_token = json_str(&response.body, "/refresh_token").ok();
        let expires_in = response.body.get("expires_in").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        Ok(TokenGrant {
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token.map(SecretString::from),
            expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::InvalidCredentials);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorKind::PermissionDenied);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorKind::RateLimited);
        assert_eq!(classify_status(StatusCode::CONFLICT), ErrorKind::DuplicatePost);
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT), ErrorKind::Timeout);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), ErrorKind::Timeout);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorKind::Transient);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ErrorKind::ContentRejected);
        assert_eq!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            ErrorKind::ContentRejected
        );
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_json_str_accepts_numbers() {
        let body = json!({"data": {"id": "123"}, "id": 456, "empty": ""});
        assert_eq!(json_str(&body, "/data/id").unwrap(), "123");
        assert_eq!(json_str(&body, "/id").unwrap(), "456");

        let err = json_str(&body, "/empty").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert!(json_str(&body, "/missing").is_err());
    }

    fn raw(status: u16, headers: HeaderMap, body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            raw: body.to_string(),
        }
    }

    #[test]
    fn test_finish_rate_limit_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));

        let err = HttpClient::finish(
            Platform::Pinterest,
            "create pin",
            raw(429, headers, r#"{"code": 8, "message": "Too many requests"}"#),
            no_refine,
        )
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
        assert!(err.message.contains("HTTP 429"));
        assert!(err.message.contains("Too many requests"));
    }

    #[test]
    fn test_finish_applies_refinement() {
        fn refine(_: StatusCode, body: &Value) -> Option<ErrorKind> {
            (body.pointer("/error/code").and_then(Value::as_i64) == Some(506))
                .then_some(ErrorKind::DuplicatePost)
        }

        let err = HttpClient::finish(
            Platform::Facebook,
            "publish",
            raw(400, HeaderMap::new(), r#"{"error": {"code": 506, "message": "Duplicate status message"}}"#),
            refine,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicatePost);
    }

    #[test]
    fn test_finish_success_bodies() {
        let ok = HttpClient::finish(
            Platform::LinkedIn,
            "create post",
            raw(201, HeaderMap::new(), ""),
            no_refine,
        )
        .unwrap();
        assert!(ok.body.is_null());

        let err = HttpClient::finish(
            Platform::LinkedIn,
            "create post",
            raw(200, HeaderMap::new(), "<html>maintenance</html>"),
            no_refine,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_finish_lookup_missing_objects() {
        let none = HttpClient::finish_lookup(
            Platform::Twitter,
            "lookup tweet",
            raw(404, HeaderMap::new(), ""),
            no_refine,
            not_found,
        )
        .unwrap();
        assert!(none.is_none());

        fn gone(_: StatusCode, body: &Value) -> bool {
            body.pointer("/error/code").and_then(Value::as_i64) == Some(100)
        }
        let none = HttpClient::finish_lookup(
            Platform::Facebook,
            "lookup object",
            raw(400, HeaderMap::new(), r#"{"error": {"code": 100, "error_subcode": 33}}"#),
            no_refine,
            gone,
        )
        .unwrap();
        assert!(none.is_none());

        let err = HttpClient::finish_lookup(
            Platform::Twitter,
            "lookup tweet",
            raw(500, HeaderMap::new(), ""),
            no_refine,
            not_found,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);

        let found = HttpClient::finish_lookup(
            Platform::Twitter,
            "lookup tweet",
            raw(200, HeaderMap::new(), r#"{"data": {"id": "1"}}"#),
            no_refine,
            not_found,
        )
        .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_error_message_prefers_structured_fields() {
        let body = json!({"error": {"message": "Invalid OAuth access token", "code": 190}});
        assert_eq!(error_message(&body, "raw"), "Invalid OAuth access token");

        let body = json!({"detail": "You are not permitted to perform this action."});
        assert_eq!(
            error_message(&body, "raw"),
            "You are not permitted to perform this action."
        );

        assert_eq!(error_message(&Value::Null, "  plain text  "), "plain text");
    }
}
