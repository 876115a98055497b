//! Media upload helpers
//!
//! Chunking for platforms with multi-part upload APIs and the bounded
//! polling primitive used while a platform processes media asynchronously.
//! Polling is for platform-side processing only; publish calls are retried
//! by the orchestrator, never here.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::OrchestratorSettings;
use crate::error::{ErrorKind, PlatformError, PlatformResult};
use crate::platforms::http::HttpClient;
use crate::types::{MediaRef, Platform};

/// Chunk size for segmented uploads (5 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Bounds for media upload and processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSettings {
    pub chunk_size: usize,
    pub poll_interval: Duration,
    pub processing_timeout: Duration,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_secs(2),
            processing_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&OrchestratorSettings> for MediaSettings {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: settings.media_poll_interval(),
            processing_timeout: settings.media_processing_timeout(),
        }
    }
}

/// Split a payload into fixed-size chunks (the last may be shorter)
pub fn chunk_payload(bytes: &[u8], chunk_size: usize) -> std::slice::Chunks<'_, u8> {
    bytes.chunks(chunk_size.max(1))
}

/// State reported by a processing-status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingState<T> {
    Ready(T),
    /// Still processing; the platform may suggest when to look again
    Pending { check_after: Option<Duration> },
    /// The platform gave up on the media
    Failed(String),
}

fn processing_failed(reason: &str) -> PlatformError {
    PlatformError::new(
        ErrorKind::ContentRejected,
        format!("Media processing failed: {}", reason),
    )
}

/// Settle a state reported by an upload call itself
///
/// `Ok(None)` means processing is still running and has to be polled.
pub fn settled<T>(state: ProcessingState<T>) -> PlatformResult<Option<T>> {
    match state {
        ProcessingState::Ready(value) => Ok(Some(value)),
        ProcessingState::Failed(reason) => Err(processing_failed(&reason)),
        ProcessingState::Pending { .. } => Ok(None),
    }
}

/// Poll `check` until it reports ready, failed, or `timeout` elapses
///
/// Waits `interval` (or the platform's `check_after` hint) between checks.
/// Exceeding the bound fails with [`ErrorKind::Timeout`]; a platform-side
/// processing failure is [`ErrorKind::ContentRejected`].
pub async fn poll_until_ready<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> PlatformResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PlatformResult<ProcessingState<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        match check().await? {
            ProcessingState::Ready(value) => return Ok(value),
            ProcessingState::Failed(reason) => return Err(processing_failed(&reason)),
            ProcessingState::Pending { check_after } => {
                let wait = check_after.unwrap_or(interval);
                if Instant::now() + wait > deadline {
                    return Err(PlatformError::timeout(format!(
                        "Media processing did not finish within {}s ({} checks)",
                        timeout.as_secs(),
                        polls
                    )));
                }
                debug!(polls, wait_ms = wait.as_millis() as u64, "Media still processing");
                sleep(wait).await;
            }
        }
    }
}

/// Media collaborator: produces the bytes behind a [`MediaRef`]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// `platform` is the leg the media is fetched for; it labels errors
    async fn fetch(&self, platform: Platform, media: &MediaRef) -> PlatformResult<Vec<u8>>;
}

/// Downloads media from its public URL
pub struct HttpMediaFetcher {
    http: HttpClient,
}

impl HttpMediaFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, platform: Platform, media: &MediaRef) -> PlatformResult<Vec<u8>> {
        let bytes = self.http.download(platform, &media.url).await?;
        if bytes.len() as u64 != media.size_bytes && media.size_bytes > 0 {
            debug!(
                media_id = %media.id,
                expected = media.size_bytes,
                actual = bytes.len(),
                "Downloaded media size differs from reference"
            );
        }
        Ok(bytes)
    }
}
