//! Crosspost - one post, many social networks
//!
//! This library fans a single piece of content out to several social-media
//! platforms, adapting and validating it per platform, retrying transient
//! failures, refreshing expired credentials and verifying that each post
//! actually landed.

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod retry;
pub mod retry_queue;
pub mod transform;
pub mod types;
pub mod verifier;

// Re-export commonly used types
pub use accounts::{AccountStore, CredentialResolver, InMemoryAccountStore};
pub use config::{Config, OrchestratorSettings};
pub use db::Database;
pub use error::{CrosspostError, ErrorKind, PlatformError, Result};
pub use orchestrator::PublishOrchestrator;
pub use platforms::{AdapterRegistry, PlatformAdapter};
pub use retry_queue::{InMemoryRetryQueue, RetryQueueEntry, RetryQueueStore};
pub use types::{AggregateResult, LegOutcome, Platform, PublishLegResult, PublishRequest};
