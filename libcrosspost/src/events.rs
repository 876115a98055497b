//! Progress events for publish requests
//!
//! The orchestrator reports leg transitions over an in-process
//! `tokio::sync::broadcast` channel. Emitting never blocks: without
//! subscribers events are dropped, and a lagging subscriber misses the
//! oldest events rather than slowing a leg down.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! while let Ok(event) = receiver.recv().await {
//!     if let Event::LegCompleted { platform, outcome, .. } = event {
//!         println!("{}: {}", platform, outcome);
//!     }
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::types::{LegOutcome, Platform, ResultSummary};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventBus {
    /// `capacity` is the number of events buffered per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PublishStarted {
        request_id: String,
        platforms: Vec<Platform>,
    },

    LegStarted {
        request_id: String,
        platform: Platform,
    },

    /// A post attempt failed with a retryable error and will be repeated
    LegRetrying {
        request_id: String,
        platform: Platform,
        attempt: u32,
        kind: ErrorKind,
        delay_ms: u64,
    },

    LegCompleted {
        request_id: String,
        platform: Platform,
        outcome: LegOutcome,
        external_post_id: Option<String>,
        error: Option<String>,
    },

    PublishCompleted {
        request_id: String,
        summary: ResultSummary,
    },
}

impl Event {
    pub fn request_id(&self) -> &str {
        match self {
            Event::PublishStarted { request_id, .. }
            | Event::LegStarted { request_id, .. }
            | Event::LegRetrying { request_id, .. }
            | Event::LegCompleted { request_id, .. }
            | Event::PublishCompleted { request_id, .. } => request_id,
        }
    }
}
