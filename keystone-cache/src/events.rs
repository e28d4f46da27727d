//! Cache events.
//!
//! Repositories report reads and writes to an optional [`EventSink`]. Delivery
//! is fire-and-forget: a sink cannot fail the cache operation that produced
//! the event.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Event emitted by a repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CacheEvent {
    /// A read found a value.
    Hit {
        key: String,
        value: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },
    /// A read found nothing.
    Missed {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },
    /// A key was removed.
    KeyForgotten {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },
    /// A value was written. `minutes` is zero for forever entries.
    KeyWritten {
        key: String,
        value: Value,
        minutes: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
    },
}

impl CacheEvent {
    /// Event name as published to listeners.
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "Cache.hit",
            CacheEvent::Missed { .. } => "Cache.missed",
            CacheEvent::KeyForgotten { .. } => "Cache.keyForgotten",
            CacheEvent::KeyWritten { .. } => "Cache.keyWritten",
        }
    }

    /// Logical (untagged) key the event refers to.
    pub fn key(&self) -> &str {
        match self {
            CacheEvent::Hit { key, .. }
            | CacheEvent::Missed { key, .. }
            | CacheEvent::KeyForgotten { key, .. }
            | CacheEvent::KeyWritten { key, .. } => key,
        }
    }

    /// Tags of the tagged cache that produced the event, if any.
    pub fn tags(&self) -> Option<&[String]> {
        match self {
            CacheEvent::Hit { tags, .. }
            | CacheEvent::Missed { tags, .. }
            | CacheEvent::KeyForgotten { tags, .. }
            | CacheEvent::KeyWritten { tags, .. } => tags.as_deref(),
        }
    }
}

/// Receiver of cache events.
pub trait EventSink: Send + Sync {
    /// Deliver an event. Must not block on slow consumers.
    fn emit(&self, event: &CacheEvent);
}

impl<F> EventSink for F
where
    F: Fn(&CacheEvent) + Send + Sync,
{
    fn emit(&self, event: &CacheEvent) {
        self(event)
    }
}

impl EventSink for broadcast::Sender<CacheEvent> {
    fn emit(&self, event: &CacheEvent) {
        // No subscribers is not an error for a fire-and-forget sink
        let _ = self.send(event.clone());
    }
}
