//! Structured observability events for the recommendation path.
//!
//! Components emit [`RecommendationEvent`]s through an [`EventSink`] instead of
//! logging inline, so the recovery control flow stays free of formatting and
//! tests can swap in [`InMemoryEventSink`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub event_type: String,
    pub level: EventLevel,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl RecommendationEvent {
    pub fn new(
        event_type: impl Into<String>,
        level: EventLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            level,
            message: message.into(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn debug(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event_type, EventLevel::Debug, message)
    }

    pub fn info(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event_type, EventLevel::Info, message)
    }

    pub fn warn(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event_type, EventLevel::Warn, message)
    }

    pub fn error(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(event_type, EventLevel::Error, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RecommendationEvent);
}

/// Forwards events to `tracing` at the event's own level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RecommendationEvent) {
        let metadata = format!("{:?}", event.metadata);
        match event.level {
            EventLevel::Debug => tracing::debug!(
                event_name = %event.event_type,
                metadata = %metadata,
                "{}",
                event.message
            ),
            EventLevel::Info => tracing::info!(
                event_name = %event.event_type,
                metadata = %metadata,
                "{}",
                event.message
            ),
            EventLevel::Warn => tracing::warn!(
                event_name = %event.event_type,
                metadata = %metadata,
                "{}",
                event.message
            ),
            EventLevel::Error => tracing::error!(
                event_name = %event.event_type,
                metadata = %metadata,
                "{}",
                event.message
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<RecommendationEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<RecommendationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.events().iter().any(|event| event.event_type == event_type)
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: RecommendationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
