//! Product analytics events.
//!
//! Delivery is best effort: a failing sink is logged and otherwise ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;
use treevu_core::Level;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUser {
    pub user_id: String,
    pub level: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub user: EventUser,
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(event_name: impl Into<String>, timestamp: DateTime<Utc>, user_id: &str, level: Level) -> Self {
        Self {
            event_name: event_name.into(),
            timestamp,
            user: EventUser { user_id: user_id.to_string(), level },
            properties: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

pub trait AnalyticsSink {
    fn send(&self, event: &AnalyticsEvent) -> Result<()>;
}

/// Send an event, swallowing and logging failures.
pub fn emit(sink: &dyn AnalyticsSink, event: AnalyticsEvent) {
    if let Err(e) = sink.send(&event) {
        warn!(event = %event.event_name, error = %e, "analytics delivery failed");
    }
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn send(&self, _event: &AnalyticsEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps events in memory for inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|ev| ev.iter().map(|e| e.event_name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().map(|ev| ev.clone()).unwrap_or_default()
    }
}

impl AnalyticsSink for MemorySink {
    fn send(&self, event: &AnalyticsEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("analytics buffer poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

impl<T: AnalyticsSink + ?Sized> AnalyticsSink for std::sync::Arc<T> {
    fn send(&self, event: &AnalyticsEvent) -> Result<()> {
        (**self).send(event)
    }
}

/// Appends one JSON line per event
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AnalyticsSink for JsonlSink {
    fn send(&self, event: &AnalyticsEvent) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let line = serde_json::to_string(event)?;
        writeln!(f, "{line}").with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl AnalyticsSink for Broken {
        fn send(&self, _event: &AnalyticsEvent) -> Result<()> {
            anyhow::bail!("endpoint down")
        }
    }

    fn event() -> AnalyticsEvent {
        AnalyticsEvent::new("expense_added", Utc::now(), "u1", Level::Sprout)
            .with("total", 12.5)
            .with("is_formal", true)
    }

    #[test]
    fn test_envelope_shape() {
        let v = serde_json::to_value(event()).unwrap();
        assert_eq!(v["event_name"], "expense_added");
        assert_eq!(v["user"]["user_id"], "u1");
        assert_eq!(v["user"]["level"], "brote");
        assert_eq!(v["properties"]["total"], 12.5);
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn test_failures_are_swallowed() {
        emit(&Broken, event());
        let sink = MemorySink::new();
        emit(&sink, event());
        assert_eq!(sink.names(), vec!["expense_added".to_string()]);
    }

    #[test]
    fn test_jsonl_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("events.jsonl"));
        sink.send(&event()).unwrap();
        sink.send(&event()).unwrap();
        let text = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
