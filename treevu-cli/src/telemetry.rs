//! Logging setup and the HTTP analytics sink.

use anyhow::{Context, Result};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use treevu_ledger::{AnalyticsEvent, AnalyticsSink};

/// Install the stderr subscriber; `TREEVU_LOG` takes an env-filter directive.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("TREEVU_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// POSTs each event on a background task. `flush` waits for the ones in flight.
pub struct HttpSink {
    endpoint: String,
    client: reqwest::Client,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("build analytics client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub async fn flush(&self) {
        let tasks = self.pending.lock().map(|mut p| std::mem::take(&mut *p)).unwrap_or_default();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "analytics task aborted");
            }
        }
    }
}

impl AnalyticsSink for HttpSink {
    fn send(&self, event: &AnalyticsEvent) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().context("no async runtime for analytics")?;
        let request = self.client.post(&self.endpoint).json(event);
        let name = event.event_name.clone();

        let task = handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => debug!(event = %name, "analytics delivered"),
                Ok(resp) => warn!(event = %name, status = %resp.status(), "analytics rejected"),
                Err(e) => warn!(event = %name, error = %e, "analytics delivery failed"),
            }
        });
        self.pending
            .lock()
            .map_err(|_| anyhow::anyhow!("analytics queue poisoned"))?
            .push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use treevu_core::Level;

    #[test]
    fn test_send_outside_runtime_is_an_error() {
        let sink = HttpSink::new("http://127.0.0.1:9/events").unwrap();
        let ev = AnalyticsEvent::new("expense_added", Utc::now(), "u1", Level::Seed);
        assert!(sink.send(&ev).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_swallowed() {
        let sink = HttpSink::new("http://127.0.0.1:9/events").unwrap();
        let ev = AnalyticsEvent::new("expense_added", Utc::now(), "u1", Level::Seed);
        sink.send(&ev).unwrap();
        sink.flush().await;
        assert!(sink.pending.lock().unwrap().is_empty());
    }
}
