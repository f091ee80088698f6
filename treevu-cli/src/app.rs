//! Everything a command needs: config, profile and the opened session.

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::debug;
use treevu_ledger::{AnalyticsSink, FileStore, JsonlSink, NoopSink, UserSession};

use crate::auth::load_auth;
use crate::config::{Config, data_dir, load_config};
use crate::llm::LlmAnalyzer;
use crate::ruc_client::RucClient;
use crate::state::{Profile, ensure_treevu_home, require_profile};
use crate::telemetry::HttpSink;

pub type Session = UserSession<FileStore, StdRng>;

pub struct App {
    pub config: Config,
    pub profile: Profile,
    pub session: Session,
    http_sink: Option<Arc<HttpSink>>,
}

impl App {
    /// Load config and profile, then open the user's slices from disk.
    pub fn open() -> Result<Self> {
        let config = load_config()?;
        let profile = require_profile()?;
        Self::with(config, profile)
    }

    pub fn with(config: Config, profile: Profile) -> Result<Self> {
        let dir = data_dir(&config)?;
        debug!(dir = %dir.display(), user = %profile.user_id, "opening store");
        let store = FileStore::open(&dir)?;

        let mut http_sink = None;
        let sink: Box<dyn AnalyticsSink> = match (&config.analytics.endpoint, config.analytics.local_log) {
            (Some(endpoint), _) => {
                let s = Arc::new(HttpSink::new(endpoint.clone())?);
                http_sink = Some(s.clone());
                Box::new(s)
            }
            (None, true) => Box::new(JsonlSink::new(ensure_treevu_home()?.join("events.jsonl"))),
            (None, false) => Box::new(NoopSink),
        };

        let session = UserSession::open(
            profile.user_id.clone(),
            profile.display_name.clone(),
            store,
            StdRng::from_entropy(),
        )?
        .with_analytics(sink);

        Ok(Self {
            config,
            profile,
            session,
            http_sink,
        })
    }

    pub fn analyzer(&self) -> Result<LlmAnalyzer> {
        Ok(LlmAnalyzer::new(&self.config.llm, &load_auth()?))
    }

    pub fn registry(&self) -> Result<RucClient> {
        RucClient::new(&self.config.ruc)
    }

    /// Wait for analytics still in flight.
    pub async fn finish(self) {
        if let Some(sink) = self.http_sink {
            sink.flush().await;
        }
    }
}
