//! HTTP client for the taxpayer registry.

use anyhow::{Context, Result, bail};
use std::time::Duration;
use tracing::debug;
use treevu_ledger::TaxIdLookup;
use treevu_scan::{Ruc, RucLookupResponse};

use crate::config::RucSection;

pub struct RucClient {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl RucClient {
    pub fn new(section: &RucSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .context("build RUC client")?;
        Ok(Self {
            endpoint: section.endpoint.clone(),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    fn url_for(endpoint: &str, ruc: &Ruc) -> String {
        format!("{}/{}", endpoint.trim_end_matches('/'), ruc.as_str())
    }
}

impl TaxIdLookup for RucClient {
    async fn lookup(&self, ruc: &Ruc) -> Result<RucLookupResponse> {
        let Some(endpoint) = &self.endpoint else {
            bail!("RUC lookup endpoint not configured ([ruc] endpoint in config.toml)");
        };
        let url = Self::url_for(endpoint, ruc);
        debug!(%url, "RUC lookup");

        let resp = self.client.get(&url).send().await.context("RUC lookup request")?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(RucLookupResponse::default());
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("RUC lookup error: {status} {txt}");
        }
        resp.json().await.context("parse RUC lookup response")
    }
}
