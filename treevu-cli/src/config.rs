use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use treevu_core::TaxTable;
use treevu_core::tax::DEFAULT_UIT;

use crate::state::ensure_treevu_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub ruc: RucSection,
    pub analytics: AnalyticsSection,
    pub tax: TaxSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    /// "anthropic", "openai", or "auto" (whichever credential exists)
    pub provider: String,
    pub anthropic_model: String,
    pub openai_model: String,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            anthropic_model: "claude-3-5-sonnet-latest".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RucSection {
    /// Lookup endpoint; the RUC is appended as a path segment
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RucSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AnalyticsSection {
    /// HTTP collector; events are POSTed as JSON
    pub endpoint: Option<String>,
    /// Append events to `<home>/events.jsonl` instead
    pub local_log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaxSection {
    pub uit: f64,
    pub annual_income: Option<f64>,
}

impl Default for TaxSection {
    fn default() -> Self {
        Self {
            uit: DEFAULT_UIT,
            annual_income: None,
        }
    }
}

impl TaxSection {
    pub fn table(&self) -> TaxTable {
        TaxTable::with_uit(self.uit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    /// Slice directory; `<home>/data` when unset
    pub data_dir: Option<PathBuf>,
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_treevu_home()?.join("config.toml"))
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config.toml")
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn data_dir(cfg: &Config) -> Result<PathBuf> {
    match &cfg.storage.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(ensure_treevu_home()?.join("data")),
    }
}
