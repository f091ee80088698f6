use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// `$TREEVU_HOME`, or `~/.treevu`.
pub fn treevu_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TREEVU_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".treevu"))
}

pub fn ensure_treevu_home() -> Result<PathBuf> {
    let dir = treevu_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub created_at_utc: Option<String>,
    pub user_id: String,
    pub display_name: String,
}

impl Profile {
    /// Lowercase ascii slug of the display name, used as the storage key.
    pub fn user_id_for(display_name: &str) -> String {
        let slug: String = display_name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let slug = slug.trim_matches('-').to_string();
        if slug.is_empty() { "local".to_string() } else { slug }
    }
}

pub fn profile_path() -> Result<PathBuf> {
    Ok(ensure_treevu_home()?.join("profile.json"))
}

pub fn write_profile(profile: &Profile) -> Result<()> {
    let p = profile_path()?;
    let json = serde_json::to_string_pretty(profile)?;
    fs::write(&p, json).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn read_profile() -> Result<Option<Profile>> {
    let p = profile_path()?;
    if !p.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(Some(serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?))
}

pub fn require_profile() -> Result<Profile> {
    match read_profile()? {
        Some(p) => Ok(p),
        None => bail!("No profile found. Run: treevu setup"),
    }
}
