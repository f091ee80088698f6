use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::prompt::prompt;
use crate::state::ensure_treevu_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub anthropic_token: Option<String>,
    pub openai_api_key: Option<String>,
}

fn auth_path() -> Result<std::path::PathBuf> {
    Ok(ensure_treevu_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(serde_json::from_str(&s)?)
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn check_prefix(value: &str, prefix: &str, what: &str) -> Result<()> {
    if !value.starts_with(prefix) {
        bail!("that didn't look like {what} (expected prefix {prefix})");
    }
    Ok(())
}

pub fn anthropic_paste_token() -> Result<()> {
    let mut auth = load_auth()?;
    let token = prompt("Paste Anthropic token (starts with sk-ant-)")?;
    check_prefix(&token, "sk-ant-", "an Anthropic token")?;
    auth.anthropic_token = Some(token);
    save_auth(&auth)?;
    println!("Saved Anthropic token to {}", auth_path()?.display());
    Ok(())
}

pub fn openai_paste_api_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt("Paste OpenAI API key (starts with sk-)")?;
    check_prefix(&key, "sk-", "an OpenAI API key")?;
    auth.openai_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved OpenAI API key to {}", auth_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_check() {
        assert!(check_prefix("sk-ant-abc", "sk-ant-", "an Anthropic token").is_ok());
        assert!(check_prefix("sk-abc", "sk-ant-", "an Anthropic token").is_err());
    }

    #[test]
    fn test_auth_file_shape() {
        let a: AuthState = serde_json::from_str(r#"{"openai_api_key": "sk-1"}"#).unwrap();
        assert!(a.anthropic_token.is_none());
        assert_eq!(a.openai_api_key.as_deref(), Some("sk-1"));
    }
}
