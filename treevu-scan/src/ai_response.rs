//! Parse JSON out of free-form collaborator replies.
//!
//! Models wrap JSON in a fenced block more often than not, sometimes with a
//! sentence before or after. We try, in order: the first fenced block, the raw
//! trimmed text, then the outermost `{...}` / `[...]` span.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use thiserror::Error;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").expect("valid fenced-block regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("empty response")]
    Empty,
    #[error("no JSON found in response")]
    NoJson,
    #[error("response JSON did not match the expected shape: {0}")]
    Shape(String),
}

/// Candidate JSON text for a reply, without validating it.
pub fn extract_json_text(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(block) = FENCED.captures(trimmed).and_then(|c| c.get(1)) {
        let inner = block.as_str().trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse a reply into `T`.
pub fn parse_json_response<T: DeserializeOwned>(reply: &str) -> Result<T, ResponseError> {
    if reply.trim().is_empty() {
        return Err(ResponseError::Empty);
    }
    let text = extract_json_text(reply).ok_or(ResponseError::NoJson)?;
    serde_json::from_str(text).map_err(|e| ResponseError::Shape(e.to_string()))
}

/// Result of reading a collaborator reply. `Failed` sends the caller down the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Failed(ResponseError),
}

impl<T: DeserializeOwned> ParseOutcome<T> {
    pub fn from_reply(reply: &str) -> Self {
        match parse_json_response(reply) {
            Ok(v) => ParseOutcome::Parsed(v),
            Err(e) => ParseOutcome::Failed(e),
        }
    }
}

impl<T> ParseOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ParseOutcome::Parsed(v) => Some(v),
            ParseOutcome::Failed(_) => None,
        }
    }
}
