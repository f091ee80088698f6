//! Receipt analysis over the Anthropic / OpenAI messages APIs.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use treevu_ledger::ReceiptAnalyzer;
use treevu_scan::CollaboratorRequest;

use crate::auth::AuthState;
use crate::config::LlmSection;

const SYSTEM: &str = "Eres el asistente de treevü. Lees comprobantes de pago peruanos \
(facturas, boletas, recibos por honorarios y tickets) y respondes únicamente con JSON.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
struct Credential {
    provider: Provider,
    secret: String,
    model: String,
}

/// Vision collaborator. Without a credential every call fails, which the
/// capture wizard reports as a collaborator error.
pub struct LlmAnalyzer {
    credential: Option<Credential>,
    max_tokens: u32,
    client: reqwest::Client,
}

fn pick_provider(section: &LlmSection, auth: &AuthState) -> Option<Credential> {
    let anthropic = auth.anthropic_token.clone().map(|secret| Credential {
        provider: Provider::Anthropic,
        secret,
        model: section.anthropic_model.clone(),
    });
    let openai = auth.openai_api_key.clone().map(|secret| Credential {
        provider: Provider::OpenAI,
        secret,
        model: section.openai_model.clone(),
    });
    match section.provider.as_str() {
        "anthropic" => anthropic,
        "openai" => openai,
        _ => anthropic.or(openai),
    }
}

impl LlmAnalyzer {
    pub fn new(section: &LlmSection, auth: &AuthState) -> Self {
        Self {
            credential: pick_provider(section, auth),
            max_tokens: section.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        self.credential.as_ref().map(|c| c.provider)
    }

    fn user_text(request: &CollaboratorRequest) -> String {
        format!("{}\n\nEsquema JSON de la respuesta:\n{}", request.prompt, request.schema)
    }

    async fn anthropic(&self, cred: &Credential, request: &CollaboratorRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Msg {
            role: &'static str,
            content: Vec<Value>,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'static str,
            messages: Vec<Msg>,
        }

        #[derive(Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            t: String,
            text: Option<String>,
        }

        let mut content = Vec::new();
        if let Some(img) = &request.image {
            content.push(json!({
                "type": "image",
                "source": {"type": "base64", "media_type": img.media_type, "data": img.data_base64},
            }));
        }
        content.push(json!({"type": "text", "text": Self::user_text(request)}));

        let body = Req {
            model: &cred.model,
            max_tokens: self.max_tokens,
            system: SYSTEM,
            messages: vec![Msg { role: "user", content }],
        };

        let mut headers = HeaderMap::new();
        // Console API keys go in x-api-key; setup tokens are bearer credentials.
        if cred.secret.starts_with("sk-ant-api") {
            headers.insert("x-api-key", HeaderValue::from_str(&cred.secret)?);
        } else {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cred.secret))?);
        }
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse anthropic response")?;
        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.t == "text")
            .filter_map(|b| b.text)
            .collect();
        Ok(text.trim().to_string())
    }

    async fn openai(&self, cred: &Credential, request: &CollaboratorRequest) -> Result<String> {
        #[derive(Serialize)]
        struct Msg {
            role: &'static str,
            content: Value,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<Msg>,
            temperature: f32,
            response_format: Value,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let mut parts = vec![json!({"type": "text", "text": Self::user_text(request)})];
        if let Some(img) = &request.image {
            parts.push(json!({"type": "image_url", "image_url": {"url": img.data_url()}}));
        }

        let body = Req {
            model: &cred.model,
            max_tokens: self.max_tokens,
            messages: vec![
                Msg { role: "system", content: Value::String(SYSTEM.to_string()) },
                Msg { role: "user", content: Value::Array(parts) },
            ],
            temperature: 0.0,
            response_format: json!({"type": "json_object"}),
        };

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header(AUTHORIZATION, format!("Bearer {}", cred.secret))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

impl ReceiptAnalyzer for LlmAnalyzer {
    async fn analyze(&self, request: &CollaboratorRequest) -> Result<String> {
        let cred = self.credential.as_ref().ok_or_else(|| {
            anyhow!("no AI credential; run: treevu auth paste-anthropic-token (or paste-openai-api-key)")
        })?;
        debug!(mode = ?request.mode, provider = ?cred.provider, "collaborator request");
        match cred.provider {
            Provider::Anthropic => self.anthropic(cred, request).await,
            Provider::OpenAI => self.openai(cred, request).await,
        }
    }
}
