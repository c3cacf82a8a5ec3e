//! HTTP completion clients for Ollama and OpenAI-compatible endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use docrag_core::config::{LlmProvider, LlmSettings};
use docrag_core::error::{Error, Result};

use crate::answer::Completer;

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| Error::Completion(format!("failed to build HTTP client: {e}")))
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response, who: &str) -> Result<T> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(Error::Completion(format!("{who} returned {status}: {text}")));
    }
    resp.json().await.map_err(|e| Error::Completion(format!("failed to parse {who} response: {e}")))
}

pub struct OllamaCompleter {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaCompleter {
    pub fn new(base_url: &str, model: &str, temperature: f32, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl Completer for OllamaCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };
        debug!("ollama generate ({} prompt bytes)", prompt.len());
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("failed to call Ollama: {e}")))?;
        let parsed: GenerateResponse = read_json(resp, "Ollama").await?;
        Ok(parsed.response)
    }
}

pub struct OpenAiCompleter {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompleter {
    pub fn new(api_base: &str, api_key: &str, model: &str, temperature: f32, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Completer for OpenAiCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let mut req = self.client.post(format!("{}/chat/completions", self.api_base)).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Completion(format!("failed to call OpenAI chat completions: {e}")))?;
        let parsed: ChatResponse = read_json(resp, "OpenAI").await?;
        Ok(parsed.choices.into_iter().find_map(|c| c.message.content).unwrap_or_default())
    }
}

pub fn build_completer(settings: &LlmSettings) -> Result<Arc<dyn Completer>> {
    Ok(match settings.provider {
        LlmProvider::Ollama => Arc::new(OllamaCompleter::new(
            &settings.ollama_base_url,
            &settings.ollama_model,
            settings.temperature,
            settings.timeout_secs,
        )?),
        LlmProvider::Openai => Arc::new(OpenAiCompleter::new(
            &settings.openai_api_base,
            &settings.openai_api_key,
            &settings.openai_model,
            settings.temperature,
            settings.timeout_secs,
        )?),
    })
}
