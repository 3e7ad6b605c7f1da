use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompts::{self, AnalysisTask};
use super::{http_client, ChatParams, ChatProvider, Completion, ProviderError, Usage};
use crate::web::models::Role;

const PROVIDER: &str = "openai";
const ANALYSIS_MODEL: &str = "gpt-4";
const ANALYSIS_TEMPERATURE: f64 = 0.3;

// Client for the OpenAI chat completions API
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        info!("Using OpenAI API at: {}", base_url);
        Ok(Self {
            api_key,
            base_url,
            client: http_client(timeout)?,
        })
    }

    /// Runs one analysis task over `text` and returns the model's answer.
    pub async fn analyze(&self, task: AnalysisTask, text: &str) -> Result<String, ProviderError> {
        let prompt = task.prompt(text);
        let body = analysis_body(&prompt);
        info!("Analyzing {} characters as {:?}", text.chars().count(), task);
        Ok(self.create(&body).await?.content)
    }

    async fn create(&self, body: &CompletionRequest<'_>) -> Result<Completion, ProviderError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ProviderError::InvalidApiKey { provider: PROVIDER })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!("OpenAI request to {}: model={} messages={}", url, body.model, body.messages.len());

        let response = self.client.post(&url).headers(headers).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status,
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: PROVIDER,
                reason: "first choice has no message content".to_string(),
            })?;

        Ok(Completion {
            content,
            model: parsed.model,
            usage: parsed.usage.map(|u| Usage::Completion {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, params: &ChatParams) -> Result<Completion, ProviderError> {
        self.create(&chat_body(params)).await
    }
}

// Persona first, then the caller's conversation untouched.
fn chat_body(params: &ChatParams) -> CompletionRequest<'_> {
    let mut messages = Vec::with_capacity(params.messages.len() + 1);
    messages.push(WireMessage {
        role: Role::System,
        content: prompts::OPENAI_PERSONA,
    });
    messages.extend(params.messages.iter().map(|m| WireMessage {
        role: m.role,
        content: &m.content,
    }));

    CompletionRequest {
        model: &params.model,
        messages,
        temperature: Some(params.temperature),
        max_tokens: Some(params.max_tokens),
    }
}

fn analysis_body(prompt: &str) -> CompletionRequest<'_> {
    CompletionRequest {
        model: ANALYSIS_MODEL,
        messages: vec![
            WireMessage {
                role: Role::System,
                content: prompts::ANALYSIS_SYSTEM,
            },
            WireMessage {
                role: Role::User,
                content: prompt,
            },
        ],
        temperature: Some(ANALYSIS_TEMPERATURE),
        max_tokens: None,
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
