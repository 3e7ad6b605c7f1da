use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompts;
use super::{http_client, ChatParams, ChatProvider, Completion, ProviderError, Usage};
use crate::web::models::Role;

const PROVIDER: &str = "anthropic";
const MODEL: &str = "claude-3-sonnet-20240229";
const API_VERSION: &str = "2023-06-01";

// Client for the Anthropic messages API
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        info!("Using Anthropic API at: {}", base_url);
        Ok(Self {
            api_key,
            base_url,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, params: &ChatParams) -> Result<Completion, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| ProviderError::InvalidApiKey { provider: PROVIDER })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = messages_body(params);
        let url = format!("{}/v1/messages", self.base_url);
        debug!("Anthropic request to {}: messages={}", url, body.messages.len());

        let response = self.client.post(&url).headers(headers).json(&body).send().await?;

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

        let parsed: MessagesResponse = response.json().await?;
        let content = match parsed.content.into_iter().next() {
            Some(ContentBlock::Text { text }) => text,
            Some(ContentBlock::Other) => {
                return Err(ProviderError::MalformedResponse {
                    provider: PROVIDER,
                    reason: "first content block is not text".to_string(),
                })
            }
            None => {
                return Err(ProviderError::MalformedResponse {
                    provider: PROVIDER,
                    reason: "reply has no content blocks".to_string(),
                })
            }
        };

        Ok(Completion {
            content,
            model: parsed.model,
            usage: parsed.usage.map(|u| Usage::Messages {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }
}

// The messages API takes instructions through `system`, so caller-supplied
// system turns are dropped. Model and temperature are not the caller's to pick.
fn messages_body(params: &ChatParams) -> MessagesRequest<'_> {
    MessagesRequest {
        model: MODEL,
        max_tokens: params.max_tokens,
        system: prompts::ANTHROPIC_PERSONA,
        messages: params
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
