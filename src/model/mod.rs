use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::web::models::ChatMessage;

mod anthropic;
mod openai;
pub mod prompts;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// A conversation with every generation default already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Token accounting as reported by the provider that answered, serialized
/// with that provider's own field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Usage {
    Completion {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    Messages {
        input_tokens: u32,
        output_tokens: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid {provider} API key")]
    InvalidApiKey { provider: &'static str },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned {status}: {body}")]
    Api {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed {provider} response: {reason}")]
    MalformedResponse {
        provider: &'static str,
        reason: String,
    },
}

/// One chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, params: &ChatParams) -> Result<Completion, ProviderError>;
}

/// Answers every conversation with a configuration notice.
pub struct FallbackProvider;

#[async_trait]
impl ChatProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn complete(&self, _params: &ChatParams) -> Result<Completion, ProviderError> {
        Ok(Completion {
            content: prompts::CHAT_FALLBACK.to_string(),
            model: "fallback".to_string(),
            usage: None,
        })
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Providers chosen once from the loaded configuration.
pub struct ModelManager {
    pub chat: Arc<dyn ChatProvider>,
    /// Only OpenAI serves text analysis.
    pub analyst: Option<Arc<OpenAiProvider>>,
}

impl ModelManager {
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let analyst = match &config.openai_api_key {
            Some(key) => Some(Arc::new(OpenAiProvider::new(
                key.clone(),
                config.openai_base_url.clone(),
                config.request_timeout,
            )?)),
            None => None,
        };

        let chat: Arc<dyn ChatProvider> = match (&analyst, &config.anthropic_api_key) {
            (Some(openai), _) => openai.clone() as Arc<dyn ChatProvider>,
            (None, Some(key)) => Arc::new(AnthropicProvider::new(
                key.clone(),
                config.anthropic_base_url.clone(),
                config.request_timeout,
            )?),
            (None, None) => Arc::new(FallbackProvider),
        };

        info!("Chat provider: {}", chat.name());
        if analyst.is_none() {
            info!("Text analysis disabled until OPENAI_API_KEY is set");
        }

        Ok(Self { chat, analyst })
    }
}
