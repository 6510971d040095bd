//! LLM completion providers and the fixed-order fallback chain.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use courier_logging::{courier_debug, courier_warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::processor::Processor;
use crate::{ProcessError, ProcessOutput, WorkItem};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("provider {provider}: missing api key (set {env_var})")]
    MissingApiKey { provider: String, env_var: String },
    #[error("provider {provider}: http status {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("provider {provider}: request timed out")]
    Timeout { provider: String },
    #[error("provider {provider}: network error: {message}")]
    Network { provider: String, message: String },
    #[error("provider {provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("no completion providers configured")]
    NoProviders,
    #[error("all providers failed: {0}")]
    AllFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    /// Base of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. `None` sends no Authorization header.
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key_env: None,
            temperature: 0.7,
            max_tokens: 1024,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
}

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
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
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletionProvider {
    settings: ProviderSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompletionProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| CompletionError::Network {
                provider: settings.name.clone(),
                message: err.to_string(),
            })?;
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        Ok(Self {
            settings,
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> CompletionError {
        let provider = self.settings.name.clone();
        if err.is_timeout() {
            return CompletionError::Timeout { provider };
        }
        CompletionError::Network {
            provider,
            message: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for HttpCompletionProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let provider = self.settings.name.clone();
        if let (Some(env_var), None) = (&self.settings.api_key_env, &self.api_key) {
            return Err(CompletionError::MissingApiKey {
                provider,
                env_var: env_var.clone(),
            });
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = serde_json::to_vec(&ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        })
        .map_err(|err| CompletionError::InvalidResponse {
            provider: provider.clone(),
            message: err.to_string(),
        })?;

        let mut builder = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        if !status.is_success() {
            return Err(CompletionError::HttpStatus {
                provider,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|err| CompletionError::InvalidResponse {
                provider: provider.clone(),
                message: err.to_string(),
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse {
                provider,
                message: "response has no content".to_string(),
            })
    }
}

/// Tries providers in the order given; the first success wins.
#[derive(Clone, Default)]
pub struct FallbackCompleter {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl FallbackCompleter {
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if self.providers.is_empty() {
            return Err(CompletionError::NoProviders);
        }

        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.complete(request).await {
                Ok(text) => {
                    courier_debug!("completion served by {}", provider.name());
                    return Ok(text);
                }
                Err(err) => {
                    courier_warn!("completion provider {} failed: {}", provider.name(), err);
                    failures.push(err.to_string());
                }
            }
        }
        Err(CompletionError::AllFailed(failures.join("; ")))
    }
}

/// Processor that answers each chat message through the fallback chain.
pub struct CompletionProcessor {
    completer: FallbackCompleter,
    system_prompt: RwLock<Option<String>>,
}

impl CompletionProcessor {
    pub fn new(completer: FallbackCompleter) -> Self {
        Self {
            completer,
            system_prompt: RwLock::new(None),
        }
    }

    /// Replaces the system prompt used for messages processed from now on.
    pub fn set_system_prompt(&self, prompt: Option<String>) {
        match self.system_prompt.write() {
            Ok(mut guard) => *guard = prompt,
            Err(poisoned) => *poisoned.into_inner() = prompt,
        }
    }

    fn system_prompt(&self) -> Option<String> {
        match self.system_prompt.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl Processor for CompletionProcessor {
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutput, ProcessError> {
        let request = CompletionRequest {
            system_prompt: self.system_prompt(),
            prompt: item.content.clone(),
        };
        let reply = self.completer.complete(&request).await?;
        Ok(ProcessOutput { reply: Some(reply) })
    }
}
