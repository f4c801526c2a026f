//! OpenAI-compatible chat-completions generator.
//!
//! Posts the rendered [`PromptContext`] to `{base_url}/chat/completions` and
//! returns the first choice's message content.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ArtifactGenerator, CollaboratorResult, PromptContext};
use crate::error::CollaboratorError;
use crate::roles::AgentRole;

const COLLABORATOR: &str = "chat-completions";

/// Chat-completions endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    /// Bearer token (optional for local servers)
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        ChatCompletionsConfig {
            base_url: std::env::var("DUET_LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            model: std::env::var("DUET_LLM_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            api_key: std::env::var("DUET_LLM_API_KEY").ok(),
            timeout_secs: std::env::var("DUET_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            temperature: 0.2,
        }
    }
}

impl ChatCompletionsConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str, model: &str) -> Self {
        ChatCompletionsConfig {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.2,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Generator backed by an OpenAI-compatible HTTP endpoint.
pub struct ChatCompletionsGenerator {
    config: ChatCompletionsConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatCompletionsConfig) -> CollaboratorResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("duet/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn from_env() -> CollaboratorResult<Self> {
        Self::new(ChatCompletionsConfig::from_env())
    }

    fn system_prompt(role: AgentRole) -> &'static str {
        match role {
            AgentRole::Design => {
                "You design data dashboards. Answer with a markdown title line and one \
                 `- component: name; kind: k; source: s; fields: a, b; depends: x` line per component."
            }
            AgentRole::Implementation => {
                "You implement dashboard components. Answer with one `=== file: path ===` header \
                 per file followed by its content. Reference data fields as field(\"name\")."
            }
        }
    }
}

#[async_trait]
impl ArtifactGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &PromptContext) -> CollaboratorResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt(prompt.role).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.render(),
                },
            ],
        };

        debug!(url = %url, role = %prompt.role, "requesting chat completion");

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Unavailable {
                collaborator: COLLABORATOR,
                reason: format!("status {status}: {text}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse {
                collaborator: COLLABORATOR,
                reason: "no completion content".to_string(),
            })
    }
}
