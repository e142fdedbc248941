//! Chat-completions client implementing `ModelClient`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use datasquad_core::{estimate_tokens, Completion, ModelClient, ModelError, ModelRequest, TurnRole};

use crate::config::GatewayConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub completion_tokens: Option<u64>,
}

/// Wire role for a conversation turn. The squad's own output is the
/// assistant; gate feedback speaks as the user.
pub(crate) fn wire_role(role: TurnRole) -> &'static str {
    match role {
        TurnRole::Architect | TurnRole::CloudArchitect => "assistant",
        TurnRole::Validator => "user",
    }
}

/// Build the wire request: system prompt, the newest `history_limit` context
/// turns, then the task.
pub(crate) fn build_chat_request(config: &GatewayConfig, request: &ModelRequest) -> ChatRequest {
    let skip = request.context.len().saturating_sub(config.history_limit);
    let mut messages = Vec::with_capacity(request.context.len() - skip + 2);
    messages.push(ChatMessage::new("system", &request.system));
    messages.extend(
        request
            .context
            .iter()
            .skip(skip)
            .map(|t| ChatMessage::new(wire_role(t.role()), t.content())),
    );
    messages.push(ChatMessage::new("user", &request.task));

    ChatRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_output_tokens,
        temperature: config.temperature,
    }
}

/// Map a non-success status to a retry-classified error.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ModelError {
    let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS {
        ModelError::RateLimited(detail)
    } else if status.is_server_error() {
        ModelError::Unavailable(detail)
    } else {
        ModelError::Rejected(detail)
    }
}

pub(crate) fn parse_completion(response: ChatResponse) -> std::result::Result<Completion, ModelError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ModelError::MalformedResponse("response has no choices".to_string()))?;
    let token_count = response
        .usage
        .and_then(|u| u.completion_tokens)
        .unwrap_or_else(|| estimate_tokens(&text));
    Ok(Completion::new(text, token_count))
}

/// `ModelClient` for an OpenAI-compatible chat-completions gateway
pub struct GatewayClient {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .finish()
    }
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("datasquad-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(GatewayClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[async_trait]
impl ModelClient for GatewayClient {
    async fn complete(&self, request: &ModelRequest) -> std::result::Result<Completion, ModelError> {
        let body = build_chat_request(&self.config, request);
        debug!(
            model = %self.config.model,
            messages = body.messages.len(),
            "gateway request"
        );

        let mut http = self.http_client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| transport_error(&self.config, e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;
        parse_completion(parsed)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

fn transport_error(config: &GatewayConfig, err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout {
            after_ms: config.timeout.as_millis() as u64,
        }
    } else {
        ModelError::Unavailable(err.to_string())
    }
}
