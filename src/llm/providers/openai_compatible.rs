//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! The endpoint is stateless: the conversation so far is replayed as the
//! `messages` array, and conversation and message ids are minted locally. A
//! request without a conversation id starts a new one, and every reply gets a
//! fresh message id. All OpenAI wire types are private to this module.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::llm::{Completion, CompletionRequest, ProviderError, Role};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
/// Cheap to clone: `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` unless the request carries its own
    /// token.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages(&request),
            temperature: self.temperature,
        };

        debug!(
            model = %payload.model,
            conversation = ?request.conversation_id,
            parent = %request.parent_id,
            turns = request.history.len(),
            content_len = request.text.len(),
            "sending completion request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full completion request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = request.token.as_ref().or(self.api_key.as_ref()) {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "completion HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize completion response");
            ProviderError::Malformed(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received completion response");

        let text = first_content(parsed)?;
        Ok(Completion {
            conversation_id: request
                .conversation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_id: Uuid::new_v4().to_string(),
            text,
        })
    }
}

/// Earlier turns in order, then the new user message.
fn messages(request: &CompletionRequest) -> Vec<Message> {
    request
        .history
        .iter()
        .map(|turn| Message {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: turn.text.clone(),
        })
        .chain(std::iter::once(Message { role: "user".to_string(), content: request.text.clone() }))
        .collect()
}

fn first_content(parsed: ChatCompletionResponse) -> Result<String, ProviderError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::Malformed("empty or missing content in response".into()))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => format!("HTTP {status}: {}", env.error.message),
        Err(_) => format!("HTTP {status}: {body}"),
    };

    error!(%status, %message, "completion request returned HTTP error");
    Err(ProviderError::Request(message))
}
