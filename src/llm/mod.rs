//! Chat-completion provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Providers are shared immutable capabilities — clone them freely. A
//! request carries the earlier turns of its conversation along with the ids
//! that place it in the thread; the conversation id is echoed back so the
//! caller can continue it.

pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned an unusable reply: {0}")]
    Malformed(String),
}

// ── Request / response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// An earlier message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// One user turn in a threaded conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// `None` starts a new conversation.
    pub conversation_id: Option<String>,
    /// Message this turn answers.
    pub parent_id: String,
    /// Earlier turns, oldest first.
    pub history: Vec<Turn>,
    pub text: String,
    /// Per-tenant bearer token; overrides the configured API key.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub conversation_id: String,
    pub message_id: String,
    pub text: String,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(request).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(request).await,
        }
    }
}
