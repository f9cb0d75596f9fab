//! Dummy provider — echoes input back prefixed with `[echo]`, noting how
//! many earlier turns it was given. Lets the chat module run end to end
//! without an API key.

use uuid::Uuid;

use crate::llm::{Completion, CompletionRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        Ok(Completion {
            conversation_id: request
                .conversation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_id: Uuid::new_v4().to_string(),
            text: match request.history.len() {
                0 => format!("[echo] {}", request.text),
                n => format!("[echo] {} ({n} earlier turns)", request.text),
            },
        })
    }
}
