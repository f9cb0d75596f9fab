//! Replies — what a dispatch produces for the platform to show the caller.
//!
//! Handlers return a [`HandlerStream`]: zero or more `Result<Reply, _>`
//! items. The dispatchers contain errors and hand the platform a plain
//! [`ReplyStream`].

use std::future::Future;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::client::ClientError;
use crate::llm::ProviderError;

// ── Reply types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Reply {
    /// A new response message.
    Message(OutboundMessage),
    /// Replace the message the interaction originated from (button presses).
    Update(OutboundMessage),
    /// Acknowledge without visible content.
    Ack,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Message(OutboundMessage::text(content))
    }

    /// A message only the caller can see.
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::Message(OutboundMessage::text(content).ephemeral())
    }

    /// Text content of a `Message`/`Update`, `None` for `Ack`.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Message(m) | Self::Update(m) => Some(&m.content),
            Self::Ack => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Default::default() }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub style: ButtonStyle,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            emoji: None,
            style: ButtonStyle::Primary,
            disabled: false,
        }
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

// ── Handler results ───────────────────────────────────────────────────────────

/// Failure inside a handler body. Logged in full; the caller only ever sees
/// [`SOMETHING_WENT_WRONG`].
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Failed(String),
}

/// What a handler method returns.
pub type HandlerStream = BoxStream<'static, Result<Reply, HandlerError>>;

/// What a dispatch hands back to the platform.
pub type ReplyStream = BoxStream<'static, Reply>;

/// A handler result producing exactly one reply once `fut` resolves.
pub fn once<F>(fut: F) -> HandlerStream
where
    F: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
{
    stream::once(fut).boxed()
}

/// A handler result that is already known.
pub fn just(reply: Reply) -> HandlerStream {
    stream::once(async move { Ok(reply) }).boxed()
}

/// A handler result with no replies.
pub fn empty() -> HandlerStream {
    stream::empty().boxed()
}

/// A platform-facing stream with exactly one reply.
pub fn single(reply: Reply) -> ReplyStream {
    stream::once(async move { reply }).boxed()
}

// ── User-visible router strings ───────────────────────────────────────────────

pub const SOMETHING_WENT_WRONG: &str = "Something went wrong!";
pub const OUTSIDE_GUILD: &str = "Commands to this bot must be sent from inside a server";
pub const NOT_READY: &str = "Commands are still being set up, try again shortly";
pub const TRULY_WRONG: &str = "Whoa! Something went truly wrong. Reach out to my author to fix me!";

pub fn unknown_command(name: &str) -> String {
    format!("Unknown command `/{name}`")
}

pub fn needs_sub_command(name: &str) -> String {
    format!("`/{name}` needs a sub-command")
}

pub fn missing_option(name: &str) -> String {
    format!("Missing required option `{name}`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_serialises_with_kind_tag() {
        let v = serde_json::to_value(Reply::ephemeral("hi")).unwrap();
        assert_eq!(v, json!({ "kind": "message", "message": { "content": "hi", "ephemeral": true } }));
        assert_eq!(serde_json::to_value(Reply::Ack).unwrap(), json!({ "kind": "ack" }));
    }

    #[test]
    fn user_visible_strings() {
        assert_eq!(unknown_command("x"), "Unknown command `/x`");
        assert_eq!(needs_sub_command("m"), "`/m` needs a sub-command");
        assert_eq!(missing_option("video"), "Missing required option `video`");
    }

    #[tokio::test]
    async fn helpers_build_streams() {
        let items: Vec<_> = just(Reply::text("a")).collect().await;
        assert_eq!(items.len(), 1);
        assert!(empty().next().await.is_none());
        let r = single(Reply::Ack).next().await;
        assert_eq!(r, Some(Reply::Ack));
        let r = once(async { Err(HandlerError::Failed("boom".into())) }).next().await;
        assert!(matches!(r, Some(Err(HandlerError::Failed(_)))));
    }
}
