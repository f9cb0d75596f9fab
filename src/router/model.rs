//! Platform data model — ids, entity references, inbound events and the
//! per-dispatch contexts handed to handler methods.
//!
//! Everything here mirrors the shape the platform sends so the console
//! gateway can deserialize events straight from JSON.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::options::InteractionOptionType;

// ── Snowflake ─────────────────────────────────────────────────────────────────

/// A 64-bit platform id. Serialised as a decimal string; deserialised from
/// either a string or a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(u64);

/// The id of a guild — one tenant, one [`Partition`](super::partition::Partition).
pub type TenantId = Snowflake;

impl Snowflake {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a snowflake as a decimal string or unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Snowflake, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Snowflake, E> {
                u64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::custom(format!("negative snowflake: {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Snowflake, E> {
                v.parse().map_err(|_| E::custom(format!("invalid snowflake: {v:?}")))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

// ── Entities ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl UserRef {
    pub fn new(id: Snowflake, username: impl Into<String>) -> Self {
        Self { id, username: username.into(), bot: false }
    }

    pub fn bot(id: Snowflake, username: impl Into<String>) -> Self {
        Self { id, username: username.into(), bot: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Thread,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    /// Parent text channel, for threads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Snowflake>,
}

impl ChannelRef {
    pub fn text(id: Snowflake, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), kind: ChannelKind::Text, parent: None }
    }

    pub fn voice(id: Snowflake, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), kind: ChannelKind::Voice, parent: None }
    }

    pub fn thread(id: Snowflake, name: impl Into<String>, parent: Snowflake) -> Self {
        Self { id, name: name.into(), kind: ChannelKind::Thread, parent: Some(parent) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: Snowflake,
    pub name: String,
}

/// Guild-scoped view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: UserRef,
    /// Voice channel the member is currently connected to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_channel: Option<Snowflake>,
}

/// A message as stored by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub author: UserRef,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The bot's own user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user: UserRef,
}

/// Administrator permission bit set requested by the invite link.
const INVITE_PERMISSIONS: u64 = 8;

impl BotIdentity {
    pub fn new(user: UserRef) -> Self {
        Self { user }
    }

    pub fn id(&self) -> Snowflake {
        self.user.id
    }

    /// OAuth2 URL that adds the bot (and its slash commands) to a server.
    pub fn invite_link(&self) -> String {
        format!(
            "https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
            self.user.id, INVITE_PERMISSIONS
        )
    }
}

// ── Inbound events ────────────────────────────────────────────────────────────

/// One option node of an inbound command interaction. Sub-commands carry
/// their own options in `options`; value options carry `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InteractionOptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<InteractionOption>,
}

impl InteractionOption {
    pub fn sub_command(name: impl Into<String>, options: Vec<InteractionOption>) -> Self {
        Self {
            name: name.into(),
            kind: InteractionOptionType::SubCommand,
            value: None,
            options,
        }
    }

    pub fn value(
        name: impl Into<String>,
        kind: InteractionOptionType,
        value: serde_json::Value,
    ) -> Self {
        Self { name: name.into(), kind, value: Some(value), options: Vec::new() }
    }
}

/// A slash-command interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    #[serde(default)]
    pub guild_id: Option<TenantId>,
    pub channel_id: Snowflake,
    pub user: UserRef,
    #[serde(default)]
    pub member: Option<Member>,
    /// Top-level command (namespace) name.
    pub command: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
}

/// A button press on a message component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonEvent {
    #[serde(default)]
    pub guild_id: Option<TenantId>,
    pub channel_id: Snowflake,
    /// Message the button is attached to.
    #[serde(default)]
    pub message_id: Option<Snowflake>,
    pub user: UserRef,
    /// Opaque id chosen by the handler that created the button.
    pub custom_id: String,
}

/// An ordinary (non-command) message posted in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub guild_id: Option<TenantId>,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    /// Absent for webhook and system messages.
    #[serde(default)]
    pub author: Option<UserRef>,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ── Contexts ──────────────────────────────────────────────────────────────────

/// First argument of every command method.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub tenant: TenantId,
    pub caller: UserRef,
    pub bot: Arc<BotIdentity>,
    pub event: Arc<CommandEvent>,
}

impl CommandContext {
    pub fn channel_id(&self) -> Snowflake {
        self.event.channel_id
    }
}

/// Sole argument of every button listener.
#[derive(Debug, Clone)]
pub struct ButtonContext {
    pub tenant: TenantId,
    pub caller: UserRef,
    pub bot: Arc<BotIdentity>,
    pub event: Arc<ButtonEvent>,
}

impl ButtonContext {
    pub fn custom_id(&self) -> &str {
        &self.event.custom_id
    }
}

/// Argument of a module's message subscriber.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub tenant: TenantId,
    pub author: UserRef,
    pub bot: Arc<BotIdentity>,
    pub event: Arc<MessageEvent>,
}

impl MessageContext {
    /// `true` when the bot itself wrote the message.
    pub fn is_from_bot(&self) -> bool {
        self.author.id == self.bot.id()
    }
}
