//! In-memory [`ClientHandle`] — an entity directory, a message log per
//! channel, the last schema registered per tenant and per-tenant voice state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{ClientError, ClientHandle};
use crate::router::model::{ChannelRef, RoleRef, Snowflake, StoredMessage, TenantId, UserRef};
use crate::router::reply::OutboundMessage;
use crate::router::schema::CommandSchema;

/// First id handed out for posted messages; keeps generated ids clear of the
/// small ids tests and configs use for entities.
const FIRST_MESSAGE_ID: u64 = 1_000_000;

#[derive(Default)]
struct State {
    users: HashMap<Snowflake, UserRef>,
    channels: HashMap<Snowflake, ChannelRef>,
    roles: HashMap<Snowflake, RoleRef>,
    /// Oldest first.
    messages: HashMap<Snowflake, Vec<StoredMessage>>,
    edits: HashMap<Snowflake, OutboundMessage>,
    registered: HashMap<TenantId, CommandSchema>,
    voice: HashMap<TenantId, Snowflake>,
    registration_failure: Option<String>,
}

pub struct InMemoryClient {
    author: UserRef,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl InMemoryClient {
    /// A client posting as a default bot user (id 1).
    pub fn new() -> Self {
        Self::as_user(UserRef::bot(Snowflake::new(1), "toastbot"))
    }

    /// A client posting messages as `author`.
    pub fn as_user(author: UserRef) -> Self {
        Self {
            author,
            next_id: AtomicU64::new(FIRST_MESSAGE_ID),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a panicking test thread; the maps stay usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_user(&self, user: UserRef) {
        self.state().users.insert(user.id, user);
    }

    pub fn add_channel(&self, channel: ChannelRef) {
        self.state().channels.insert(channel.id, channel);
    }

    pub fn add_role(&self, role: RoleRef) {
        self.state().roles.insert(role.id, role);
    }

    /// Append a message written by someone else (seeding history).
    pub fn push_message(&self, channel: Snowflake, author: UserRef, content: impl Into<String>) -> Snowflake {
        let id = Snowflake::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state().messages.entry(channel).or_default().push(StoredMessage {
            id,
            channel_id: channel,
            author,
            content: content.into(),
            timestamp: Utc::now(),
        });
        id
    }

    /// Make every subsequent `register_commands` fail (`Some`) or succeed (`None`).
    pub fn set_registration_failure(&self, reason: Option<String>) {
        self.state().registration_failure = reason;
    }

    pub fn registered(&self, tenant: TenantId) -> Option<CommandSchema> {
        self.state().registered.get(&tenant).cloned()
    }

    /// Messages in `channel`, oldest first.
    pub fn messages(&self, channel: Snowflake) -> Vec<StoredMessage> {
        self.state().messages.get(&channel).cloned().unwrap_or_default()
    }

    /// Latest edit applied to a message, if any.
    pub fn last_edit(&self, message_id: Snowflake) -> Option<OutboundMessage> {
        self.state().edits.get(&message_id).cloned()
    }

    pub fn voice_channel(&self, tenant: TenantId) -> Option<Snowflake> {
        self.state().voice.get(&tenant).copied()
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientHandle for InMemoryClient {
    async fn register_commands(
        &self,
        tenant: TenantId,
        schema: &CommandSchema,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        if let Some(reason) = &state.registration_failure {
            return Err(ClientError::Rejected(reason.clone()));
        }
        debug!(%tenant, namespaces = schema.len(), "commands registered");
        state.registered.insert(tenant, schema.clone());
        Ok(())
    }

    async fn resolve_user(&self, _tenant: TenantId, id: Snowflake) -> Result<UserRef, ClientError> {
        self.state()
            .users
            .get(&id)
            .cloned()
            .ok_or(ClientError::NotFound { kind: "user", id })
    }

    async fn resolve_channel(
        &self,
        _tenant: TenantId,
        id: Snowflake,
    ) -> Result<ChannelRef, ClientError> {
        self.state()
            .channels
            .get(&id)
            .cloned()
            .ok_or(ClientError::NotFound { kind: "channel", id })
    }

    async fn resolve_role(&self, _tenant: TenantId, id: Snowflake) -> Result<RoleRef, ClientError> {
        self.state()
            .roles
            .get(&id)
            .cloned()
            .ok_or(ClientError::NotFound { kind: "role", id })
    }

    async fn send_message(
        &self,
        channel: Snowflake,
        message: OutboundMessage,
    ) -> Result<Snowflake, ClientError> {
        let author = self.author.clone();
        let id = self.push_message(channel, author, message.content.clone());
        info!(%channel, message = %id, content = %message.content, "message posted");
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: Snowflake,
        message_id: Snowflake,
        message: OutboundMessage,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        let stored = state
            .messages
            .get_mut(&channel)
            .and_then(|log| log.iter_mut().find(|m| m.id == message_id))
            .ok_or(ClientError::NotFound { kind: "message", id: message_id })?;
        stored.content = message.content.clone();
        state.edits.insert(message_id, message);
        Ok(())
    }

    async fn delete_messages(
        &self,
        channel: Snowflake,
        ids: &[Snowflake],
    ) -> Result<usize, ClientError> {
        let mut state = self.state();
        let Some(log) = state.messages.get_mut(&channel) else {
            return Ok(0);
        };
        let before = log.len();
        log.retain(|m| !ids.contains(&m.id));
        Ok(before - log.len())
    }

    async fn recent_messages(
        &self,
        channel: Snowflake,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ClientError> {
        Ok(self
            .state()
            .messages
            .get(&channel)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn join_voice(&self, tenant: TenantId, channel: Snowflake) -> Result<(), ClientError> {
        self.state().voice.insert(tenant, channel);
        Ok(())
    }

    async fn leave_voice(&self, tenant: TenantId) -> Result<(), ClientError> {
        self.state().voice.remove(&tenant);
        Ok(())
    }
}
