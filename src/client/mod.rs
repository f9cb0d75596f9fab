//! Platform boundary — everything the router and handler modules need from
//! the chat platform, behind one object-safe async trait.
//!
//! The network session is out of scope; [`memory::InMemoryClient`] is the
//! implementation used by the console gateway and the test suite.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::router::model::{ChannelRef, RoleRef, Snowflake, StoredMessage, TenantId, UserRef};
use crate::router::reply::OutboundMessage;
use crate::router::schema::CommandSchema;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Snowflake },

    #[error("platform rejected request: {0}")]
    Rejected(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ClientHandle: Send + Sync + 'static {
    /// Replace the tenant's registered slash commands with `schema`.
    async fn register_commands(&self, tenant: TenantId, schema: &CommandSchema)
        -> Result<(), ClientError>;

    async fn resolve_user(&self, tenant: TenantId, id: Snowflake) -> Result<UserRef, ClientError>;

    async fn resolve_channel(&self, tenant: TenantId, id: Snowflake)
        -> Result<ChannelRef, ClientError>;

    async fn resolve_role(&self, tenant: TenantId, id: Snowflake) -> Result<RoleRef, ClientError>;

    /// Post a message; returns the new message id.
    async fn send_message(&self, channel: Snowflake, message: OutboundMessage)
        -> Result<Snowflake, ClientError>;

    async fn edit_message(
        &self,
        channel: Snowflake,
        message_id: Snowflake,
        message: OutboundMessage,
    ) -> Result<(), ClientError>;

    /// Delete the given messages; returns how many were actually removed.
    async fn delete_messages(&self, channel: Snowflake, ids: &[Snowflake])
        -> Result<usize, ClientError>;

    /// Up to `limit` most recent messages, newest first.
    async fn recent_messages(&self, channel: Snowflake, limit: usize)
        -> Result<Vec<StoredMessage>, ClientError>;

    async fn join_voice(&self, tenant: TenantId, channel: Snowflake) -> Result<(), ClientError>;

    async fn leave_voice(&self, tenant: TenantId) -> Result<(), ClientError>;
}
