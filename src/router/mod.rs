//! Multi-tenant command router.
//!
//! - **model** — ids, entities, inbound events, handler contexts.
//! - **options** — Option Type Registry and argument marshaling values.
//! - **module** — handler module trait, capability table, module registry.
//! - **schema** — Schema Builder, wire schema and bindings.
//! - **command** / **button** — per-event dispatchers.
//! - **partition** — one tenant's atomically swapped bindings.
//! - **reply** — reply types and user-visible strings.
//! - **error** — build and refresh errors.
//!
//! [`Router`] owns the tenant → partition map and is the only entry point the
//! gateway talks to.

pub mod button;
pub mod command;
pub mod error;
pub mod model;
pub mod module;
pub mod options;
pub mod partition;
pub mod reply;
pub mod schema;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::client::ClientHandle;

use error::RefreshError;
use model::{BotIdentity, ButtonEvent, CommandEvent, MessageEvent, TenantId};
use module::ModuleRegistry;
use options::OptionTypeRegistry;
use partition::Partition;
use reply::{OUTSIDE_GUILD, Reply, ReplyStream, SOMETHING_WENT_WRONG, TRULY_WRONG};

pub struct Router {
    bot: Arc<BotIdentity>,
    client: Arc<dyn ClientHandle>,
    modules: Arc<ModuleRegistry>,
    options: Arc<OptionTypeRegistry>,
    partitions: RwLock<HashMap<TenantId, Arc<Partition>>>,
}

impl Router {
    pub fn new(
        bot: BotIdentity,
        client: Arc<dyn ClientHandle>,
        modules: ModuleRegistry,
        options: OptionTypeRegistry,
    ) -> Self {
        Self {
            bot: Arc::new(bot),
            client,
            modules: Arc::new(modules),
            options: Arc::new(options),
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TenantId, Arc<Partition>>> {
        self.partitions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TenantId, Arc<Partition>>> {
        self.partitions.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn partition(&self, tenant: TenantId) -> Option<Arc<Partition>> {
        self.read().get(&tenant).cloned()
    }

    /// Known tenants, ascending.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<_> = self.read().keys().copied().collect();
        tenants.sort();
        tenants
    }

    /// Create the tenant's partition (if new) and refresh it. A partition
    /// whose first refresh fails stays registered, uninitialized.
    pub async fn join(&self, tenant: TenantId) -> Result<Arc<Partition>, RefreshError> {
        let partition = self
            .write()
            .entry(tenant)
            .or_insert_with(|| {
                info!(%tenant, "partition created");
                Arc::new(Partition::new(
                    tenant,
                    self.bot.clone(),
                    self.client.clone(),
                    self.modules.clone(),
                    self.options.clone(),
                ))
            })
            .clone();
        partition.refresh().await?;
        Ok(partition)
    }

    /// Drop the tenant's partition. Returns `false` if it was unknown.
    pub fn leave(&self, tenant: TenantId) -> bool {
        let removed = self.write().remove(&tenant).is_some();
        if removed {
            info!(%tenant, "partition dropped");
        }
        removed
    }

    pub async fn refresh(&self, tenant: TenantId) -> Result<(), RefreshError> {
        let partition = self.partition(tenant).ok_or(RefreshError::UnknownTenant(tenant))?;
        partition.refresh().await
    }

    pub fn route_command(&self, event: CommandEvent) -> ReplyStream {
        info!(
            caller = %event.user.username,
            guild = ?event.guild_id,
            command = %event.command,
            "interaction event received"
        );
        let Some(tenant) = event.guild_id else {
            return reply::single(Reply::ephemeral(OUTSIDE_GUILD));
        };
        match self.partition(tenant) {
            Some(partition) => partition.dispatch_command(event),
            None => {
                warn!(%tenant, "command for unknown partition");
                reply::single(Reply::ephemeral(SOMETHING_WENT_WRONG))
            }
        }
    }

    pub fn route_button(&self, event: ButtonEvent) -> ReplyStream {
        info!(
            caller = %event.user.username,
            guild = ?event.guild_id,
            custom_id = %event.custom_id,
            "button event received"
        );
        let Some(tenant) = event.guild_id else {
            return reply::single(Reply::ephemeral(OUTSIDE_GUILD));
        };
        match self.partition(tenant) {
            Some(partition) => partition.dispatch_button(event),
            None => {
                warn!(%tenant, "button for unknown partition");
                reply::single(Reply::ephemeral(SOMETHING_WENT_WRONG))
            }
        }
    }

    pub fn route_message(&self, event: MessageEvent) -> ReplyStream {
        let Some(tenant) = event.guild_id else {
            return stream::empty().boxed();
        };
        match self.partition(tenant) {
            Some(partition) => partition.dispatch_message(event),
            None => {
                warn!(%tenant, "message for unknown partition");
                reply::single(Reply::text(TRULY_WRONG))
            }
        }
    }
}
