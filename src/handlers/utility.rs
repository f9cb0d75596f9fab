//! `/util` — housekeeping commands.

use std::sync::Arc;

use tracing::info;

use crate::client::ClientHandle;
use crate::router::model::{CommandContext, TenantId};
use crate::router::module::{Capabilities, CommandDecl, HandlerModule, Namespace, Param};
use crate::router::reply::{self, HandlerError, Reply};

/// Messages scanned by `clear` when `n` is not given.
const DEFAULT_SCAN: i64 = 100;
/// Upper bound on messages removed by one `clear`.
const MAX_DELETE: usize = 100;

pub struct UtilityModule {
    tenant: TenantId,
    client: Arc<dyn ClientHandle>,
}

impl UtilityModule {
    pub fn new(tenant: TenantId, client: Arc<dyn ClientHandle>) -> Self {
        Self { tenant, client }
    }

    /// Delete the bot's own messages among the last `n` in the channel.
    async fn clear(&self, ctx: CommandContext, n: Option<i64>) -> Result<Reply, HandlerError> {
        let scan = usize::try_from(n.unwrap_or(DEFAULT_SCAN)).unwrap_or(0);
        let channel = ctx.channel_id();
        let recent = self.client.recent_messages(channel, scan).await?;
        let ids: Vec<_> = recent
            .iter()
            .filter(|m| m.author.id == ctx.bot.id())
            .take(MAX_DELETE)
            .map(|m| m.id)
            .collect();
        let deleted = if ids.is_empty() {
            0
        } else {
            self.client.delete_messages(channel, &ids).await?
        };
        info!(tenant = %self.tenant, %channel, scanned = recent.len(), deleted, "cleared bot messages");
        Ok(Reply::ephemeral(deleted_text(deleted)))
    }

    fn config(&self, ctx: &CommandContext) -> Reply {
        Reply::ephemeral(format!(
            "Namespace: {}\nServer Invite Link: {}",
            self.tenant,
            ctx.bot.invite_link()
        ))
    }
}

fn deleted_text(n: usize) -> String {
    match n {
        0 => "No messages deleted".to_string(),
        1 => "1 message deleted".to_string(),
        n => format!("{n} messages deleted"),
    }
}

impl HandlerModule for UtilityModule {
    fn namespace(&self) -> Namespace {
        Namespace::new("util", "Utility commands")
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let this = self.clone();
        let clear = CommandDecl::new("clear", "Clear all messages from the bot", move |ctx, args| {
            let this = this.clone();
            reply::once(async move { this.clear(ctx, args.get::<i64>(0)).await })
        })
        .param(Param::command_context())
        .param(Param::option::<i64>("n", "Num messages").optional());

        let config = CommandDecl::new("config", "Configuration", move |ctx, _| {
            reply::just(self.config(&ctx))
        })
        .param(Param::command_context());

        Capabilities::new().command(clear).command(config)
    }
}
