//! Tenant Partition — one per guild. Owns that guild's handler instances and
//! dispatch tables and swaps them as a unit on every successful refresh.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ClientHandle;

use super::command::guarded;
use super::error::RefreshError;
use super::model::{
    BotIdentity, ButtonContext, ButtonEvent, CommandContext, CommandEvent, MessageContext,
    MessageEvent, TenantId,
};
use super::module::ModuleRegistry;
use super::options::OptionTypeRegistry;
use super::reply::{self, NOT_READY, Reply, ReplyStream};
use super::schema::{Bindings, CommandSchema, SchemaBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Uninitialized,
    Ready,
}

pub struct Partition {
    tenant: TenantId,
    bot: Arc<BotIdentity>,
    client: Arc<dyn ClientHandle>,
    modules: Arc<ModuleRegistry>,
    options: Arc<OptionTypeRegistry>,
    active: ArcSwapOption<Bindings>,
    refresh_lock: Mutex<()>,
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("tenant", &self.tenant)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Partition {
    pub fn new(
        tenant: TenantId,
        bot: Arc<BotIdentity>,
        client: Arc<dyn ClientHandle>,
        modules: Arc<ModuleRegistry>,
        options: Arc<OptionTypeRegistry>,
    ) -> Self {
        Self {
            tenant,
            bot,
            client,
            modules,
            options,
            active: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn state(&self) -> PartitionState {
        if self.active.load().is_some() {
            PartitionState::Ready
        } else {
            PartitionState::Uninitialized
        }
    }

    /// The currently published schema, if any.
    pub fn schema(&self) -> Option<CommandSchema> {
        self.active.load().as_ref().map(|b| b.schema.clone())
    }

    /// Rebuild every handler instance and binding, register the new schema
    /// with the platform, then publish it. On any failure the previous
    /// bindings stay active.
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let _guard = self.refresh_lock.lock().await;
        let tenant = self.tenant;

        let bindings = SchemaBuilder::new(&self.options).build(&self.modules, tenant, &self.client)?;
        self.client.register_commands(tenant, &bindings.schema).await?;
        for ns in &bindings.schema {
            info!(%tenant, namespace = %ns.name, subcommands = ns.subcommands.len(), "registered command namespace");
        }
        debug!(
            %tenant,
            buttons = bindings.buttons.len(),
            subscribers = bindings.subscribers.len(),
            "bindings published"
        );
        self.active.store(Some(Arc::new(bindings)));
        Ok(())
    }

    pub fn dispatch_command(&self, event: CommandEvent) -> ReplyStream {
        let Some(bindings) = self.active.load_full() else {
            return reply::single(Reply::ephemeral(NOT_READY));
        };
        let Some(dispatcher) = bindings.commands.get(&event.command) else {
            return reply::single(Reply::ephemeral(reply::unknown_command(&event.command)));
        };
        let ctx = CommandContext {
            tenant: self.tenant,
            caller: event.user.clone(),
            bot: self.bot.clone(),
            event: Arc::new(event),
        };
        dispatcher.dispatch(ctx, self.client.clone())
    }

    pub fn dispatch_button(&self, event: ButtonEvent) -> ReplyStream {
        let Some(bindings) = self.active.load_full() else {
            return reply::single(Reply::ephemeral(NOT_READY));
        };
        let ctx = ButtonContext {
            tenant: self.tenant,
            caller: event.user.clone(),
            bot: self.bot.clone(),
            event: Arc::new(event),
        };
        bindings.buttons.dispatch(ctx)
    }

    /// Fan a message out to every subscribing module; their replies are
    /// merged as they arrive.
    pub fn dispatch_message(&self, event: MessageEvent) -> ReplyStream {
        let Some(bindings) = self.active.load_full() else {
            warn!(tenant = %self.tenant, "message before partition was ready");
            return stream::empty().boxed();
        };
        let Some(author) = event.author.clone() else {
            debug!(tenant = %self.tenant, message = %event.message_id, "message without author ignored");
            return stream::empty().boxed();
        };
        let ctx = MessageContext {
            tenant: self.tenant,
            author,
            bot: self.bot.clone(),
            event: Arc::new(event),
        };
        let streams: Vec<ReplyStream> = bindings
            .subscribers
            .iter()
            .map(|sub| {
                let ctx = ctx.clone();
                guarded(sub.module, || (sub.handler)(ctx))
            })
            .collect();
        stream::select_all(streams).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryClient;
    use crate::router::error::SchemaBuildError;
    use crate::router::model::{InteractionOption, Snowflake, UserRef};
    use crate::router::module::{
        Capabilities, CommandDecl, HandlerModule, ModuleSpec, Namespace, Param,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Counter {
        generation: usize,
    }

    impl HandlerModule for Counter {
        fn namespace(&self) -> Namespace {
            Namespace::new("c", "Counter")
        }

        fn capabilities(self: Arc<Self>) -> Capabilities {
            Capabilities::new()
                .command(
                    CommandDecl::new("gen", "Generation", move |_, _| {
                        reply::just(Reply::text(self.generation.to_string()))
                    })
                    .param(Param::command_context()),
                )
                .subscribe(|ctx| reply::just(Reply::text(format!("saw {}", ctx.event.content))))
        }
    }

    fn partition(client: Arc<InMemoryClient>) -> Partition {
        let modules = ModuleRegistry::new().with(ModuleSpec::of(|_, _| Counter {
            generation: BUILT.fetch_add(1, Ordering::SeqCst),
        }));
        Partition::new(
            Snowflake::new(7),
            Arc::new(BotIdentity::new(UserRef::bot(Snowflake::new(1), "bot"))),
            client,
            Arc::new(modules),
            Arc::new(OptionTypeRegistry::standard()),
        )
    }

    fn command(name: &str, sub: &str) -> CommandEvent {
        CommandEvent {
            guild_id: Some(Snowflake::new(7)),
            channel_id: Snowflake::new(3),
            user: UserRef::new(Snowflake::new(2), "alice"),
            member: None,
            command: name.into(),
            options: vec![InteractionOption::sub_command(sub, vec![])],
        }
    }

    #[tokio::test]
    async fn uninitialized_partition_refuses_politely() {
        let p = partition(Arc::new(InMemoryClient::new()));
        assert_eq!(p.state(), PartitionState::Uninitialized);
        let out: Vec<_> = p.dispatch_command(command("c", "gen")).collect().await;
        assert_eq!(out, vec![Reply::ephemeral(NOT_READY)]);
    }

    #[tokio::test]
    async fn refresh_registers_and_swaps() {
        let client = Arc::new(InMemoryClient::new());
        let p = partition(client.clone());
        p.refresh().await.unwrap();
        assert_eq!(p.state(), PartitionState::Ready);
        assert_eq!(client.registered(Snowflake::new(7)), p.schema());

        let first: Vec<_> = p.dispatch_command(command("c", "gen")).collect().await;
        p.refresh().await.unwrap();
        let second: Vec<_> = p.dispatch_command(command("c", "gen")).collect().await;
        assert_ne!(first, second, "refresh must rebuild handler instances");
    }

    #[tokio::test]
    async fn failed_registration_keeps_previous_bindings() {
        let client = Arc::new(InMemoryClient::new());
        let p = partition(client.clone());
        p.refresh().await.unwrap();
        let before: Vec<_> = p.dispatch_command(command("c", "gen")).collect().await;

        client.set_registration_failure(Some("down".into()));
        assert!(matches!(p.refresh().await, Err(RefreshError::Register(_))));
        let after: Vec<_> = p.dispatch_command(command("c", "gen")).collect().await;
        assert_eq!(before, after);
    }

    /// Declares a duplicate sub-command from its second build on.
    struct Flaky {
        build: usize,
    }

    impl HandlerModule for Flaky {
        fn namespace(&self) -> Namespace {
            Namespace::new("f", "Flaky")
        }

        fn capabilities(self: Arc<Self>) -> Capabilities {
            let build = self.build;
            let current = CommandDecl::new("gen", "Build", move |_, _| reply::just(Reply::text(build.to_string())))
                .param(Param::command_context());
            let caps = Capabilities::new().command(current);
            if build == 0 {
                return caps;
            }
            caps.command(
                CommandDecl::new("again", "Clash", |_, _| reply::empty())
                    .named("gen")
                    .param(Param::command_context()),
            )
        }
    }

    #[tokio::test]
    async fn invalid_rebuild_keeps_previous_bindings() {
        let client = Arc::new(InMemoryClient::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let modules = ModuleRegistry::new().with(ModuleSpec::of(move |_, _| Flaky {
            build: counter.fetch_add(1, Ordering::SeqCst),
        }));
        let p = Partition::new(
            Snowflake::new(7),
            Arc::new(BotIdentity::new(UserRef::bot(Snowflake::new(1), "bot"))),
            client.clone(),
            Arc::new(modules),
            Arc::new(OptionTypeRegistry::standard()),
        );
        p.refresh().await.unwrap();
        let schema = p.schema();

        let err = p.refresh().await.unwrap_err();
        assert!(matches!(err, RefreshError::Build(SchemaBuildError::DuplicateSubCommand { .. })), "{err}");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(p.state(), PartitionState::Ready);
        assert_eq!(p.schema(), schema);
        assert_eq!(client.registered(Snowflake::new(7)), schema);
        let out: Vec<_> = p.dispatch_command(command("f", "gen")).collect().await;
        assert_eq!(out, vec![Reply::text("0")]);
    }

    #[tokio::test]
    async fn debug_shows_tenant_and_state() {
        let p = partition(Arc::new(InMemoryClient::new()));
        let rendered = format!("{p:?}");
        assert!(rendered.contains("Partition") && rendered.contains("Uninitialized"), "{rendered}");
    }

    #[tokio::test]
    async fn unknown_namespace() {
        let p = partition(Arc::new(InMemoryClient::new()));
        p.refresh().await.unwrap();
        let out: Vec<_> = p.dispatch_command(command("nope", "x")).collect().await;
        assert_eq!(out, vec![Reply::ephemeral("Unknown command `/nope`")]);
    }

    #[tokio::test]
    async fn messages_reach_subscribers_unless_authorless() {
        let p = partition(Arc::new(InMemoryClient::new()));
        p.refresh().await.unwrap();
        let mut event = MessageEvent {
            guild_id: Some(Snowflake::new(7)),
            channel_id: Snowflake::new(3),
            message_id: Snowflake::new(50),
            author: Some(UserRef::new(Snowflake::new(2), "alice")),
            content: "hello".into(),
            timestamp: chrono::Utc::now(),
        };
        let out: Vec<_> = p.dispatch_message(event.clone()).collect().await;
        assert_eq!(out, vec![Reply::text("saw hello")]);

        event.author = None;
        let out: Vec<_> = p.dispatch_message(event).collect().await;
        assert!(out.is_empty());
    }
}
