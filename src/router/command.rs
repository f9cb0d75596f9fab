//! Command Dispatcher — one per namespace. Resolves the selected sub-command,
//! marshals its options into positional [`Args`], invokes the bound handler
//! and contains every failure as a user-visible reply.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use tracing::{error, warn};

use crate::client::ClientHandle;

use super::model::{CommandContext, InteractionOption};
use super::module::{CommandHandler, HandlerModule};
use super::options::{Args, InteractionOptionType, Resolver};
use super::reply::{self, HandlerStream, Reply, ReplyStream, SOMETHING_WENT_WRONG};
use super::schema::ArgumentSpec;

/// Sub-command name → callable unit (method + tenant-specific instance).
pub struct SubCommandBinding {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgumentSpec>,
    /// `Module::method`, for logs.
    pub method: String,
    pub handler: CommandHandler,
    pub instance: Arc<dyn HandlerModule>,
}

pub struct CommandDispatcher {
    namespace: String,
    subcommands: HashMap<String, Arc<SubCommandBinding>>,
}

impl CommandDispatcher {
    pub fn new(namespace: &str) -> Self {
        Self { namespace: namespace.to_string(), subcommands: HashMap::new() }
    }

    /// Insert `binding` unless its name is taken; a rejected binding is
    /// handed back.
    pub fn try_insert(&mut self, binding: SubCommandBinding) -> Option<SubCommandBinding> {
        if self.subcommands.contains_key(&binding.name) {
            return Some(binding);
        }
        self.subcommands.insert(binding.name.clone(), Arc::new(binding));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SubCommandBinding>> {
        self.subcommands.get(name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.subcommands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subcommands.is_empty()
    }

    /// Dispatch one command event. The returned stream always yields at
    /// least one reply.
    pub fn dispatch(&self, ctx: CommandContext, client: Arc<dyn ClientHandle>) -> ReplyStream {
        let Some(selected) = selected_sub_command(&ctx.event.options) else {
            return reply::single(Reply::ephemeral(reply::needs_sub_command(&self.namespace)));
        };
        let Some(binding) = self.subcommands.get(&selected.name).cloned() else {
            let name = format!("{} {}", self.namespace, selected.name);
            return reply::single(Reply::ephemeral(reply::unknown_command(&name)));
        };

        let raw = selected.options.clone();
        let resolver = Resolver { tenant: ctx.tenant, client };
        let work = async move {
            match AssertUnwindSafe(marshal(&binding, &raw, resolver)).catch_unwind().await {
                Ok(Ok(args)) => guarded(&binding.method, || (binding.handler)(ctx, args)),
                Ok(Err(refusal)) => reply::single(refusal),
                Err(payload) => {
                    error!(method = %binding.method, panic = %panic_message(payload.as_ref()), "option marshaling panicked");
                    reply::single(failure())
                }
            }
        };
        with_ack(stream::once(work).flatten().boxed())
    }
}

/// The single top-level option, if it is a sub-command selection.
fn selected_sub_command(options: &[InteractionOption]) -> Option<&InteractionOption> {
    match options {
        [only] if only.kind == InteractionOptionType::SubCommand => Some(only),
        _ => None,
    }
}

/// Build positional args in `ArgumentSpec` order. A missing required option
/// refuses the dispatch; a value that fails to resolve is passed as `None`.
async fn marshal(
    binding: &SubCommandBinding,
    raw: &[InteractionOption],
    resolver: Resolver,
) -> Result<Args, Reply> {
    let mut values = Vec::with_capacity(binding.args.len());
    for spec in &binding.args {
        let supplied = raw
            .iter()
            .find(|opt| opt.name == spec.name)
            .and_then(|opt| opt.value.clone());
        let Some(value) = supplied else {
            if spec.required {
                return Err(Reply::ephemeral(reply::missing_option(&spec.name)));
            }
            values.push(None);
            continue;
        };
        match spec.entry.extract(value, resolver.clone()).await {
            Ok(v) => values.push(Some(v)),
            Err(e) => {
                warn!(method = %binding.method, option = %spec.name, error = %e, "option did not resolve");
                values.push(None);
            }
        }
    }
    Ok(Args::new(values))
}

// ── Invocation ────────────────────────────────────────────────────────────────

pub(crate) fn failure() -> Reply {
    Reply::ephemeral(SOMETHING_WENT_WRONG)
}

/// Call a handler, containing a panic in the call itself and any error or
/// panic surfaced by the stream it returns.
pub(crate) fn guarded(method: &str, call: impl FnOnce() -> HandlerStream) -> ReplyStream {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(stream) => contain(method.to_string(), stream),
        Err(payload) => {
            error!(method, panic = %panic_message(payload.as_ref()), "handler panicked");
            reply::single(failure())
        }
    }
}

fn contain(method: String, stream: HandlerStream) -> ReplyStream {
    AssertUnwindSafe(stream)
        .catch_unwind()
        .map(move |item| match item {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(method = %method, error = %e, "handler failed");
                failure()
            }
            Err(payload) => {
                error!(method = %method, panic = %panic_message(payload.as_ref()), "handler panicked");
                failure()
            }
        })
        .boxed()
}

/// Append a lone `Ack` when `stream` finishes without yielding anything.
pub(crate) fn with_ack(stream: ReplyStream) -> ReplyStream {
    let produced = Arc::new(AtomicBool::new(false));
    let seen = produced.clone();
    let tail = stream::once(async move { (!produced.load(Ordering::Acquire)).then_some(Reply::Ack) })
        .filter_map(future::ready);
    stream
        .inspect(move |_| seen.store(true, Ordering::Release))
        .chain(tail)
        .boxed()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
