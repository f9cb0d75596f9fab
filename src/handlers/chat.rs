//! `/chat` — threaded conversations with a completion provider.
//!
//! `/chat summon token:<bearer>` marks the current channel as monitored.
//! Every message posted in a thread under that channel is sent to the
//! provider and the answer is posted back into the thread, prefixed with a
//! spoilered `||(<conversation>,<message>)||` marker. The marker on the bot's
//! latest answer is how the next turn finds its place in the conversation,
//! and the thread's recent messages (answers with their markers stripped)
//! are sent along as the conversation so far.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ClientHandle;
use crate::llm::{Completion, CompletionRequest, LlmProvider, Turn};
use crate::router::model::{
    ChannelKind, CommandContext, MessageContext, Snowflake, StoredMessage, TenantId,
};
use crate::router::module::{Capabilities, CommandDecl, HandlerModule, Namespace, Param};
use crate::router::reply::{self, HandlerError, OutboundMessage, Reply};

/// Thread messages searched for a marker and replayed as history.
const HISTORY_DEPTH: usize = 10;

const FAILED_REPLY: &str = "Something went wrong...";

#[derive(Debug, Clone)]
struct Monitor {
    channel: Snowflake,
    token: String,
}

/// Where a thread's conversation continues from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// `None` starts a new conversation.
    pub conversation: Option<String>,
    pub parent: String,
}

impl ResumePoint {
    fn fresh() -> Self {
        Self { conversation: None, parent: Uuid::new_v4().to_string() }
    }
}

pub struct ChatModule {
    tenant: TenantId,
    client: Arc<dyn ClientHandle>,
    provider: LlmProvider,
    monitor: Mutex<Option<Monitor>>,
}

impl ChatModule {
    pub fn new(tenant: TenantId, client: Arc<dyn ClientHandle>, provider: LlmProvider) -> Self {
        Self { tenant, client, provider, monitor: Mutex::new(None) }
    }

    fn monitor(&self) -> MutexGuard<'_, Option<Monitor>> {
        self.monitor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn summon(&self, ctx: &CommandContext, token: Option<String>) -> Reply {
        let channel = ctx.channel_id();
        *self.monitor() = Some(Monitor { channel, token: token.unwrap_or_default() });
        info!(tenant = %self.tenant, %channel, "monitoring channel for chat threads");
        Reply::ephemeral("Monitoring this channel for threads")
    }

    async fn on_message(&self, ctx: MessageContext) -> Result<(), HandlerError> {
        if ctx.is_from_bot() {
            return Ok(());
        }
        let monitor = self.monitor().clone();
        let Some(monitor) = monitor else {
            return Ok(());
        };
        let thread = ctx.event.channel_id;
        let channel = match self.client.resolve_channel(self.tenant, thread).await {
            Ok(channel) => channel,
            Err(e) => {
                debug!(tenant = %self.tenant, %thread, error = %e, "message channel not resolvable");
                return Ok(());
            }
        };
        if channel.kind != ChannelKind::Thread || channel.parent != Some(monitor.channel) {
            return Ok(());
        }

        let recent = self.client.recent_messages(thread, HISTORY_DEPTH + 1).await?;
        let (resume, history) = thread_context(&recent, ctx.event.message_id, ctx.bot.id());
        let resume = match resume {
            Some(point) => {
                info!(tenant = %self.tenant, %thread, parent = %point.parent, "resuming conversation");
                point
            }
            None => ResumePoint::fresh(),
        };
        debug!(
            tenant = %self.tenant,
            %thread,
            conversation = ?resume.conversation,
            parent = %resume.parent,
            turns = history.len(),
            "asking provider"
        );
        let request = CompletionRequest {
            conversation_id: resume.conversation,
            parent_id: resume.parent,
            history,
            text: ctx.event.content.clone(),
            token: Some(monitor.token).filter(|t| !t.is_empty()),
        };
        let content = match self.provider.complete(request).await {
            Ok(completion) => format_answer(&completion),
            Err(e) => {
                warn!(tenant = %self.tenant, %thread, error = %e, "completion failed");
                FAILED_REPLY.to_string()
            }
        };
        self.client.send_message(thread, OutboundMessage::text(content)).await?;
        Ok(())
    }
}

/// Resume point and earlier turns from `recent` (newest first), skipping the
/// message being answered. The resume point is the latest marker on one of
/// the bot's answers. Turns come back oldest first; bot messages without a
/// marker and other bots' messages are left out.
pub fn thread_context(
    recent: &[StoredMessage],
    current: Snowflake,
    bot: Snowflake,
) -> (Option<ResumePoint>, Vec<Turn>) {
    let mut resume = None;
    let mut turns = Vec::new();
    for m in recent.iter().filter(|m| m.id != current).take(HISTORY_DEPTH) {
        if m.author.id == bot {
            if let Some((point, body)) = split_marker(&m.content) {
                resume.get_or_insert(point);
                turns.push(Turn::assistant(body));
            }
        } else if !m.author.bot {
            turns.push(Turn::user(m.content.clone()));
        }
    }
    turns.reverse();
    (resume, turns)
}

/// Parse a leading `||(<uuid>,<uuid>)||` marker.
pub fn parse_marker(content: &str) -> Option<ResumePoint> {
    split_marker(content).map(|(point, _)| point)
}

/// A leading marker and the answer text after it.
fn split_marker(content: &str) -> Option<(ResumePoint, &str)> {
    let rest = content.strip_prefix("||(")?;
    let (ids, body) = rest.split_once(")||")?;
    let (conversation, parent) = ids.split_once(',')?;
    let valid = |s: &str| Uuid::parse_str(s).is_ok() && s.len() == 36;
    if !valid(conversation) || !valid(parent) {
        return None;
    }
    let point = ResumePoint {
        conversation: Some(conversation.to_string()),
        parent: parent.to_string(),
    };
    Some((point, body.strip_prefix('\n').unwrap_or(body)))
}

fn format_answer(completion: &Completion) -> String {
    format!(
        "||({},{})||\n{}",
        completion.conversation_id, completion.message_id, completion.text
    )
}

impl HandlerModule for ChatModule {
    fn namespace(&self) -> Namespace {
        Namespace::new("chat", "ChatGPT configuration commands")
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let this = self.clone();
        let summon = CommandDecl::new("summon", "Setup bot to use this channel", move |ctx, args| {
            reply::just(this.summon(&ctx, args.get::<String>(0)))
        })
        .param(Param::command_context())
        .param(Param::option::<String>("token", "ChatGPT auth bearer token"));

        Capabilities::new().command(summon).subscribe(move |ctx| {
            let this = self.clone();
            // Answers go straight to the thread; only failures surface here.
            stream::once(async move { this.on_message(ctx).await })
                .filter_map(|r| async move { r.err().map(Err) })
                .boxed()
        })
    }
}
