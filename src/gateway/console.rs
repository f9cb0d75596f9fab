//! Console gateway — platform events as JSON lines on stdin, replies as JSON
//! lines on stdout.
//!
//! ```text
//! {"type":"guild_create","guild_id":"10"}
//! {"type":"command","guild_id":"10","channel_id":"20","user":{"id":"30","username":"alice"},
//!  "command":"util","options":[{"name":"config","type":1}]}
//! ```
//!
//! Every event is numbered from 1; each reply it produces is printed as
//! `{"event":<n>,"reply":…}`. Guild create/delete are applied before the
//! next line is read. Routed events are dispatched in input order but their
//! replies are drained concurrently, one task per event, so output lines of
//! different events may interleave. Malformed lines are logged and skipped.
//! Runs until EOF (after in-flight replies are written) or until the shutdown
//! token is cancelled.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::router::Router;
use crate::router::model::{ButtonEvent, CommandEvent, MessageEvent, TenantId};
use crate::router::reply::{Reply, ReplyStream};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    GuildCreate { guild_id: TenantId },
    GuildDelete { guild_id: TenantId },
    Command(CommandEvent),
    Button(ButtonEvent),
    Message(MessageEvent),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output<'a> {
    Reply { event: u64, reply: &'a Reply },
    Status { event: u64, guild_id: TenantId, status: &'static str },
}

pub struct ConsoleGateway {
    router: Arc<Router>,
}

impl ConsoleGateway {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// Serve stdin/stdout until EOF or `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        let stdin = BufReader::new(tokio::io::stdin());
        run_console(self.router, stdin, tokio::io::stdout(), shutdown).await
    }
}

/// Read events from `input` and write replies to `output` until EOF or
/// cancellation. Cancellation aborts replies still in flight.
pub async fn run_console<R, W>(
    router: Arc<Router>,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    info!("console gateway started");
    let mut lines = input.lines();
    let mut seq: u64 = 0;
    let (tx, mut replies) = mpsc::unbounded_channel::<(u64, Reply)>();
    // Dropped at EOF so `replies` closes once the last drain task finishes.
    let mut tx = Some(tx);
    let mut drains = JoinSet::new();

    loop {
        if tx.is_none() && drains.is_empty() {
            while let Ok((event, reply)) = replies.try_recv() {
                write_line(&mut output, &Output::Reply { event, reply: &reply }).await?;
            }
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(in_flight = drains.len(), "console gateway shutting down");
                break;
            }
            Some((event, reply)) = replies.recv() => {
                write_line(&mut output, &Output::Reply { event, reply: &reply }).await?;
            }
            Some(joined) = drains.join_next() => {
                if let Err(e) = joined {
                    warn!(error = %e, "reply task failed");
                }
            }
            line = lines.next_line(), if tx.is_some() => {
                let Some(line) = line? else {
                    info!(in_flight = drains.len(), "console stdin closed");
                    tx = None;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<ConsoleEvent>(line) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "skipping malformed console line");
                        continue;
                    }
                };
                seq += 1;
                debug!(event = seq, "console event");

                let stream = match apply(&router, event).await {
                    Applied::Status(guild_id, status) => {
                        write_line(&mut output, &Output::Status { event: seq, guild_id, status }).await?;
                        continue;
                    }
                    Applied::Routed(stream) => stream,
                };
                if let Some(tx) = &tx {
                    drains.spawn(drain(seq, stream, tx.clone()));
                }
            }
        }
    }

    output.flush().await?;
    Ok(())
}

async fn write_line<W>(output: &mut W, out: &Output<'_>) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin + Send,
{
    let rendered = serde_json::to_string(out)
        .map_err(|e| AppError::Gateway(format!("failed to render reply: {e}")))?;
    output.write_all(rendered.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

async fn drain(event: u64, mut stream: ReplyStream, tx: mpsc::UnboundedSender<(u64, Reply)>) {
    while let Some(reply) = stream.next().await {
        if tx.send((event, reply)).is_err() {
            debug!(event, "console writer gone; dropping replies");
            return;
        }
    }
}

enum Applied {
    Status(TenantId, &'static str),
    Routed(ReplyStream),
}

async fn apply(router: &Router, event: ConsoleEvent) -> Applied {
    match event {
        ConsoleEvent::GuildCreate { guild_id } => match router.join(guild_id).await {
            Ok(_) => Applied::Status(guild_id, "joined"),
            Err(e) => {
                warn!(tenant = %guild_id, error = %e, "partition refresh failed");
                Applied::Status(guild_id, "refresh_failed")
            }
        },
        ConsoleEvent::GuildDelete { guild_id } => {
            let status = if router.leave(guild_id) { "left" } else { "unknown" };
            Applied::Status(guild_id, status)
        }
        ConsoleEvent::Command(e) => Applied::Routed(router.route_command(e)),
        ConsoleEvent::Button(e) => Applied::Routed(router.route_button(e)),
        ConsoleEvent::Message(e) => Applied::Routed(router.route_message(e)),
    }
}
