//! `/m` — music commands over a per-guild [`TrackQueue`].
//!
//! `/m q` posts a queue panel with playback buttons (prefix `PLAYPAUSE-`).
//! Only the latest panel is kept: posting a new one deletes the old. While
//! the module instance lives, a background task re-renders that panel every
//! `music.refresh_interval_ms`.

pub mod queue;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::config::MusicConfig;
use crate::router::model::{ButtonContext, CommandContext, Snowflake, TenantId};
use crate::router::module::{
    ButtonDecl, Capabilities, CommandDecl, HandlerModule, Namespace, Param,
};
use crate::router::reply::{
    self, Button, ButtonStyle, Embed, EmbedField, HandlerError, OutboundMessage, Reply,
};

use queue::{Track, TrackQueue};

pub const BUTTON_PREFIX: &str = "PLAYPAUSE-";

const PINK: u32 = 0xE9_1E_63;
const MOON_YELLOW: u32 = 0xF1_C4_0F;

/// Panel buttons; the id is `PLAYPAUSE-<NAME>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    PlayPause,
    Restart,
    Skip,
    Clear,
    Kill,
}

impl Control {
    const ALL: [Control; 5] = [Self::PlayPause, Self::Restart, Self::Skip, Self::Clear, Self::Kill];

    fn name(self) -> &'static str {
        match self {
            Self::PlayPause => "PLAY_PAUSE",
            Self::Restart => "RESTART",
            Self::Skip => "SKIP",
            Self::Clear => "CLEAR",
            Self::Kill => "KILL",
        }
    }

    pub fn custom_id(self) -> String {
        format!("{BUTTON_PREFIX}{}", self.name())
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        let name = id.strip_prefix(BUTTON_PREFIX)?;
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Panel {
    channel: Snowflake,
    message: Snowflake,
}

struct State {
    queue: TrackQueue,
    voice: Option<Snowflake>,
    panel: Option<Panel>,
}

/// State shared with the refresh task.
struct Shared {
    tenant: TenantId,
    client: Arc<dyn ClientHandle>,
    state: Mutex<State>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn panel_message(&self) -> OutboundMessage {
        render_panel(&self.state().queue)
    }

    /// Re-render the live panel. Returns whether one was updated.
    async fn refresh_panel(&self) -> bool {
        let panel = self.state().panel;
        let Some(panel) = panel else {
            return false;
        };
        let message = self.panel_message();
        match self.client.edit_message(panel.channel, panel.message, message).await {
            Ok(()) => true,
            Err(e) => {
                debug!(tenant = %self.tenant, error = %e, "queue panel refresh failed");
                false
            }
        }
    }
}

pub struct MusicModule {
    shared: Arc<Shared>,
    sources: Vec<String>,
    _refresher: Option<DropGuard>,
}

impl MusicModule {
    /// The refresh task is only started when called inside a Tokio runtime.
    pub fn new(tenant: TenantId, client: Arc<dyn ClientHandle>, config: &MusicConfig) -> Self {
        let shared = Arc::new(Shared {
            tenant,
            client,
            state: Mutex::new(State {
                queue: TrackQueue::new(config.default_volume),
                voice: None,
                panel: None,
            }),
        });
        let refresher = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let token = CancellationToken::new();
            let period = Duration::from_millis(config.refresh_interval_ms.max(1));
            handle.spawn(refresh_loop(shared.clone(), period, token.clone()));
            token.drop_guard()
        });
        Self { shared, sources: config.sources.clone(), _refresher: refresher }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state()
    }

    async fn show_queue(&self, ctx: CommandContext) -> Result<Reply, HandlerError> {
        let channel = ctx.channel_id();
        let previous = self.state().panel.take();
        if let Some(prev) = previous {
            // Already gone is fine.
            let _ = self.shared.client.delete_messages(prev.channel, &[prev.message]).await;
        }
        let message = self.shared.client.send_message(channel, self.shared.panel_message()).await?;
        self.state().panel = Some(Panel { channel, message });
        Ok(Reply::ephemeral("Showing queue"))
    }

    fn play(&self, video: Option<String>) -> Reply {
        let mut state = self.state();
        if state.voice.is_none() {
            return Reply::ephemeral("Bot needs to be summoned in to a voice channel");
        }
        let Some(track) = video.as_deref().and_then(Track::from_query) else {
            return Reply::Message(notice("No song found"));
        };
        info!(tenant = %self.shared.tenant, source = %track.source, "track queued");
        state.queue.enqueue(track);
        Reply::Message(notice("Queued 1 tracks"))
    }

    fn volume(&self, volume: Option<i64>) -> Reply {
        let mut state = self.state();
        let Some(volume) = volume else {
            return Reply::ephemeral(format!("Volume set to {}", state.queue.volume()));
        };
        match u8::try_from(volume) {
            Ok(v) if v <= 100 => {
                state.queue.set_volume(v);
                Reply::ephemeral(format!("Volume set to {v}"))
            }
            _ => Reply::ephemeral(format!("Volume {volume} is not in range of [0-100]")),
        }
    }

    async fn summon(&self, ctx: CommandContext) -> Result<Reply, HandlerError> {
        let Some(channel) = ctx.event.member.as_ref().and_then(|m| m.voice_channel) else {
            return Ok(Reply::ephemeral("You must be in a voice channel to summon the bot!"));
        };
        self.shared.client.join_voice(self.shared.tenant, channel).await?;
        self.state().voice = Some(channel);
        info!(tenant = %self.shared.tenant, %channel, "joined voice channel");
        Ok(Reply::ephemeral("Connected!"))
    }

    /// Stop playback and leave voice. Returns whether the bot was connected.
    async fn disconnect_voice(&self) -> Result<bool, HandlerError> {
        let was_connected = {
            let mut state = self.state();
            state.queue.reset();
            state.voice.take().is_some()
        };
        if was_connected {
            self.shared.client.leave_voice(self.shared.tenant).await?;
        }
        Ok(was_connected)
    }

    async fn disconnect(&self) -> Result<Reply, HandlerError> {
        info!(tenant = %self.shared.tenant, "disconnecting from voice");
        Ok(if self.disconnect_voice().await? {
            Reply::ephemeral("Bye!")
        } else {
            Reply::ephemeral("Cannot disconnect a disconnected bot...")
        })
    }

    fn help(&self) -> Reply {
        let sources: Vec<_> = self.sources.iter().map(|s| format!("-- `{s}`")).collect();
        Reply::ephemeral(format!("Supported audio sources are:\n{}", sources.join("\n")))
    }

    async fn on_control(&self, ctx: ButtonContext) -> Result<Reply, HandlerError> {
        let Some(control) = Control::from_custom_id(ctx.custom_id()) else {
            return Ok(Reply::Ack);
        };
        debug!(tenant = %self.shared.tenant, ?control, "queue panel control");
        match control {
            Control::Kill => {
                self.disconnect_voice().await?;
            }
            other => {
                let mut state = self.state();
                let connected = state.voice.is_some();
                match other {
                    Control::PlayPause => state.queue.toggle_pause(),
                    Control::Restart if connected => {
                        if let Some(track) = state.queue.restart() {
                            info!(tenant = %self.shared.tenant, source = %track.source, "track restarted");
                        }
                    }
                    Control::Skip if connected => {
                        state.queue.skip();
                    }
                    Control::Clear => state.queue.clear(),
                    _ => {}
                }
            }
        }
        Ok(Reply::Update(self.shared.panel_message()))
    }
}

fn notice(text: &str) -> OutboundMessage {
    OutboundMessage::default().with_embed(Embed {
        description: text.to_string(),
        color: MOON_YELLOW,
        ..Default::default()
    })
}

fn render_panel(queue: &TrackQueue) -> OutboundMessage {
    let playing = queue.is_playing();
    let embed = Embed {
        title: if queue.is_paused() { "Paused ..." } else { "Now Playing:" }.to_string(),
        description: queue.now_playing(),
        fields: vec![EmbedField { name: "Up Next:".into(), value: queue.up_next_text() }],
        color: PINK,
    };
    let (emoji, label) = if queue.is_paused() { ("\u{25B6}", "Resume") } else { ("\u{23F8}", "Pause") };
    let buttons = vec![
        Button::new(Control::PlayPause.custom_id(), label).emoji(emoji).disabled(!playing),
        Button::new(Control::Restart.custom_id(), "Restart").emoji("\u{1F502}").disabled(!playing),
        Button::new(Control::Skip.custom_id(), "Skip").emoji("\u{23ED}").disabled(!playing),
        Button::new(Control::Clear.custom_id(), "Clear Queue")
            .emoji("\u{2755}")
            .style(ButtonStyle::Danger)
            .disabled(queue.is_empty()),
        Button::new(Control::Kill.custom_id(), "Disconnect")
            .emoji("\u{2620}")
            .style(ButtonStyle::Danger),
    ];
    OutboundMessage::default().with_embed(embed).with_buttons(buttons)
}

async fn refresh_loop(shared: Arc<Shared>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if shared.refresh_panel().await {
                    debug!(tenant = %shared.tenant, "refreshed queue panel");
                }
            }
        }
    }
    debug!(tenant = %shared.tenant, "queue panel refresh stopped");
}

impl HandlerModule for MusicModule {
    fn namespace(&self) -> Namespace {
        Namespace::new("m", "Music commands")
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let q = {
            let this = self.clone();
            CommandDecl::new("q", "Show the queue", move |ctx, _| {
                let this = this.clone();
                reply::once(async move { this.show_queue(ctx).await })
            })
            .param(Param::command_context())
        };
        let play = {
            let this = self.clone();
            CommandDecl::new("play", "Play a song", move |_, args| {
                reply::just(this.play(args.get::<String>(0)))
            })
            .param(Param::command_context())
            .param(Param::option::<String>("video", "Youtube video link or playlist"))
        };
        let volume = {
            let this = self.clone();
            CommandDecl::new(
                "volume",
                "Get volume of the bot. If supplied with an argument, set the volume [0-100]",
                move |_, args| reply::just(this.volume(args.get::<i64>(0))),
            )
            .param(Param::command_context())
            .param(Param::option::<i64>("volume", "Volume [0-100]").optional())
        };
        let summon = {
            let this = self.clone();
            CommandDecl::new("summon", "Summon the bot to join a voice channel", move |ctx, _| {
                let this = this.clone();
                reply::once(async move { this.summon(ctx).await })
            })
            .param(Param::command_context())
        };
        let disconnect = {
            let this = self.clone();
            CommandDecl::new("disconnect", "Disconnect the bot", move |_, _| {
                let this = this.clone();
                reply::once(async move { this.disconnect().await })
            })
            .param(Param::command_context())
        };
        let help = {
            let this = self.clone();
            CommandDecl::new("help", "Get supported protocols", move |_, _| {
                reply::just(this.help())
            })
            .param(Param::command_context())
        };
        let controls = ButtonDecl::new("on_control", BUTTON_PREFIX, move |ctx| {
            let this = self.clone();
            reply::once(async move { this.on_control(ctx).await })
        })
        .param(Param::button_context());

        Capabilities::new()
            .command(q)
            .command(play)
            .command(volume)
            .command(summon)
            .command(disconnect)
            .command(help)
            .button(controls)
    }
}
