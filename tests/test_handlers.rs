//! The bundled modules driven end to end through the router.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;

use toastbot::client::memory::InMemoryClient;
use toastbot::config::Config;
use toastbot::handlers;
use toastbot::llm::LlmProvider;
use toastbot::llm::providers::dummy::DummyProvider;
use toastbot::router::Router;
use toastbot::router::model::{
    BotIdentity, ButtonEvent, ChannelRef, CommandEvent, InteractionOption, Member, MessageEvent,
    Snowflake, UserRef,
};
use toastbot::router::options::{InteractionOptionType, OptionTypeRegistry};
use toastbot::router::reply::Reply;

const GUILD: Snowflake = Snowflake::new(10);
const CHANNEL: Snowflake = Snowflake::new(20);
const THREAD: Snowflake = Snowflake::new(21);
const VOICE: Snowflake = Snowflake::new(50);

fn alice() -> UserRef {
    UserRef::new(Snowflake::new(30), "alice")
}

fn bot_user() -> UserRef {
    UserRef::bot(Snowflake::new(1), "toastbot")
}

async fn bot() -> (Router, Arc<InMemoryClient>) {
    let config = Config::test_default();
    let modules = handlers::registry(&config, LlmProvider::Dummy(DummyProvider));
    let client = Arc::new(InMemoryClient::as_user(bot_user()));
    let router = Router::new(
        BotIdentity::new(bot_user()),
        client.clone(),
        modules,
        OptionTypeRegistry::standard(),
    );
    router.join(GUILD).await.expect("bundled modules build");
    (router, client)
}

fn command(namespace: &str, sub: &str, options: Vec<InteractionOption>) -> CommandEvent {
    CommandEvent {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        user: alice(),
        member: Some(Member { user: alice(), voice_channel: Some(VOICE) }),
        command: namespace.into(),
        options: vec![InteractionOption::sub_command(sub, options)],
    }
}

fn press(custom_id: &str) -> ButtonEvent {
    ButtonEvent {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        message_id: None,
        user: alice(),
        custom_id: custom_id.into(),
    }
}

async fn run(router: &Router, event: CommandEvent) -> Vec<Reply> {
    router.route_command(event).collect().await
}

fn string(name: &str, v: &str) -> InteractionOption {
    InteractionOption::value(name, InteractionOptionType::String, json!(v))
}

#[tokio::test]
async fn test_bundled_schema() {
    let (_router, client) = bot().await;
    let schema = client.registered(GUILD).unwrap();
    let names: Vec<_> = schema.iter().map(|ns| ns.name.as_str()).collect();
    assert_eq!(names, ["util", "m", "chat"]);
    let music: Vec<_> = schema[1].subcommands.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(music, ["q", "play", "volume", "summon", "disconnect", "help"]);
}

#[tokio::test]
async fn test_util_config_and_clear() {
    let (router, client) = bot().await;

    let out = run(&router, command("util", "config", vec![])).await;
    let text = out[0].content().unwrap();
    assert!(text.starts_with("Namespace: 10\nServer Invite Link: "));
    assert!(text.contains("client_id=1"));

    client.push_message(CHANNEL, bot_user(), "one");
    client.push_message(CHANNEL, alice(), "mine");
    client.push_message(CHANNEL, bot_user(), "two");
    let out = run(&router, command("util", "clear", vec![])).await;
    assert_eq!(out[0].content(), Some("2 messages deleted"));
    let left: Vec<_> = client.messages(CHANNEL).into_iter().map(|m| m.content).collect();
    assert_eq!(left, ["mine"]);

    let out = run(&router, command("util", "clear", vec![])).await;
    assert_eq!(out[0].content(), Some("No messages deleted"));
}

#[tokio::test]
async fn test_music_session() {
    let (router, client) = bot().await;

    let out = run(&router, command("m", "play", vec![string("video", "lofi beats")])).await;
    assert_eq!(out[0].content(), Some("Bot needs to be summoned in to a voice channel"));

    let out = run(&router, command("m", "summon", vec![])).await;
    assert_eq!(out[0].content(), Some("Connected!"));
    assert_eq!(client.voice_channel(GUILD), Some(VOICE));

    for song in ["lofi beats", "https://example.com/track.mp3"] {
        let out = run(&router, command("m", "play", vec![string("video", song)])).await;
        let Reply::Message(msg) = &out[0] else { panic!("expected a message") };
        assert_eq!(msg.embed.as_ref().unwrap().description, "Queued 1 tracks");
    }

    let out = run(&router, command("m", "q", vec![])).await;
    assert_eq!(out[0].content(), Some("Showing queue"));
    assert_eq!(client.messages(CHANNEL).len(), 1);

    let out: Vec<_> = router.route_button(press("PLAYPAUSE-SKIP")).collect().await;
    let Reply::Update(panel) = &out[0] else { panic!("expected a panel update") };
    let embed = panel.embed.as_ref().unwrap();
    assert_eq!(embed.description, "`https://example.com/track.mp3`");
    assert_eq!(embed.fields[0].value, "There are no songs left in the queue");

    let out: Vec<_> = router.route_button(press("PLAYPAUSE-PLAY_PAUSE")).collect().await;
    let Reply::Update(panel) = &out[0] else { panic!("expected a panel update") };
    assert_eq!(panel.embed.as_ref().unwrap().title, "Paused ...");

    let out = run(&router, command("m", "disconnect", vec![])).await;
    assert_eq!(out[0].content(), Some("Bye!"));
    assert_eq!(client.voice_channel(GUILD), None);
    let out = run(&router, command("m", "disconnect", vec![])).await;
    assert_eq!(out[0].content(), Some("Cannot disconnect a disconnected bot..."));
}

#[tokio::test]
async fn test_music_volume_and_help() {
    let (router, _) = bot().await;
    let volume = |v: i64| InteractionOption::value("volume", InteractionOptionType::Integer, json!(v));

    let out = run(&router, command("m", "volume", vec![])).await;
    assert_eq!(out[0].content(), Some("Volume set to 40"));
    let out = run(&router, command("m", "volume", vec![volume(120)])).await;
    assert_eq!(out[0].content(), Some("Volume 120 is not in range of [0-100]"));

    let out = run(&router, command("m", "help", vec![])).await;
    let text = out[0].content().unwrap();
    assert!(text.starts_with("Supported audio sources are:\n-- `youtube`"));
}

#[tokio::test]
async fn test_chat_threads_continue_conversations() {
    let (router, client) = bot().await;
    client.add_channel(ChannelRef::text(CHANNEL, "general"));
    client.add_channel(ChannelRef::thread(THREAD, "question", CHANNEL));

    let out = run(&router, command("chat", "summon", vec![string("token", "sk-test")])).await;
    assert_eq!(out[0].content(), Some("Monitoring this channel for threads"));

    let say = |client: &InMemoryClient, text: &str| {
        let id = client.push_message(THREAD, alice(), text);
        MessageEvent {
            guild_id: Some(GUILD),
            channel_id: THREAD,
            message_id: id,
            author: Some(alice()),
            content: text.into(),
            timestamp: chrono::Utc::now(),
        }
    };

    let out: Vec<_> = router.route_message(say(&client, "hello")).collect().await;
    assert!(out.is_empty());
    let answers: Vec<_> = client.messages(THREAD).into_iter().filter(|m| m.author.bot).collect();
    assert_eq!(answers.len(), 1);
    assert!(answers[0].content.starts_with("||("));
    assert!(answers[0].content.ends_with(")||\n[echo] hello"));

    let _: Vec<_> = router.route_message(say(&client, "again")).collect().await;
    let answers: Vec<_> = client.messages(THREAD).into_iter().filter(|m| m.author.bot).collect();
    assert_eq!(answers.len(), 2);
    assert!(answers[1].content.ends_with(")||\n[echo] again (2 earlier turns)"), "{}", answers[1].content);
    let conversation = |s: &str| s[3..39].to_string();
    assert_eq!(conversation(&answers[0].content), conversation(&answers[1].content));
}

#[tokio::test]
async fn test_chat_ignores_unmonitored_channels() {
    let (router, client) = bot().await;
    client.add_channel(ChannelRef::text(CHANNEL, "general"));

    let event = MessageEvent {
        guild_id: Some(GUILD),
        channel_id: CHANNEL,
        message_id: client.push_message(CHANNEL, alice(), "hi"),
        author: Some(alice()),
        content: "hi".into(),
        timestamp: chrono::Utc::now(),
    };
    let out: Vec<_> = router.route_message(event).collect().await;
    assert!(out.is_empty());
    assert_eq!(client.messages(CHANNEL).len(), 1);
}

#[tokio::test]
async fn test_module_state_is_per_guild() {
    let (router, client) = bot().await;
    let other = Snowflake::new(11);
    router.join(other).await.unwrap();
    let elsewhere = |mut event: CommandEvent| {
        event.guild_id = Some(other);
        event
    };

    run(&router, command("m", "summon", vec![])).await;
    let out = run(&router, command("m", "play", vec![string("video", "lofi beats")])).await;
    assert!(matches!(&out[0], Reply::Message(_)));

    let out = run(&router, elsewhere(command("m", "play", vec![string("video", "lofi beats")]))).await;
    assert_eq!(out[0].content(), Some("Bot needs to be summoned in to a voice channel"));
    assert_eq!(client.voice_channel(other), None);

    client.add_channel(ChannelRef::text(CHANNEL, "general"));
    client.add_channel(ChannelRef::thread(THREAD, "question", CHANNEL));
    let out = run(&router, command("chat", "summon", vec![string("token", "sk-test")])).await;
    assert_eq!(out[0].content(), Some("Monitoring this channel for threads"));

    let id = client.push_message(THREAD, alice(), "hello");
    let mut event = MessageEvent {
        guild_id: Some(other),
        channel_id: THREAD,
        message_id: id,
        author: Some(alice()),
        content: "hello".into(),
        timestamp: chrono::Utc::now(),
    };
    let _: Vec<_> = router.route_message(event.clone()).collect().await;
    assert_eq!(client.messages(THREAD).len(), 1, "the other guild's chat module is not monitoring");

    event.guild_id = Some(GUILD);
    let _: Vec<_> = router.route_message(event).collect().await;
    assert_eq!(client.messages(THREAD).len(), 2);
}
