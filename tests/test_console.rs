//! Console gateway over in-memory stdio.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use toastbot::client::memory::InMemoryClient;
use toastbot::config::Config;
use toastbot::gateway::console::run_console;
use toastbot::handlers;
use toastbot::llm::LlmProvider;
use toastbot::llm::providers::dummy::DummyProvider;
use toastbot::router::Router;
use toastbot::router::model::{BotIdentity, Snowflake, UserRef};
use toastbot::router::module::{
    Capabilities, CommandDecl, HandlerModule, ModuleRegistry, ModuleSpec, Namespace, Param,
};
use toastbot::router::options::OptionTypeRegistry;
use toastbot::router::reply::{self, Reply};

fn router_with(modules: ModuleRegistry) -> Arc<Router> {
    let bot = UserRef::bot(Snowflake::new(1), "toastbot");
    Arc::new(Router::new(
        BotIdentity::new(bot.clone()),
        Arc::new(InMemoryClient::as_user(bot)),
        modules,
        OptionTypeRegistry::standard(),
    ))
}

fn router() -> Arc<Router> {
    let config = Config::test_default();
    router_with(handlers::registry(&config, LlmProvider::Dummy(DummyProvider)))
}

/// `/s wait` never finishes in test time; `/s fast` answers at once.
struct Sleepy;

impl HandlerModule for Sleepy {
    fn namespace(&self) -> Namespace {
        Namespace::new("s", "Sleeps")
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let wait = CommandDecl::new("wait", "Wait an hour", |_, _| {
            reply::once(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Reply::text("slow"))
            })
        })
        .param(Param::command_context());
        let fast = CommandDecl::new("fast", "Answer now", |_, _| reply::just(Reply::text("fast")))
            .param(Param::command_context());
        Capabilities::new().command(wait).command(fast)
    }
}

fn for_event(out: &[Value], event: u64) -> Vec<&Value> {
    out.iter().filter(|v| v["event"] == event).collect()
}

async fn session(input: &str) -> Vec<Value> {
    let mut output = Vec::new();
    run_console(router(), input.as_bytes(), &mut output, CancellationToken::new())
        .await
        .unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn test_console_session() {
    let input = r#"
{"type":"guild_create","guild_id":"10"}
not json at all
{"type":"command","guild_id":"10","channel_id":"20","user":{"id":"30","username":"alice"},"command":"m","options":[{"name":"volume","type":1}]}
{"type":"command","channel_id":"20","user":{"id":"30","username":"alice"},"command":"m","options":[]}
{"type":"guild_delete","guild_id":"10"}
{"type":"guild_delete","guild_id":"10"}
"#;
    let out = session(input).await;
    assert_eq!(out.len(), 5);

    assert_eq!(out[0]["event"], 1);
    assert_eq!(out[0]["status"], "joined");

    let volume = for_event(&out, 2);
    assert_eq!(volume.len(), 1);
    assert_eq!(volume[0]["reply"]["kind"], "message");
    assert_eq!(volume[0]["reply"]["message"]["content"], "Volume set to 40");

    assert_eq!(
        for_event(&out, 3)[0]["reply"]["message"]["content"],
        "Commands to this bot must be sent from inside a server"
    );

    assert_eq!(for_event(&out, 4)[0]["status"], "left");
    assert_eq!(for_event(&out, 5)[0]["status"], "unknown");
}

#[tokio::test]
async fn test_slow_guild_does_not_hold_back_others() {
    let router = router_with(ModuleRegistry::new().with(ModuleSpec::of(|_, _| Sleepy)));
    let (mut feed, input) = tokio::io::duplex(4096);
    let (output, printed) = tokio::io::duplex(4096);
    let shutdown = CancellationToken::new();
    let console = tokio::spawn(run_console(router, BufReader::new(input), output, shutdown.clone()));

    let user = r#""user":{"id":"30","username":"alice"}"#;
    let lines = format!(
        "{{\"type\":\"guild_create\",\"guild_id\":\"10\"}}\n\
         {{\"type\":\"guild_create\",\"guild_id\":\"11\"}}\n\
         {{\"type\":\"command\",\"guild_id\":\"10\",\"channel_id\":\"20\",{user},\"command\":\"s\",\"options\":[{{\"name\":\"wait\",\"type\":1}}]}}\n\
         {{\"type\":\"command\",\"guild_id\":\"11\",\"channel_id\":\"21\",{user},\"command\":\"s\",\"options\":[{{\"name\":\"fast\",\"type\":1}}]}}\n"
    );
    feed.write_all(lines.as_bytes()).await.unwrap();

    let mut printed = BufReader::new(printed).lines();
    let fast = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let line = printed.next_line().await.unwrap().expect("console still writing");
            let v: Value = serde_json::from_str(&line).unwrap();
            if v["reply"]["message"]["content"] == "fast" {
                return v;
            }
            assert_ne!(v["reply"]["message"]["content"], "slow");
        }
    })
    .await
    .expect("guild 11 answered while guild 10 was still waiting");
    assert_eq!(fast["event"], 4);

    shutdown.cancel();
    console.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_console_stops_when_cancelled() {
    let (_writer, reader) = tokio::io::duplex(64);
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut output = Vec::new();
    run_console(router(), tokio::io::BufReader::new(reader), &mut output, shutdown)
        .await
        .unwrap();
    assert!(output.is_empty());
}
