//! Toastbot — process entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the completion provider and the module registry
//!   6. Build the router and join the configured guilds
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run gateway components until shutdown or EOF

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use toastbot::client::ClientHandle;
use toastbot::client::memory::InMemoryClient;
use toastbot::config::{self, Config};
use toastbot::error::AppError;
use toastbot::handlers;
use toastbot::llm::providers;
use toastbot::logger;
use toastbot::router::Router;
use toastbot::router::model::BotIdentity;
use toastbot::router::options::OptionTypeRegistry;

#[cfg(feature = "gateway-console")]
use toastbot::gateway::console::ConsoleGateway;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );
    if config.discord_token.is_none() {
        warn!("DISCORD_TOKEN not set; running against the in-memory client only");
    }

    let provider = providers::build(&config.chat, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let modules = handlers::registry(&config, provider);

    let bot = BotIdentity::new(config.bot_user.clone());
    let client: Arc<dyn ClientHandle> = Arc::new(InMemoryClient::as_user(config.bot_user.clone()));
    let router = Arc::new(Router::new(bot, client, modules, OptionTypeRegistry::standard()));

    for &guild in &config.guilds {
        if let Err(e) = router.join(guild).await {
            warn!(tenant = %guild, error = %e, "initial refresh failed");
        }
    }

    print_startup_summary(&config, &router);

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    if cfg!(feature = "gateway-console") && config.gateway.console.enabled {
        run_gateway(router.clone(), shutdown.clone()).await?;
    } else {
        warn!("no gateway enabled; waiting for ctrl-c");
        shutdown.cancelled().await;
    }

    // The console exits on EOF; make sure everything else stops too.
    shutdown.cancel();
    info!(tenants = router.tenants().len(), "shut down");
    Ok(())
}

#[cfg(feature = "gateway-console")]
async fn run_gateway(router: Arc<Router>, shutdown: CancellationToken) -> Result<(), AppError> {
    ConsoleGateway::new(router).run(shutdown).await
}

#[cfg(not(feature = "gateway-console"))]
async fn run_gateway(_router: Arc<Router>, _shutdown: CancellationToken) -> Result<(), AppError> {
    Ok(())
}

fn print_startup_summary(config: &Config, router: &Router) {
    let tenants = router.tenants();
    let guilds = if tenants.is_empty() {
        "none".to_string()
    } else {
        tenants.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    };
    let console = if config.gateway.console.enabled { "enabled" } else { "disabled" };

    // stdout belongs to the console gateway.
    eprintln!("── toastbot ─────────────────────────────────────────────");
    eprintln!("  bot:      {} ({})", config.bot_user.username, config.bot_user.id);
    eprintln!("  pid:      {}", std::process::id());
    eprintln!("  modules:  {}", config.modules.enabled.join(", "));
    eprintln!("  chat:     provider={}", config.chat.provider);
    eprintln!("  guilds:   {guilds}");
    eprintln!("  console:  {console}");
    eprintln!("  invite:   {}", router.bot().invite_link());
    eprintln!("─────────────────────────────────────────────────────────");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: toastbot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (routing, schema builds, refreshes)
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
