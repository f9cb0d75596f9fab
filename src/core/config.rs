//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given with `-f`), then applies the `TOASTBOT_LOG_LEVEL` override.
//! Secrets (`DISCORD_TOKEN`, `LLM_API_KEY`) are only ever read from the
//! environment, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::router::model::{Snowflake, UserRef};

/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Console gateway configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Whether the JSON-lines console gateway is started.
    pub enabled: bool,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub console: ConsoleConfig,
}

/// Which handler modules are registered at bootstrap, by namespace name.
#[derive(Debug, Clone)]
pub struct ModulesConfig {
    pub enabled: Vec<String>,
}

impl ModulesConfig {
    pub fn is_enabled(&self, namespace: &str) -> bool {
        self.enabled.iter().any(|n| n == namespace)
    }
}

/// Music module configuration (`[music]`).
#[derive(Debug, Clone)]
pub struct MusicConfig {
    /// How often the last queue panel is re-rendered, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Initial playback volume `[0-100]`.
    pub default_volume: u8,
    /// Audio source names reported by `/m help`.
    pub sources: Vec<String>,
}

/// OpenAI / OpenAI-compatible completion endpoint (`[chat.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Chat module configuration (`[chat]`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Fully-resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    /// The bot's own user, as reported to handlers.
    pub bot_user: UserRef,
    /// Guilds joined when the gateway starts.
    pub guilds: Vec<Snowflake>,
    pub gateway: GatewayConfig,
    pub modules: ModulesConfig,
    pub music: MusicConfig,
    pub chat: ChatConfig,
    /// Platform token from `DISCORD_TOKEN` — never sourced from TOML.
    pub discord_token: Option<String>,
    /// Completion API key from `LLM_API_KEY` — `None` for keyless endpoints.
    pub llm_api_key: Option<String>,
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    gateway: RawGateway,
    #[serde(default)]
    modules: RawModules,
    #[serde(default)]
    music: RawMusic,
    #[serde(default)]
    chat: RawChat,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    identity: RawIdentity,
    #[serde(default)]
    guilds: Vec<Snowflake>,
}

#[derive(Deserialize)]
struct RawIdentity {
    #[serde(default = "default_bot_id")]
    id: Snowflake,
    #[serde(default)]
    username: Option<String>,
}

impl Default for RawIdentity {
    fn default() -> Self {
        Self { id: default_bot_id(), username: None }
    }
}

#[derive(Deserialize, Default)]
struct RawGateway {
    #[serde(default)]
    console: RawConsole,
}

#[derive(Deserialize)]
struct RawConsole {
    /// Defaults to `true`: the console is the only bundled gateway.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawConsole {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawModules {
    #[serde(default = "default_modules")]
    enabled: Vec<String>,
}

impl Default for RawModules {
    fn default() -> Self {
        Self { enabled: default_modules() }
    }
}

#[derive(Deserialize)]
struct RawMusic {
    #[serde(default = "default_refresh_interval_ms")]
    refresh_interval_ms: u64,
    #[serde(default = "default_volume")]
    default_volume: u8,
    #[serde(default = "default_sources")]
    sources: Vec<String>,
}

impl Default for RawMusic {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            default_volume: default_volume(),
            sources: default_sources(),
        }
    }
}

#[derive(Deserialize)]
struct RawChat {
    /// Maps to `default = "..."` in `[chat]`.
    #[serde(rename = "default", default = "default_chat_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawChat {
    fn default() -> Self {
        Self { provider: default_chat_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_bot_id() -> Snowflake { Snowflake::new(1) }
fn default_modules() -> Vec<String> { vec!["util".into(), "m".into(), "chat".into()] }
fn default_refresh_interval_ms() -> u64 { 5000 }
fn default_volume() -> u8 { 40 }
fn default_sources() -> Vec<String> {
    ["youtube", "soundcloud", "bandcamp", "vimeo", "twitch", "http"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_chat_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_timeout_seconds() -> u64 { 60 }

fn default_true() -> bool {
    true
}

/// Load config from `path` (or [`DEFAULT_CONFIG_PATH`]), then apply env-var
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("TOASTBOT_LOG_LEVEL").ok();
    let path = expand_home(path.unwrap_or(DEFAULT_CONFIG_PATH));
    let mut config = load_from(&path, log_level_override.as_deref())?;
    config.discord_token = env::var("DISCORD_TOKEN").ok();
    config.llm_api_key = env::var("LLM_API_KEY").ok();
    Ok(config)
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, log_level_override)
        .map_err(|e| AppError::Config(format!("{} in {}", e, path.display())))
}

fn parse(raw: &str, log_level_override: Option<&str>) -> Result<Config, String> {
    let parsed: RawConfig = toml::from_str(raw).map_err(|e| format!("parse error: {e}"))?;

    let b = parsed.bot;
    if parsed.music.default_volume > 100 {
        return Err(format!(
            "music.default_volume {} is not in range of [0-100]",
            parsed.music.default_volume
        ));
    }

    let username = b.identity.username.unwrap_or_else(|| b.name.clone());

    Ok(Config {
        log_level: log_level_override.unwrap_or(&b.log_level).to_string(),
        bot_user: UserRef::bot(b.identity.id, username),
        bot_name: b.name,
        guilds: b.guilds,
        gateway: GatewayConfig {
            console: ConsoleConfig { enabled: parsed.gateway.console.enabled },
        },
        modules: ModulesConfig { enabled: parsed.modules.enabled },
        music: MusicConfig {
            refresh_interval_ms: parsed.music.refresh_interval_ms,
            default_volume: parsed.music.default_volume,
            sources: parsed.music.sources,
        },
        chat: ChatConfig {
            provider: parsed.chat.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.chat.openai.api_base_url,
                model: parsed.chat.openai.model,
                temperature: parsed.chat.openai.temperature,
                timeout_seconds: parsed.chat.openai.timeout_seconds,
            },
        },
        discord_token: None,
        llm_api_key: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Safe `Config` for tests — dummy completion provider, no tokens,
    /// no guilds joined at start.
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            bot_user: UserRef::bot(Snowflake::new(1), "test-bot"),
            guilds: Vec::new(),
            gateway: GatewayConfig { console: ConsoleConfig { enabled: false } },
            modules: ModulesConfig { enabled: default_modules() },
            music: MusicConfig {
                refresh_interval_ms: 60_000,
                default_volume: default_volume(),
                sources: default_sources(),
            },
            chat: ChatConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            discord_token: None,
            llm_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[bot]
name = "test-bot"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.bot_user.username, "test-bot");
        assert!(cfg.bot_user.bot);
        assert!(cfg.gateway.console.enabled);
        assert!(cfg.modules.is_enabled("m"));
        assert_eq!(cfg.music.default_volume, 40);
        assert_eq!(cfg.chat.provider, "dummy");
        assert!(cfg.discord_token.is_none());
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(
            r#"
[bot]
name = "toast"
log_level = "debug"
guilds = ["100", 200]

[bot.identity]
id = "42"
username = "Toaster"

[gateway.console]
enabled = false

[modules]
enabled = ["util"]

[music]
refresh_interval_ms = 1000
default_volume = 75
sources = ["http"]

[chat]
default = "openai"

[chat.openai]
model = "gpt-4o"
"#,
        );
        let cfg = load_from(f.path(), None).unwrap();
        assert_eq!(cfg.guilds, vec![Snowflake::new(100), Snowflake::new(200)]);
        assert_eq!(cfg.bot_user.id, Snowflake::new(42));
        assert_eq!(cfg.bot_user.username, "Toaster");
        assert!(!cfg.gateway.console.enabled);
        assert!(cfg.modules.is_enabled("util"));
        assert!(!cfg.modules.is_enabled("chat"));
        assert_eq!(cfg.music.refresh_interval_ms, 1000);
        assert_eq!(cfg.music.sources, vec!["http".to_string()]);
        assert_eq!(cfg.chat.provider, "openai");
        assert_eq!(cfg.chat.openai.model, "gpt-4o");
        assert_eq!(cfg.chat.openai.timeout_seconds, 60);
    }

    #[test]
    fn volume_out_of_range_errors() {
        let f = write_toml(
            r#"
[bot]
name = "toast"

[music]
default_volume = 150
"#,
        );
        let msg = load_from(f.path(), None).unwrap_err().to_string();
        assert!(msg.contains("[0-100]"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn missing_bot_section_errors() {
        let f = write_toml("[music]\ndefault_volume = 10\n");
        assert!(load_from(f.path(), None).is_err());
    }

    #[test]
    fn log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("trace")).unwrap();
        assert_eq!(cfg.log_level, "trace");
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        assert!(expand_home("~/.toastbot").starts_with(&home));
    }
}
