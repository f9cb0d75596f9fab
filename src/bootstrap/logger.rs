//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved.
//! Output goes to stderr; stdout belongs to the console gateway.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use crate::error::AppError;

/// HTTP stack targets capped at `warn` unless the filter names them.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Initialise the global tracing subscriber.
///
/// `level` is a bare level (`"info"`, `"debug"`…) or a full `EnvFilter`
/// directive such as `"toastbot::router=trace,info"`. When `prefer_level` is
/// set (a `-v` flag was given) it wins over `RUST_LOG`; otherwise `RUST_LOG`
/// wins and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let env = std::env::var("RUST_LOG").ok().filter(|s| !s.trim().is_empty());
    let directives = match (&env, prefer_level) {
        (Some(env), false) => env.as_str(),
        _ => level,
    };
    let filter = match build_filter(directives) {
        Ok(filter) => filter,
        // A bad RUST_LOG falls back to the configured level.
        Err(e) if directives != level => {
            eprintln!("warning: ignoring RUST_LOG: {e}");
            build_filter(level)?
        }
        Err(e) => return Err(e),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Parse `directives` and cap the HTTP stack's targets unless they are
/// named explicitly.
pub fn build_filter(directives: &str) -> Result<EnvFilter, AppError> {
    if directives.trim().is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    let mut filter = EnvFilter::try_new(directives)
        .map_err(|e| AppError::Logger(format!("invalid log level '{directives}': {e}")))?;
    for target in QUIET_TARGETS {
        if directives.contains(target) {
            continue;
        }
        let directive: Directive = format!("{target}=warn")
            .parse()
            .map_err(|e| AppError::Logger(format!("bad built-in directive for {target}: {e}")))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}
