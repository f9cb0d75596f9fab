//! Handler modules bundled with the bot.
//!
//! - **utility** — `/util`: message cleanup and invite link.
//! - **music** — `/m`: track queue with a button panel.
//! - **chat** — `/chat`: threaded completion conversations.
//!
//! Each is compiled in by its `module-*` feature and registered at runtime
//! when its namespace is listed in `[modules] enabled`.

#[cfg(feature = "module-chat")]
pub mod chat;
#[cfg(feature = "module-music")]
pub mod music;
#[cfg(feature = "module-util")]
pub mod utility;

use tracing::debug;

use crate::config::Config;
use crate::llm::LlmProvider;
use crate::router::module::ModuleRegistry;

/// Modules in registration order: `util`, `m`, `chat`.
#[allow(unused_variables, unused_mut)]
pub fn registry(config: &Config, provider: LlmProvider) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();

    #[cfg(feature = "module-util")]
    if config.modules.is_enabled("util") {
        use crate::router::module::ModuleSpec;
        registry.register(ModuleSpec::of(utility::UtilityModule::new));
    }

    #[cfg(feature = "module-music")]
    if config.modules.is_enabled("m") {
        use crate::router::module::ModuleSpec;
        let music = config.music.clone();
        registry.register(ModuleSpec::of(move |tenant, client| {
            music::MusicModule::new(tenant, client, &music)
        }));
    }

    #[cfg(feature = "module-chat")]
    if config.modules.is_enabled("chat") {
        use crate::router::module::ModuleSpec;
        registry.register(ModuleSpec::of(move |tenant, client| {
            chat::ChatModule::new(tenant, client, provider.clone())
        }));
    }

    debug!(modules = registry.len(), "handler modules registered");
    registry
}
