//! Toastbot — a multi-tenant chat bot built around a per-guild command and
//! interaction router.
//!
//! - **router** — schema building, per-tenant partitions and dispatch.
//! - **client** — platform client boundary (`ClientHandle`) and an in-memory
//!   implementation.
//! - **handlers** — the bundled `/util`, `/m` and `/chat` modules.
//! - **llm** — completion providers used by `/chat`.
//! - **gateway** — event sources feeding the router.

pub mod bootstrap;
pub mod client;
pub mod core;
pub mod gateway;
pub mod handlers;
pub mod llm;
pub mod router;

pub use bootstrap::logger;
pub use self::core::{config, error};
