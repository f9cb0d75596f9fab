//! Bootstrap layer — modules that run before the router starts.
//!
//! - **logger** — tracing-subscriber initialisation.

pub mod logger;
