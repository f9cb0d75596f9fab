//! Gateways — the process's event sources.
//!
//! - **console** — JSON-lines gateway over stdio.

#[cfg(feature = "gateway-console")]
pub mod console;
