//! iris - WhatsApp Cloud API messaging gateway.
//!
//! Binary glue over the workspace crates: the axum webhook server, the
//! webhook processor that turns provider callbacks into persisted records
//! and bus events, and the CLI entry points.

#![forbid(unsafe_code)]

pub mod api;
pub mod processor;
pub mod server;
