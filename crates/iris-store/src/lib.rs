//! SQLite persistence for the iris gateway.
//!
//! [`SqliteStore`] implements both repository traits from `iris-core`:
//! message records (outbound dispatch log, inbound webhook log) and the
//! template analytics tables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod analytics;
mod messages;
mod store;

pub use store::SqliteStore;
