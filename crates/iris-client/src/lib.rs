//! Iris Client - Cloud API access layer
//!
//! This crate owns every interaction with the provider's HTTP API:
//! - [`endpoints`]: logical operation → versioned path template resolution
//! - [`transport`]: the resilient HTTP client behind a mockable trait
//! - [`dispatcher`]: the outbound dispatch core (validate → send → persist)
//! - [`media`]: the chunked media upload pipeline
//! - [`analytics`]: the template analytics ingestion job

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod dispatcher;
pub mod endpoints;
pub mod media;
pub mod transport;

pub use analytics::{AnalyticsIngestor, IngestReport};
pub use dispatcher::Dispatcher;
pub use endpoints::Endpoint;
pub use media::MediaUploader;
pub use transport::{HttpMethod, HttpTransport, Transport};
