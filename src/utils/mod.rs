//! # Utility Modules
//!
//! Supporting utilities for compression, logging and metrics.
//!
//! ## Components
//! - **Compression**: Incremental deflate/gzip for world streaming
//! - **Logging**: `tracing-subscriber` setup from configuration
//! - **Metrics**: Thread-safe observability counters

pub mod compression;
pub mod logging;
pub mod metrics;

pub use compression::{CompressionKind, Compressor};
pub use metrics::Metrics;
