//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber according to
//! [`LoggingConfig`]. `RUST_LOG` overrides the configured level when set.
//! Chat lines are emitted on the `chat` target so they can be filtered
//! separately (`RUST_LOG=info,chat=off`).

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Target used for player chat lines.
pub const CHAT_TARGET: &str = "chat";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.to_string().to_lowercase())
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (config.log_to_file, &config.log_file_path) {
        (true, Some(path)) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ProtocolError::ConfigError(format!("Failed to open log file: {e}"))
                })?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if config.json_format {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        _ if config.json_format => builder.json().try_init(),
        _ => builder.try_init(),
    };

    installed.map_err(|e| {
        ProtocolError::ConfigError(format!("Failed to install log subscriber: {e}"))
    })?;
    tracing::info!(app = %config.app_name, "Logging initialized");
    Ok(())
}
