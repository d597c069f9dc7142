//! Process-wide log sink.
//!
//! The subscriber is installed once per process by [`init_logging`]. Tests install
//! their own subscriber with `tracing::subscriber::with_default` instead.

use std::borrow::Cow;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber. Returns `false` when one was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.trim().to_ascii_lowercase()));

    // stdout carries command output.
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.is_ok()
}

/// Decodes arbitrary bytes for log output, replacing invalid UTF-8 sequences.
pub fn lossy_text(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}
