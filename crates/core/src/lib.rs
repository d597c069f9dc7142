//! Shared building blocks for the parley bot runtime: layered configuration,
//! the application error taxonomy and process-wide logging setup.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::ApplicationError;
pub use logging::{init_logging, lossy_text};
