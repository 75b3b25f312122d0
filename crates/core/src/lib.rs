//! chatBOCS Core Library
//!
//! This crate provides the foundational utilities shared by every chatBOCS crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, ConfigOverrides};
pub use error::{AppError, AppResult};
pub use logging::LogFormat;
