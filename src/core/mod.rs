//! Core functionality: configuration and errors.

pub mod config;
pub mod error;

pub use config::{AccountConfig, AppConfig, GatewayConfig, ServerConfig};
pub use error::{AppError, Result};
