//! HTTP layer: wire models, the upstream dispatcher and the Claude-facing
//! handlers.

pub mod chat_models;
pub mod claude_models;
pub mod messages;
pub mod upstream;

use crate::core::AppConfig;
use upstream::UpstreamClient;

/// Shared application state.
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: AppConfig, upstream: UpstreamClient) -> Self {
        Self { config, upstream }
    }
}
