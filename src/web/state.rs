use crate::config::AppConfig;
use crate::pipeline::registry::PipelineRegistry;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub registry: PipelineRegistry,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: PipelineRegistry) -> Self {
        Self {
            config,
            registry,
            startup_time: chrono::Utc::now(),
        }
    }
}
