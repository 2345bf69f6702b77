use crate::config::{AppConfig, PipelineConfig};
use crate::db::PoolConnector;
use crate::llm::providers::remote::RemoteLlmProvider;
use crate::pipeline::{Pipeline, PipelineError, PipelineServices};
use crate::t2q::client::HttpTranslator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Every configured pipeline, in configuration order.
pub struct PipelineRegistry {
    pipelines: Vec<Arc<Pipeline>>,
}

impl PipelineRegistry {
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let translator = HttpTranslator::new(&config.translator)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let completer =
            RemoteLlmProvider::new(&config.llm).map_err(|e| PipelineError::Config(e.to_string()))?;

        let services = PipelineServices {
            translator: Arc::new(translator),
            completer: Arc::new(completer),
            connector: Arc::new(PoolConnector::new(config.database.clone())),
            icl_type: config.translator.icl_type.clone(),
        };

        Self::new(&config.pipelines, services)
    }

    pub fn new(configs: &[PipelineConfig], services: PipelineServices) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for config in configs {
            if !seen.insert(config.id.as_str()) {
                return Err(PipelineError::Config(format!(
                    "Duplicate pipeline id: {}",
                    config.id
                )));
            }
        }

        let pipelines = configs
            .iter()
            .map(|config| Arc::new(Pipeline::new(config, services.clone())))
            .collect();

        Ok(Self { pipelines })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.iter().find(|p| p.id == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pipeline>> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Connects every pipeline; one failing pipeline does not stop the others.
    pub async fn on_startup(&self) {
        for pipeline in &self.pipelines {
            match pipeline.on_startup().await {
                Ok(()) => info!("Pipeline '{}' ({}) started", pipeline.name, pipeline.id),
                Err(e) => error!("Pipeline '{}' failed to start: {}", pipeline.id, e),
            }
        }
    }

    pub async fn on_shutdown(&self) {
        for pipeline in &self.pipelines {
            pipeline.on_shutdown().await;
        }
    }
}
