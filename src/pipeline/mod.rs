pub mod intent;
pub mod registry;

use crate::config::{PipelineConfig, Valves};
use crate::db::markdown::format_markdown_results;
use crate::db::{Connector, DbError, QueryExecutor, ResultSet};
use crate::llm::ChatCompleter;
use crate::t2q::{BusinessExample, ExtractSchemaRequest, TranslateForm, Translator};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum PipelineError {
    Database(DbError),
    Config(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Database(e) => write!(f, "{}", e),
            PipelineError::Config(msg) => write!(f, "Pipeline configuration error: {}", msg),
        }
    }
}

impl Error for PipelineError {}

impl From<DbError> for PipelineError {
    fn from(e: DbError) -> Self {
        PipelineError::Database(e)
    }
}

/// Collaborators shared by every pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub translator: Arc<dyn Translator>,
    pub completer: Arc<dyn ChatCompleter>,
    pub connector: Arc<dyn Connector>,
    pub icl_type: String,
}

/// Optional fields a host may put in the request body.
#[derive(Debug, Default, Deserialize)]
pub struct PipeOptions {
    pub business_context: Option<String>,
    pub business_rules: Option<Vec<String>>,
    pub examples: Option<Vec<BusinessExample>>,
}

impl PipeOptions {
    /// Each field is read on its own; a malformed one is dropped with a warning.
    pub fn from_body(body: &serde_json::Value) -> Self {
        Self {
            business_context: body_field(body, "business_context"),
            business_rules: body_field(body, "business_rules"),
            examples: body_field(body, "examples"),
        }
    }
}

fn body_field<T: DeserializeOwned>(body: &serde_json::Value, name: &str) -> Option<T> {
    let value = body.get(name).filter(|value| !value.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring malformed '{}' in request body: {}", name, e);
            None
        }
    }
}

/// Natural language in, SQL results as markdown out.
pub struct Pipeline {
    pub id: String,
    pub name: String,
    intent_check: bool,
    refusal_message: String,
    fallback_message: String,
    valves: RwLock<Valves>,
    executor: RwLock<Option<Arc<dyn QueryExecutor>>>,
    services: PipelineServices,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, services: PipelineServices) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            intent_check: config.intent_check,
            refusal_message: config.refusal_message.clone(),
            fallback_message: config.fallback_message.clone(),
            valves: RwLock::new(config.valves.clone()),
            executor: RwLock::new(None),
            services,
        }
    }

    pub async fn valves(&self) -> Valves {
        self.valves.read().await.clone()
    }

    /// Replaces the database handle with one built from the current valves.
    pub async fn init_db_connection(&self) -> Result<Arc<dyn QueryExecutor>, PipelineError> {
        let valves = self.valves().await;
        let executor = self.services.connector.connect(&valves)?;

        *self.executor.write().await = Some(Arc::clone(&executor));
        Ok(executor)
    }

    pub async fn on_startup(&self) -> Result<(), PipelineError> {
        info!("on_startup: {}", self.id);
        self.init_db_connection().await?;
        Ok(())
    }

    pub async fn on_shutdown(&self) {
        info!("on_shutdown: {}", self.id);
        self.executor.write().await.take();
    }

    /// Applies new valves, reconnects, then refreshes the cached schema
    /// description when a database is named. Valves that cannot be connected
    /// with are rejected and the previous valves and handle stay in place.
    pub async fn on_valves_updated(&self, valves: Valves) -> Result<Valves, PipelineError> {
        let executor = self.services.connector.connect(&valves)?;
        {
            let mut current_valves = self.valves.write().await;
            let mut current_executor = self.executor.write().await;
            *current_valves = valves;
            *current_executor = Some(executor);
        }
        info!("Valves updated for pipeline {}", self.id);

        let has_database = !self.valves.read().await.db_database.is_empty();
        if has_database {
            self.sync_schema().await;
        }

        Ok(self.valves().await)
    }

    /// Asks the translation service for a fresh schema description. Failures
    /// keep the cached one.
    pub async fn sync_schema(&self) {
        let request = {
            let valves = self.valves.read().await;
            ExtractSchemaRequest {
                database_url: valves.database_url(),
                schema_id: valves.db_database.clone(),
            }
        };

        match self.services.translator.extract_schema(&request).await {
            Ok(description) => {
                info!("Schema description refreshed for '{}'", request.schema_id);
                debug!("DB_SCHEMA_DESCRIPTION: {}", description);
                self.valves.write().await.db_schema_description = description;
            }
            Err(e) => {
                error!(
                    "Schema extraction for '{}' failed, keeping cached description: {}",
                    request.schema_id, e
                );
            }
        }
    }

    pub async fn pipe(
        &self,
        user_message: &str,
        model_id: &str,
        messages: &[serde_json::Value],
        body: &serde_json::Value,
    ) -> Result<String, PipelineError> {
        debug!(
            "pipe: model {} with {} prior messages: {}",
            model_id,
            messages.len(),
            user_message
        );

        let valves = self.valves().await;

        if self.intent_check {
            let allowed = intent::business_intent_check(
                self.services.completer.as_ref(),
                user_message,
                &valves.business_context,
                &valves.db_schema_description,
            )
            .await;

            if !allowed {
                return Ok(self.refusal_message.clone());
            }
        }

        let options = PipeOptions::from_body(body);
        let form = TranslateForm {
            human_question: user_message.to_string(),
            db_id: valves.db_database.clone(),
            icl_type: self.services.icl_type.clone(),
            business_context: options.business_context.unwrap_or(valves.business_context),
            business_rules: options.business_rules.unwrap_or(valves.business_rules),
            business_examples: options.examples.unwrap_or(valves.business_examples),
            schema_description: valves.db_schema_description,
        };

        let sql = match self.services.translator.translate(&form).await {
            Ok(Some(sql)) => sql,
            Ok(None) => {
                warn!("No SQL predicted for: {}", user_message);
                return Ok(self.fallback_message.clone());
            }
            Err(e) => {
                error!("Translation failed: {}", e);
                return Ok(self.fallback_message.clone());
            }
        };

        info!("Executing predicted SQL: {}", sql);
        let results = self.execute(&sql).await?;

        Ok(compose_response(&sql, &format_markdown_results(&results)))
    }

    async fn execute(&self, sql: &str) -> Result<ResultSet, PipelineError> {
        let current = self.executor.read().await.clone();
        let executor = match current {
            Some(executor) => executor,
            None => self.init_db_connection().await?,
        };

        let sql = sql.to_string();
        let results = tokio::task::spawn_blocking(move || executor.execute(&sql))
            .await
            .map_err(|e| DbError::TaskError(e.to_string()))??;

        Ok(results)
    }
}

fn compose_response(sql: &str, table: &str) -> String {
    format!(
        "**Generated SQL Query:**\n ```sql\n{}\n```\n\n\n**Data Response:**\n {}",
        sql, table
    )
}
