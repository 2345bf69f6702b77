use clap::Parser;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::t2q::BusinessExample;

pub const DEFAULT_REFUSAL_MESSAGE: &str = "I can only answer questions related to business and employee data. Please rephrase your question to focus on business-related topics.";
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "I wasn't able to translate that into SQL just yet - could you try rephrasing your question? 😊";
pub const DEFAULT_SCHEMA_DESCRIPTION: &str = "to be updated";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token the host must present; open when unset
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub api_key: String,
    pub icl_type: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub pool_size: u32,
    pub connection_timeout_secs: u64,
    /// Roll back every execution instead of committing it
    pub read_only: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbEngine {
    #[default]
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "duckdb")]
    DuckDb,
}

/// Per-pipeline settings the host can read and replace at runtime.
///
/// Upper-case names are what the host sends; file sources may arrive lower-cased.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Valves {
    #[serde(rename = "DB_ENGINE", alias = "db_engine")]
    pub db_engine: DbEngine,
    #[serde(rename = "DB_HOST", alias = "db_host")]
    pub db_host: String,
    #[serde(rename = "DB_PORT", alias = "db_port")]
    pub db_port: String,
    #[serde(rename = "DB_USER", alias = "db_user")]
    pub db_user: String,
    #[serde(rename = "DB_PASSWORD", alias = "db_password")]
    pub db_password: String,
    #[serde(rename = "DB_DATABASE", alias = "db_database")]
    pub db_database: String,
    #[serde(rename = "DB_SCHEMA_DESCRIPTION", alias = "db_schema_description")]
    pub db_schema_description: String,
    #[serde(rename = "BUSINESS_CONTEXT", alias = "business_context")]
    pub business_context: String,
    #[serde(rename = "BUSINESS_RULES", alias = "business_rules")]
    pub business_rules: Vec<String>,
    #[serde(rename = "BUSINESS_EXAMPLES", alias = "business_examples")]
    pub business_examples: Vec<BusinessExample>,
}

impl Valves {
    /// Connection URL handed to the translation service for schema extraction.
    pub fn database_url(&self) -> String {
        match self.db_engine {
            DbEngine::Postgres => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.db_user, self.db_password, self.db_host, self.db_port, self.db_database
            ),
            DbEngine::DuckDb => format!("duckdb://{}", self.db_database),
        }
    }

    /// Overlays a partial update; fields it leaves out keep their current value.
    pub fn with_updates(&self, updates: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let Some(updates) = updates.as_object() else {
            return serde_json::from_value(updates.clone());
        };

        let mut merged = serde_json::to_value(self)?;
        if let Some(fields) = merged.as_object_mut() {
            for (key, value) in updates {
                fields.insert(key.to_uppercase(), value.clone());
            }
        }

        serde_json::from_value(merged)
    }
}

impl Default for Valves {
    fn default() -> Self {
        Self {
            db_engine: DbEngine::Postgres,
            db_host: "localhost".to_string(),
            db_port: "5432".to_string(),
            db_user: "postgres".to_string(),
            db_password: String::new(),
            db_database: String::new(),
            db_schema_description: DEFAULT_SCHEMA_DESCRIPTION.to_string(),
            business_context: String::new(),
            business_rules: Vec::new(),
            business_examples: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub intent_check: bool,
    #[serde(default = "default_refusal_message")]
    pub refusal_message: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default)]
    pub valves: Valves,
}

fn default_refusal_message() -> String {
    DEFAULT_REFUSAL_MESSAGE.to_string()
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub translator: TranslatorConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_PORT")]
    pub db_port: Option<String>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_DATABASE")]
    pub db_database: Option<String>,

    /// Base URL of the text-to-SQL service
    #[arg(long, env = "T2Q_BASE_URL")]
    pub t2q_base_url: Option<String>,

    #[arg(long, env = "T2Q_API_KEY", hide_env_values = true)]
    pub t2q_api_key: Option<String>,

    /// In-context-learning mode forwarded with every translation
    #[arg(long, env = "ICL_TYPE")]
    pub icl_type: Option<String>,

    #[arg(long, env = "OPENAI_MODEL")]
    pub openai_model: Option<String>,

    #[arg(long, env = "OPENAI_API_BASE_URL")]
    pub openai_api_base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/t2q-pipelines/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        config_builder = config_builder.add_source(environment());

        let mut config = Self::from_builder(config_builder)?;
        args.apply_overrides(&mut config);

        Ok(config)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}

// e.g. T2Q_PIPELINES__WEB__PORT=9100
fn environment() -> Environment {
    Environment::with_prefix("T2Q_PIPELINES").separator("__")
}

impl CliArgs {
    /// Command line and well-known environment variables win over file settings.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.web.host = host.clone();
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }

        if let Some(url) = &self.t2q_base_url {
            config.translator.base_url = url.clone();
        }
        if let Some(key) = &self.t2q_api_key {
            config.translator.api_key = key.clone();
        }
        if let Some(icl_type) = &self.icl_type {
            config.translator.icl_type = icl_type.clone();
        }

        if let Some(model) = &self.openai_model {
            config.llm.model = model.clone();
        }
        if let Some(url) = &self.openai_api_base_url {
            config.llm.api_url = url.clone();
        }
        if let Some(key) = &self.openai_api_key {
            config.llm.api_key = key.clone();
        }

        for pipeline in &mut config.pipelines {
            let valves = &mut pipeline.valves;
            if let Some(v) = &self.db_host {
                valves.db_host = v.clone();
            }
            if let Some(v) = &self.db_port {
                valves.db_port = v.clone();
            }
            if let Some(v) = &self.db_user {
                valves.db_user = v.clone();
            }
            if let Some(v) = &self.db_password {
                valves.db_password = v.clone();
            }
            if let Some(v) = &self.db_database {
                valves.db_database = v.clone();
            }
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9099,
            api_key: None,
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: "1234567890".to_string(),
            icl_type: "zero_shot".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            connection_timeout_secs: 30,
            read_only: true,
        }
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            translator: TranslatorConfig::default(),
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            pipelines: vec![
                PipelineConfig {
                    id: "employee_pipeline".to_string(),
                    name: "Organization PTN Employee Pipeline".to_string(),
                    intent_check: true,
                    refusal_message: default_refusal_message(),
                    fallback_message: default_fallback_message(),
                    valves: Valves::default(),
                },
                PipelineConfig {
                    id: "t2q_template_pipeline".to_string(),
                    name: "T2Q Template Pipeline".to_string(),
                    intent_check: false,
                    refusal_message: default_refusal_message(),
                    fallback_message: default_fallback_message(),
                    valves: Valves::default(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn pipeline<'a>(config: &'a AppConfig, id: &str) -> &'a PipelineConfig {
        config.pipelines.iter().find(|p| p.id == id).unwrap()
    }

    fn from_toml(toml: &str) -> AppConfig {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        AppConfig::from_builder(builder).unwrap()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = from_toml("");

        assert_eq!(config.web.port, 9099);
        assert_eq!(config.translator.base_url, "http://localhost:8000");
        assert_eq!(config.translator.icl_type, "zero_shot");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.database.read_only);

        let ids: Vec<&str> = config.pipelines.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["employee_pipeline", "t2q_template_pipeline"]);
        assert!(pipeline(&config, "employee_pipeline").intent_check);
        assert!(!pipeline(&config, "t2q_template_pipeline").intent_check);
    }

    #[test]
    fn file_declares_pipelines_with_valves() {
        let config = from_toml(
            r#"
            [web]
            port = 9200

            [[pipelines]]
            id = "hr"
            name = "HR"
            intent_check = true

            [pipelines.valves]
            DB_ENGINE = "duckdb"
            DB_DATABASE = ":memory:"
            BUSINESS_RULES = ["salaries are monthly"]
            BUSINESS_EXAMPLES = [{ question = "headcount", sql_query = "SELECT COUNT(*) FROM employees" }]
            "#,
        );

        assert_eq!(config.web.port, 9200);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.pipelines.len(), 1);

        let hr = pipeline(&config, "hr");
        assert_eq!(hr.fallback_message, DEFAULT_FALLBACK_MESSAGE);
        assert_eq!(hr.valves.db_engine, DbEngine::DuckDb);
        assert_eq!(hr.valves.db_port, "5432");
        assert_eq!(hr.valves.db_schema_description, DEFAULT_SCHEMA_DESCRIPTION);
        assert_eq!(hr.valves.business_rules, vec!["salaries are monthly"]);
        assert_eq!(hr.valves.business_examples[0].question, "headcount");
    }

    #[test]
    fn cli_overrides_apply_to_every_pipeline() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            port: Some(8080),
            db_host: Some("db.internal".to_string()),
            db_database: Some("hr".to_string()),
            t2q_base_url: Some("http://t2q:8000".to_string()),
            openai_model: Some("gpt-4o".to_string()),
            ..Default::default()
        };

        args.apply_overrides(&mut config);

        assert_eq!(config.web.port, 8080);
        assert_eq!(config.translator.base_url, "http://t2q:8000");
        assert_eq!(config.llm.model, "gpt-4o");
        for pipeline in &config.pipelines {
            assert_eq!(pipeline.valves.db_host, "db.internal");
            assert_eq!(pipeline.valves.db_database, "hr");
            assert_eq!(pipeline.valves.db_user, "postgres");
        }
    }

    #[test]
    fn postgres_database_url() {
        let valves = Valves {
            db_host: "db".to_string(),
            db_user: "app".to_string(),
            db_password: "secret".to_string(),
            db_database: "hr".to_string(),
            ..Default::default()
        };

        assert_eq!(valves.database_url(), "postgresql://app:secret@db:5432/hr");
    }

    #[test]
    fn environment_layer_uses_double_underscores() {
        let mut vars = config::Map::new();
        vars.insert("T2Q_PIPELINES__WEB__PORT".to_string(), "9100".to_string());
        vars.insert("T2Q_PIPELINES__TRANSLATOR__ICL_TYPE".to_string(), "few_shot".to_string());
        vars.insert("T2Q_PIPELINES__DATABASE__READ_ONLY".to_string(), "false".to_string());
        vars.insert("T2Q_PIPELINES_LLM__MODEL".to_string(), "ignored".to_string());

        let builder = Config::builder().add_source(environment().source(Some(vars)));
        let config = AppConfig::from_builder(builder).unwrap();

        assert_eq!(config.web.port, 9100);
        assert_eq!(config.translator.icl_type, "few_shot");
        assert!(!config.database.read_only);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_valves_update_keeps_other_fields() {
        let current = Valves {
            db_host: "db1".to_string(),
            db_database: "hr".to_string(),
            db_schema_description: "employees(id)".to_string(),
            business_rules: vec!["salaries are monthly".to_string()],
            ..Default::default()
        };

        let updated = current
            .with_updates(&serde_json::json!({ "DB_HOST": "db2", "db_port": "5433" }))
            .unwrap();

        assert_eq!(updated.db_host, "db2");
        assert_eq!(updated.db_port, "5433");
        assert_eq!(updated.db_database, "hr");
        assert_eq!(updated.db_schema_description, "employees(id)");
        assert_eq!(updated.business_rules, vec!["salaries are monthly"]);

        assert!(current.with_updates(&serde_json::json!({ "DB_PORT": 5433 })).is_err());
        assert!(current.with_updates(&serde_json::json!(["DB_HOST"])).is_err());
    }

    #[test]
    fn valves_use_host_field_names() {
        let json = serde_json::to_value(Valves::default()).unwrap();

        assert_eq!(json["DB_HOST"], "localhost");
        assert_eq!(json["DB_ENGINE"], "postgres");
        assert_eq!(json["DB_SCHEMA_DESCRIPTION"], "to be updated");
    }
}
