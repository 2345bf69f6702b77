pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessExample {
    pub question: String,
    pub sql_query: String,
}

// Body of POST /v1/t2q/translate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateForm {
    pub human_question: String,
    pub db_id: String,
    #[serde(default)]
    pub icl_type: String,
    #[serde(default)]
    pub business_context: String,
    #[serde(default)]
    pub business_rules: Vec<String>,
    #[serde(default)]
    pub business_examples: Vec<BusinessExample>,
    #[serde(default)]
    pub schema_description: String,
}

#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub predicted_sql_query: Option<String>,
}

// Body of POST /v1/t2q/extract-schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSchemaRequest {
    pub database_url: String,
    pub schema_id: String,
}

#[derive(Debug)]
pub enum T2qError {
    ConnectionError(String),
    StatusError { status: u16, body: String },
    ResponseError(String),
}

impl fmt::Display for T2qError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            T2qError::ConnectionError(msg) => write!(f, "T2Q connection error: {}", msg),
            T2qError::StatusError { status, body } => {
                write!(f, "T2Q responded with status code {}: {}", status, body)
            }
            T2qError::ResponseError(msg) => write!(f, "T2Q response error: {}", msg),
        }
    }
}

impl Error for T2qError {}

/// Client side of the text-to-SQL service.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Asks the service to introspect a database; returns the schema description text.
    async fn extract_schema(&self, request: &ExtractSchemaRequest) -> Result<String, T2qError>;

    /// Returns the predicted SQL, `None` when the service produced nothing usable.
    async fn translate(&self, form: &TranslateForm) -> Result<Option<String>, T2qError>;
}
