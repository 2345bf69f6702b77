pub mod db_pool;
pub mod markdown;
pub mod postgres_pool;

use crate::config::{DatabaseConfig, DbEngine, Valves};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use self::db_pool::DuckDbExecutor;
use self::postgres_pool::PostgresExecutor;

/// Rows produced by one execution, every value already in its text form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names, when the driver reports them
    pub columns: Option<Vec<String>>,
    /// `None` is SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug)]
pub enum DbError {
    ConfigError(String),
    ConnectionError(String),
    QueryError(String),
    TaskError(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::ConfigError(msg) => write!(f, "Database configuration error: {}", msg),
            DbError::ConnectionError(msg) => write!(f, "Database connection error: {}", msg),
            DbError::QueryError(msg) => write!(f, "SQL error: {}", msg),
            DbError::TaskError(msg) => write!(f, "Database task execution failed: {}", msg),
        }
    }
}

impl Error for DbError {}

impl From<r2d2::Error> for DbError {
    fn from(e: r2d2::Error) -> Self {
        DbError::ConnectionError(e.to_string())
    }
}

/// Runs SQL text verbatim. Implementations block; call them from
/// `spawn_blocking`.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, sql: &str) -> Result<ResultSet, DbError>;
}

/// Builds a live database handle from the current valves.
pub trait Connector: Send + Sync {
    fn connect(&self, valves: &Valves) -> Result<Arc<dyn QueryExecutor>, DbError>;
}

/// Connector backed by one r2d2 pool per handle.
pub struct PoolConnector {
    config: DatabaseConfig,
}

impl PoolConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

impl Connector for PoolConnector {
    fn connect(&self, valves: &Valves) -> Result<Arc<dyn QueryExecutor>, DbError> {
        match valves.db_engine {
            DbEngine::Postgres => {
                info!(
                    "Initializing PostgreSQL pool for {}@{}:{}/{}",
                    valves.db_user, valves.db_host, valves.db_port, valves.db_database
                );
                Ok(Arc::new(PostgresExecutor::new(valves, &self.config)?))
            }
            DbEngine::DuckDb => {
                info!("Initializing DuckDB pool for {}", valves.db_database);
                Ok(Arc::new(DuckDbExecutor::new(valves, &self.config)?))
            }
        }
    }
}
