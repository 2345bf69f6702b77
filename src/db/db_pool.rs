use crate::config::{DatabaseConfig, Valves};
use crate::db::{DbError, QueryExecutor, ResultSet};
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const IN_MEMORY: &str = ":memory:";

/// Hands out connections to a single DuckDB database, so every pooled
/// connection (in-memory ones included) sees the same data.
pub struct DuckDBConnectionManager {
    database: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: &str) -> Result<Self, duckdb::Error> {
        let database = if connection_string.is_empty() || connection_string == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(connection_string)?
        };

        Ok(Self {
            database: Mutex::new(database),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        // A poisoned lock still guards a usable connection
        let database = self.database.lock().unwrap_or_else(|e| e.into_inner());
        database.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub struct DuckDbExecutor {
    pool: Pool<DuckDBConnectionManager>,
    read_only: bool,
}

impl DuckDbExecutor {
    pub fn new(valves: &Valves, config: &DatabaseConfig) -> Result<Self, DbError> {
        let manager = DuckDBConnectionManager::new(&valves.db_database)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build_unchecked(manager);

        Ok(Self {
            pool,
            read_only: config.read_only,
        })
    }
}

impl QueryExecutor for DuckDbExecutor {
    fn execute(&self, sql: &str) -> Result<ResultSet, DbError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction().map_err(query_error)?;

        let result = {
            let mut stmt = tx.prepare(sql).map_err(query_error)?;
            let arrow_batch = stmt.query_arrow([]).map_err(query_error)?;

            let schema = arrow_batch.get_schema();
            let columns = schema
                .fields()
                .iter()
                .map(|field| field.name().clone())
                .collect::<Vec<String>>();

            let record_batches = arrow_batch.collect::<Vec<RecordBatch>>();
            rows_from_batches(columns, &record_batches)?
        };

        if self.read_only {
            tx.rollback().map_err(query_error)?;
        } else {
            tx.commit().map_err(query_error)?;
        }

        debug!("DuckDB returned {} rows", result.rows.len());
        Ok(result)
    }
}

fn query_error(e: duckdb::Error) -> DbError {
    DbError::QueryError(e.to_string())
}

fn rows_from_batches(columns: Vec<String>, batches: &[RecordBatch]) -> Result<ResultSet, DbError> {
    let mut rows = Vec::new();

    for batch in batches {
        for row in 0..batch.num_rows() {
            let values = batch
                .columns()
                .iter()
                .map(|column| {
                    if column.is_null(row) {
                        Ok(None)
                    } else {
                        array_value_to_string(column, row).map(Some)
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::QueryError(e.to_string()))?;
            rows.push(values);
        }
    }

    Ok(ResultSet {
        columns: Some(columns),
        rows,
    })
}
