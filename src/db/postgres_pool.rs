use crate::config::{DatabaseConfig, Valves};
use crate::db::{DbError, QueryExecutor, ResultSet};
use postgres::{Client, Config, NoTls, SimpleQueryMessage};
use r2d2::{ManageConnection, Pool};
use std::time::Duration;
use tracing::debug;

pub struct PostgresConnectionManager {
    config: Config,
}

impl PostgresConnectionManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ManageConnection for PostgresConnectionManager {
    type Connection = Client;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.config.connect(NoTls)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

pub struct PostgresExecutor {
    pool: Pool<PostgresConnectionManager>,
    read_only: bool,
}

impl PostgresExecutor {
    /// Builds the pool lazily; nothing connects until the first execution.
    pub fn new(valves: &Valves, config: &DatabaseConfig) -> Result<Self, DbError> {
        let port: u16 = valves.db_port.trim().parse().map_err(|_| {
            DbError::ConfigError(format!("DB_PORT is not a valid port: '{}'", valves.db_port))
        })?;

        let timeout = Duration::from_secs(config.connection_timeout_secs);

        let mut pg_config = Config::new();
        pg_config
            .host(&valves.db_host)
            .port(port)
            .user(&valves.db_user)
            .connect_timeout(timeout);

        if !valves.db_password.is_empty() {
            pg_config.password(&valves.db_password);
        }
        if !valves.db_database.is_empty() {
            pg_config.dbname(&valves.db_database);
        }

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(0))
            .connection_timeout(timeout)
            .build_unchecked(PostgresConnectionManager::new(pg_config));

        Ok(Self {
            pool,
            read_only: config.read_only,
        })
    }
}

impl QueryExecutor for PostgresExecutor {
    fn execute(&self, sql: &str) -> Result<ResultSet, DbError> {
        let mut client = self.pool.get()?;

        let mut tx = client
            .build_transaction()
            .read_only(self.read_only)
            .start()
            .map_err(query_error)?;

        // Simple query protocol: arbitrary statements, every value as text
        let messages = tx.simple_query(sql).map_err(query_error)?;

        if self.read_only {
            tx.rollback().map_err(query_error)?;
        } else {
            tx.commit().map_err(query_error)?;
        }

        let result = rows_from_messages(messages);
        debug!("PostgreSQL returned {} rows", result.rows.len());
        Ok(result)
    }
}

fn query_error(e: postgres::Error) -> DbError {
    DbError::QueryError(e.to_string())
}

fn rows_from_messages(messages: Vec<SimpleQueryMessage>) -> ResultSet {
    let mut statements = StatementResults::default();

    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => statements.push_row(
                || {
                    row.columns()
                        .iter()
                        .map(|column| column.name().to_string())
                        .collect()
                },
                (0..row.len()).map(|i| row.get(i).map(str::to_string)).collect(),
            ),
            SimpleQueryMessage::CommandComplete(_) => statements.complete(),
            _ => {}
        }
    }

    statements.finish()
}

/// Keeps only the rows of the last statement in a multi-statement query.
#[derive(Default)]
struct StatementResults {
    completed: ResultSet,
    current: ResultSet,
}

impl StatementResults {
    fn push_row(&mut self, columns: impl FnOnce() -> Vec<String>, values: Vec<Option<String>>) {
        if self.current.columns.is_none() {
            self.current.columns = Some(columns());
        }
        self.current.rows.push(values);
    }

    fn complete(&mut self) {
        self.completed = std::mem::take(&mut self.current);
    }

    fn finish(self) -> ResultSet {
        if self.current.is_empty() {
            self.completed
        } else {
            self.current
        }
    }
}
