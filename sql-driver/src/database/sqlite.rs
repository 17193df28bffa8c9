//! SQLite driver implementation

use crate::config::DriverOptions;
use crate::context::Context;
use crate::database::client::{Client, Handle, Session};
use crate::database::target::ConnectionTarget;
use crate::database::traits::{Driver, DriverError};
use crate::schema::{Column, Meta, Row, Structure, TableOptions};
use crate::stream::ResultStream;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Executor as _, Row as _, Sqlite, SqlitePool, Statement as _, TypeInfo, ValueRef};

/// Cumulative row changes of the connection; only INSERT, UPDATE and DELETE count
const TOTAL_CHANGES_QUERY: &str = "SELECT total_changes()";

const COLUMNS_QUERY: &str = "SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid";

const STRUCTURE_QUERY: &str = r#"
    SELECT 'main' AS table_schema, name AS table_name, upper(type) AS table_type
    FROM main.sqlite_master
    WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
    UNION ALL
    SELECT 'temp', name, upper(type)
    FROM temp.sqlite_master
    WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
"#;

const _: fn() = || {
    fn assert_driver<T: Driver>() {}
    assert_driver::<SqliteDriver>();
};

/// SQLite driver
///
/// SQLite has one database per connection, so this driver does not offer
/// database switching.
pub struct SqliteDriver {
    client: Client<SqlitePool>,
    options: DriverOptions,
}

impl SqliteDriver {
    /// Create a driver over an existing pool
    pub fn new(pool: SqlitePool, options: DriverOptions) -> Self {
        Self {
            client: Client::new(pool),
            options,
        }
    }

    /// Open a pool for `target` and wrap it
    pub async fn connect(target: &ConnectionTarget, options: DriverOptions) -> Result<Self, DriverError> {
        let pool = pool_options(target, &options).connect(target.as_str()).await?;
        Ok(Self::new(pool, options))
    }
}

/// Pool settings for `target`
///
/// An in-memory database lives exactly as long as its connection, so memory
/// targets get one connection that is never reaped.
fn pool_options(target: &ConnectionTarget, options: &DriverOptions) -> SqlitePoolOptions {
    let pool = SqlitePoolOptions::new().acquire_timeout(options.connect_timeout());

    if target.as_str().contains(":memory:") || target.parameter("mode").as_deref() == Some("memory") {
        pool.max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool.max_connections(options.max_connections)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn query(&self, ctx: &Context, query: &str) -> Result<ResultStream, DriverError> {
        self.client.query(ctx, query).await
    }

    async fn columns(&self, options: &TableOptions) -> Result<Vec<Column>, DriverError> {
        self.client
            .columns_from_query(&self.options.context(), COLUMNS_QUERY, options)
            .await
    }

    async fn structure(&self) -> Result<Vec<Structure>, DriverError> {
        self.client
            .structure_from_query(&self.options.context(), STRUCTURE_QUERY)
            .await
    }

    async fn close(&self) {
        self.client.close().await;
        tracing::info!("sqlite driver closed");
    }
}

#[async_trait]
impl Handle for SqlitePool {
    async fn session<'a>(&'a self) -> Result<Box<dyn Session + 'a>, DriverError> {
        Ok(Box::new(SqliteSession(self.acquire().await?)))
    }

    async fn close(&self) {
        SqlitePool::close(self).await;
    }
}

struct SqliteSession(PoolConnection<Sqlite>);

impl SqliteSession {
    async fn total_changes(&mut self) -> Result<i64, DriverError> {
        let (changes,): (i64,) = sqlx::query_as(TOTAL_CHANGES_QUERY)
            .fetch_one(&mut *self.0)
            .await?;
        Ok(changes)
    }
}

#[async_trait]
impl Session for SqliteSession {
    /// Statements without result columns answer with their own change count
    ///
    /// `changes()` keeps the count of the last modification on the connection,
    /// so DDL would report a stale value. The difference of `total_changes()`
    /// around the statement only sees what this statement did.
    async fn fetch(&mut self, sql: &str, parameters: &[&str]) -> Result<ResultStream, DriverError> {
        let statement = (&mut *self.0).prepare(sql).await?;
        let header: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let mut query = statement.query();
        for parameter in parameters {
            query = query.bind(*parameter);
        }

        if header.is_empty() {
            let before = self.total_changes().await?;
            query.execute(&mut *self.0).await?;
            let after = self.total_changes().await?;
            let changed = u64::try_from(after - before).unwrap_or_default();
            return Ok(ResultStream::rows_affected(Meta::new(sql), changed));
        }

        let rows = query.fetch_all(&mut *self.0).await?;
        Ok(ResultStream::new(
            header,
            Meta::new(sql),
            rows.into_iter().map(|row| row_values(&row)),
        ))
    }
}

/// Convert a SQLite row to its column values
fn row_values(row: &SqliteRow) -> Result<Row, DriverError> {
    (0..row.columns().len())
        .map(|index| column_value(row, index))
        .collect()
}

/// Extract a column value from a SQLite row and convert to JSON
fn column_value(row: &SqliteRow, index: usize) -> Result<Value, DriverError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    // SQLite reports affinities; expression columns may carry no declared type at all
    let type_name = row.columns()[index].type_info().name().to_uppercase();
    match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" => {
            if let Ok(value) = row.try_get::<i64, _>(index) {
                return Ok(Value::Number(value.into()));
            }
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            if let Ok(value) = row.try_get::<f64, _>(index) {
                return Ok(float(value));
            }
        }
        "BOOLEAN" | "BOOL" => {
            if let Ok(value) = row.try_get::<bool, _>(index) {
                return Ok(Value::Bool(value));
            }
        }
        "BLOB" => {
            if let Ok(value) = row.try_get::<Vec<u8>, _>(index) {
                return Ok(blob(&value));
            }
        }
        _ => {}
    }

    if let Ok(value) = row.try_get::<String, _>(index) {
        return Ok(Value::String(value));
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(Value::Number(value.into()));
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(float(value));
    }

    Ok(blob(&row.try_get::<Vec<u8>, _>(index)?))
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn blob(bytes: &[u8]) -> Value {
    Value::String(format!("[BLOB: {} bytes]", bytes.len()))
}
