//! PostgreSQL driver implementation

use crate::config::DriverOptions;
use crate::context::Context;
use crate::database::client::{expect_text_values, Client, Handle, Session};
use crate::database::switch::DatabaseSelector;
use crate::database::target::ConnectionTarget;
use crate::database::traits::{DatabaseSwitcher, Driver, DriverError};
use crate::schema::{Column, DatabaseList, Meta, Row, Structure, TableOptions};
use crate::stream::ResultStream;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column as _, Executor as _, PgPool, Postgres, Row as _, Statement as _, TypeInfo, ValueRef};

/// Query parameter sqlx reads the database name from; it overrides the URL path
const DATABASE_PARAMETER: &str = "dbname";

const COLUMNS_QUERY: &str = r#"
    SELECT column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_name = $1
      AND table_schema = $2
    ORDER BY ordinal_position
"#;

const STRUCTURE_QUERY: &str = r#"
    SELECT table_schema::text, table_name::text, table_type::text
    FROM information_schema.tables
    WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
    UNION ALL
    SELECT routine_schema::text, routine_name::text, routine_type::text
    FROM information_schema.routines
    WHERE routine_type IN ('PROCEDURE', 'FUNCTION')
      AND routine_schema NOT IN ('pg_catalog', 'information_schema')
"#;

const CURRENT_DATABASE_QUERY: &str = "SELECT current_database()::text";

const AVAILABLE_DATABASES_QUERY: &str = r#"
    SELECT datname::text
    FROM pg_database
    WHERE datallowconn
      AND NOT datistemplate
      AND datname <> current_database()
    ORDER BY datname
"#;

const _: fn() = || {
    fn assert_switching_driver<T: Driver + DatabaseSwitcher>() {}
    assert_switching_driver::<PostgresDriver>();
};

/// PostgreSQL driver
pub struct PostgresDriver {
    client: Client<PgPool>,
    selector: DatabaseSelector,
    options: DriverOptions,
}

impl PostgresDriver {
    /// Create a driver over an existing pool
    ///
    /// `target` must be the address `pool` was opened with; database
    /// switches are derived from it.
    pub fn new(pool: PgPool, target: ConnectionTarget, options: DriverOptions) -> Self {
        Self {
            client: Client::new(pool),
            selector: DatabaseSelector::new(target, DATABASE_PARAMETER),
            options,
        }
    }

    pub async fn connect(target: ConnectionTarget, options: DriverOptions) -> Result<Self, DriverError> {
        let pool = open_pool(&target, &options).await?;
        Ok(Self::new(pool, target, options))
    }

    /// The address of the currently selected database
    pub async fn target(&self) -> ConnectionTarget {
        self.selector.target().await
    }
}

async fn open_pool(target: &ConnectionTarget, options: &DriverOptions) -> Result<PgPool, DriverError> {
    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.connect_timeout())
        .connect(target.as_str())
        .await?;
    Ok(pool)
}

#[async_trait]
impl Driver for PostgresDriver {
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
        tracing::info!("postgres driver closed");
    }

    fn as_database_switcher(&self) -> Option<&dyn DatabaseSwitcher> {
        Some(self)
    }
}

#[async_trait]
impl DatabaseSwitcher for PostgresDriver {
    async fn list_databases(&self) -> Result<DatabaseList, DriverError> {
        // Keep switches out so both queries see the same database
        let _target = self.selector.lock().await;
        let ctx = self.options.context();

        let mut rows = self.client.query(&ctx, CURRENT_DATABASE_QUERY).await?;
        let [current] = expect_text_values::<1>(0, rows.next_row()?)?;

        let mut rows = self.client.query(&ctx, AVAILABLE_DATABASES_QUERY).await?;
        let mut available = Vec::new();
        let mut index = 0;
        while rows.has_next() {
            let [name] = expect_text_values::<1>(index, rows.next_row()?)?;
            available.push(name);
            index += 1;
        }

        Ok(DatabaseList { current, available })
    }

    async fn select_database(&self, name: &str) -> Result<(), DriverError> {
        let options = &self.options;
        self.selector
            .select(&self.client, name, |target| async move {
                open_pool(&target, options).await
            })
            .await
    }
}

#[async_trait]
impl Handle for PgPool {
    async fn session<'a>(&'a self) -> Result<Box<dyn Session + 'a>, DriverError> {
        Ok(Box::new(PostgresSession(self.acquire().await?)))
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}

struct PostgresSession(PoolConnection<Postgres>);

#[async_trait]
impl Session for PostgresSession {
    /// Statements without result columns answer with the row count from
    /// their own command tag
    async fn fetch(&mut self, sql: &str, parameters: &[&str]) -> Result<ResultStream, DriverError> {
        // Parameters are always text, as they would be when bound unprepared
        let parameter_types: Vec<_> = parameters
            .iter()
            .map(|_| <&str as sqlx::Type<Postgres>>::type_info())
            .collect();
        let statement = (&mut *self.0).prepare_with(sql, &parameter_types).await?;
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
            let result = query.execute(&mut *self.0).await?;
            return Ok(ResultStream::rows_affected(Meta::new(sql), result.rows_affected()));
        }

        let rows = query.fetch_all(&mut *self.0).await?;
        Ok(ResultStream::new(
            header,
            Meta::new(sql),
            rows.into_iter().map(|row| row_values(&row)),
        ))
    }
}

/// Convert a PostgreSQL row to its column values
fn row_values(row: &PgRow) -> Result<Row, DriverError> {
    (0..row.columns().len())
        .map(|index| column_value(row, index))
        .collect()
}

fn column_value(row: &PgRow, index: usize) -> Result<Value, DriverError> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(index)?),
        "INT2" => Value::Number(row.try_get::<i16, _>(index)?.into()),
        "INT4" => Value::Number(row.try_get::<i32, _>(index)?.into()),
        "INT8" => Value::Number(row.try_get::<i64, _>(index)?.into()),
        "OID" => Value::Number(row.try_get::<sqlx::postgres::types::Oid, _>(index)?.0.into()),
        "FLOAT4" => float(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(index)?),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
            Value::String(row.try_get::<String, _>(index)?)
        }
        "BYTEA" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::String(format!("[BLOB: {} bytes]", bytes.len()))
        }
        "NUMERIC" => Value::String(row.try_get::<BigDecimal, _>(index)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
        "UUID" => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(row.try_get::<NaiveDateTime, _>(index)?.to_string()),
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "BOOL[]" => Value::from(row.try_get::<Vec<bool>, _>(index)?),
        "INT4[]" => Value::from(row.try_get::<Vec<i32>, _>(index)?),
        "INT8[]" => Value::from(row.try_get::<Vec<i64>, _>(index)?),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => Value::from(row.try_get::<Vec<String>, _>(index)?),
        // Enums and other text-compatible types; anything else is a decode error
        _ => Value::String(row.try_get::<String, _>(index)?),
    };

    Ok(value)
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}
