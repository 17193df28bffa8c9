//! Driver traits
//!
//! [`Driver`] is the base contract every backend adapter implements.
//! Optional capabilities such as [`DatabaseSwitcher`] are separate traits an
//! adapter opts into and advertises through a capability query on `Driver`.

use crate::context::Context;
use crate::schema::{Column, DatabaseList, Structure, TableOptions};
use crate::stream::ResultStream;
use async_trait::async_trait;
use thiserror::Error;

/// Base driver contract for query execution and schema introspection
///
/// # Example
///
/// ```rust,no_run
/// use sql_driver::{Context, Driver};
///
/// # async fn example(driver: &dyn Driver) -> Result<(), sql_driver::DriverError> {
/// let mut rows = driver.query(&Context::background(), "SELECT 1").await?;
/// while rows.has_next() {
///     println!("{:?}", rows.next_row()?);
/// }
///
/// if let Some(switcher) = driver.as_database_switcher() {
///     let databases = switcher.list_databases().await?;
///     println!("connected to {}", databases.current);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Execute a query under the given context
    ///
    /// Statements that produce no rows may be answered with a backend
    /// specific probe (e.g. the number of affected rows), so callers always
    /// get something to display.
    ///
    /// # Errors
    ///
    /// * [`DriverError::Execution`] if the backend rejects the statement
    /// * [`DriverError::Cancelled`] / [`DriverError::DeadlineExceeded`] from `ctx`
    async fn query(&self, ctx: &Context, query: &str) -> Result<ResultStream, DriverError>;

    /// Column metadata for a table, in declaration order
    ///
    /// Fails with [`DriverError::NotFound`] if the table does not exist.
    async fn columns(&self, options: &TableOptions) -> Result<Vec<Column>, DriverError>;

    /// The full schema forest, one group node per schema
    async fn structure(&self) -> Result<Vec<Structure>, DriverError>;

    /// Release the connection. Idempotent and infallible.
    async fn close(&self);

    /// Capability query for database switching
    fn as_database_switcher(&self) -> Option<&dyn DatabaseSwitcher> {
        None
    }
}

/// Optional capability: switching the active database mid-session
#[async_trait]
pub trait DatabaseSwitcher: Send + Sync {
    /// The selected database and the other databases that can be selected
    async fn list_databases(&self) -> Result<DatabaseList, DriverError>;

    /// Reconnect to another database on the same server
    ///
    /// The new connection is opened first and only swapped in once it is
    /// established. On failure the current connection stays in place.
    async fn select_database(&self, name: &str) -> Result<(), DriverError>;
}

/// Driver error type
#[derive(Debug, Error)]
pub enum DriverError {
    /// The backend rejected or failed a query
    #[error("Query execution failed: {0}")]
    Execution(#[from] sqlx::Error),

    /// The query context was cancelled
    #[error("Query cancelled")]
    Cancelled,

    /// The query context deadline passed
    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    /// An introspection row did not have the expected shape
    #[error("Malformed row {index}: {reason}")]
    MalformedRow { index: usize, reason: String },

    /// Table or schema not found
    #[error("Table not found: {schema}.{table}")]
    NotFound { schema: String, table: String },

    /// A new connection for a database switch could not be opened
    #[error("Unable to switch to database '{database}': {source}")]
    ConnectionSwitchFailed {
        database: String,
        #[source]
        source: Box<DriverError>,
    },

    /// `next_row` was called on an exhausted stream
    #[error("Result stream exhausted")]
    StreamExhausted,

    /// The driver was closed
    #[error("Driver is closed")]
    Closed,

    /// A connection URL could not be parsed or is not supported
    #[error("Invalid connection target: {0}")]
    InvalidTarget(String),
}

impl From<url::ParseError> for DriverError {
    fn from(error: url::ParseError) -> Self {
        DriverError::InvalidTarget(error.to_string())
    }
}
