//! Execution engine shared by all adapters
//!
//! A [`Client`] owns exactly one live connection [`Handle`] at a time.
//! Queries hold a read guard on the handle for their whole duration and
//! [`Client::swap`] takes the write guard, so a query never observes a handle
//! that is being replaced.

use crate::context::Context;
use crate::database::structure;
use crate::database::traits::DriverError;
use crate::schema::{Column, Meta, Structure, TableOptions};
use crate::stream::ResultStream;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// A live connection resource (usually a connection pool)
#[async_trait]
pub trait Handle: Send + Sync + 'static {
    /// Acquire a session that keeps one physical connection for its lifetime
    async fn session<'a>(&'a self) -> Result<Box<dyn Session + 'a>, DriverError>;

    /// Release the resource
    async fn close(&self);
}

/// One physical connection borrowed from a [`Handle`]
#[async_trait]
pub trait Session: Send {
    /// Execute a statement with positional text parameters
    async fn fetch(&mut self, sql: &str, parameters: &[&str]) -> Result<ResultStream, DriverError>;
}

/// Execution engine owning the live connection handle
pub struct Client<H: Handle> {
    handle: RwLock<H>,
    closed: AtomicBool,
}

impl<H: Handle> Client<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle: RwLock::new(handle),
            closed: AtomicBool::new(false),
        }
    }

    /// Execute a query
    pub async fn query(&self, ctx: &Context, sql: &str) -> Result<ResultStream, DriverError> {
        self.query_with_parameters(ctx, sql, &[]).await
    }

    /// Execute a query with positional parameters bound by the backend
    pub async fn query_with_parameters(
        &self,
        ctx: &Context,
        sql: &str,
        parameters: &[&str],
    ) -> Result<ResultStream, DriverError> {
        self.ensure_open()?;

        tracing::debug!(sql, parameters = parameters.len(), "executing query");
        ctx.run(async {
            // Inside the race: a queued swap must not outlast the deadline
            let handle = self.handle.read().await;
            self.ensure_open()?;
            let mut session = handle.session().await?;
            session.fetch(sql, parameters).await
        })
        .await
    }

    /// Execute candidates in order and return the first non-empty stream
    ///
    /// If every candidate comes back empty the last candidate's stream is
    /// returned. All candidates run on the same session, so a later candidate
    /// sees the session state the earlier ones left. Each candidate runs
    /// exactly once.
    pub async fn query_until_not_empty(
        &self,
        ctx: &Context,
        candidates: &[&str],
    ) -> Result<ResultStream, DriverError> {
        self.ensure_open()?;

        ctx.run(async {
            let handle = self.handle.read().await;
            self.ensure_open()?;
            let mut session = handle.session().await?;
            let mut last = None;

            for (position, candidate) in candidates.iter().enumerate() {
                tracing::debug!(sql = candidate, position, "executing query candidate");
                let mut stream = session.fetch(candidate, &[]).await?;
                if stream.has_next() {
                    return Ok(stream);
                }
                last = Some(stream);
            }

            Ok(last.unwrap_or_else(|| ResultStream::empty(Meta::new(""))))
        })
        .await
    }

    /// Run a `(name, data_type)` metadata query for a table
    ///
    /// The query must take the table name as its first parameter and the
    /// schema as its second. An empty result means the table does not exist.
    pub async fn columns_from_query(
        &self,
        ctx: &Context,
        sql: &str,
        options: &TableOptions,
    ) -> Result<Vec<Column>, DriverError> {
        let mut rows = self
            .query_with_parameters(ctx, sql, &[&options.table, &options.schema])
            .await?;

        let mut columns = Vec::new();
        let mut index = 0;
        while rows.has_next() {
            let row = rows.next_row()?;
            let [name, data_type] = expect_text_values::<2>(index, row)?;
            columns.push(Column { name, data_type });
            index += 1;
        }

        if columns.is_empty() {
            return Err(DriverError::NotFound {
                schema: options.schema.clone(),
                table: options.table.clone(),
            });
        }

        Ok(columns)
    }

    /// Run a combined metadata query and shape it into a structure forest
    pub async fn structure_from_query(
        &self,
        ctx: &Context,
        sql: &str,
    ) -> Result<Vec<Structure>, DriverError> {
        let mut rows = self.query(ctx, sql).await?;
        structure::build_forest(&mut rows)
    }

    /// Replace the live handle
    ///
    /// Waits for in-flight queries to finish, then closes the replaced
    /// handle. A closed client closes the incoming handle instead.
    pub async fn swap(&self, handle: H) {
        let mut current = self.handle.write().await;
        if self.closed.load(Ordering::SeqCst) {
            drop(current);
            handle.close().await;
            return;
        }

        let previous = std::mem::replace(&mut *current, handle);
        drop(current);
        previous.close().await;
        tracing::debug!("connection handle swapped");
    }

    /// Release the handle; further queries fail with [`DriverError::Closed`]
    ///
    /// The client is marked closed before waiting for in-flight queries, so
    /// new queries fail immediately instead of queueing behind the close.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.handle.write().await;
        handle.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

/// Decode a row that must consist of exactly `N` text values
pub(crate) fn expect_text_values<const N: usize>(
    index: usize,
    row: Vec<Value>,
) -> Result<[String; N], DriverError> {
    let count = row.len();
    let values: Vec<String> = row
        .into_iter()
        .enumerate()
        .map(|(position, value)| expect_text(index, position, value))
        .collect::<Result<_, _>>()?;

    values.try_into().map_err(|_| DriverError::MalformedRow {
        index,
        reason: format!("expected {} columns, got {}", N, count),
    })
}

pub(crate) fn expect_text(index: usize, position: usize, value: Value) -> Result<String, DriverError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(DriverError::MalformedRow {
            index,
            reason: format!("column {} is not text: {}", position, other),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::Row;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Statement that makes the scripted session sleep until cancelled
    pub(crate) const SLOW_QUERY: &str = "SELECT pg_sleep(60)";

    /// In-memory handle answering statements from a script
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedHandle {
        pub(crate) responses: Arc<HashMap<String, Vec<Row>>>,
        pub(crate) executed: Arc<Mutex<Vec<String>>>,
        pub(crate) closed: Arc<AtomicBool>,
    }

    impl ScriptedHandle {
        pub(crate) fn new(responses: &[(&str, Vec<Row>)]) -> Self {
            Self {
                responses: Arc::new(
                    responses
                        .iter()
                        .map(|(sql, rows)| (sql.to_string(), rows.clone()))
                        .collect(),
                ),
                ..Self::default()
            }
        }

        pub(crate) fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    struct ScriptedSession<'a> {
        handle: &'a ScriptedHandle,
    }

    #[async_trait]
    impl Handle for ScriptedHandle {
        async fn session<'a>(&'a self) -> Result<Box<dyn Session + 'a>, DriverError> {
            Ok(Box::new(ScriptedSession { handle: self }))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Session for ScriptedSession<'_> {
        async fn fetch(&mut self, sql: &str, parameters: &[&str]) -> Result<ResultStream, DriverError> {
            let mut statement = sql.to_string();
            for parameter in parameters {
                statement.push_str(&format!(" [{}]", parameter));
            }
            self.handle.executed.lock().unwrap().push(statement.clone());

            if sql == SLOW_QUERY {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }

            match self.handle.responses.get(&statement) {
                Some(rows) => {
                    let width = rows.first().map(Vec::len).unwrap_or(0);
                    let header = (0..width).map(|index| format!("column{}", index)).collect();
                    Ok(ResultStream::from_rows(header, Meta::new(sql), rows.clone()))
                }
                None => Err(DriverError::Execution(sqlx::Error::Protocol(format!(
                    "unknown statement: {}",
                    statement
                )))),
            }
        }
    }

    #[tokio::test]
    async fn test_query_until_not_empty_returns_first_non_empty() {
        let handle = ScriptedHandle::new(&[
            ("UPDATE users SET active = 1", vec![]),
            ("SELECT changes()", vec![vec![json!(3)]]),
            ("SELECT never", vec![vec![json!("unused")]]),
        ]);
        let client = Client::new(handle.clone());

        let mut stream = client
            .query_until_not_empty(
                &Context::background(),
                &["UPDATE users SET active = 1", "SELECT changes()", "SELECT never"],
            )
            .await
            .unwrap();

        assert_eq!(stream.meta().query, "SELECT changes()");
        assert_eq!(stream.next_row().unwrap(), vec![json!(3)]);
        assert_eq!(
            handle.executed(),
            vec!["UPDATE users SET active = 1", "SELECT changes()"]
        );
    }

    #[tokio::test]
    async fn test_query_until_not_empty_does_not_rerun_non_empty_statement() {
        let handle = ScriptedHandle::new(&[
            ("SELECT * FROM users", vec![vec![json!(1)]]),
            ("SELECT changes()", vec![vec![json!(0)]]),
        ]);
        let client = Client::new(handle.clone());

        let stream = client
            .query_until_not_empty(
                &Context::background(),
                &["SELECT * FROM users", "SELECT changes()"],
            )
            .await
            .unwrap();

        assert_eq!(stream.meta().query, "SELECT * FROM users");
        assert_eq!(handle.executed(), vec!["SELECT * FROM users"]);
    }

    #[tokio::test]
    async fn test_query_until_not_empty_returns_last_when_all_empty() {
        let handle = ScriptedHandle::new(&[("CREATE TABLE t (id int)", vec![]), ("SELECT 0", vec![])]);
        let client = Client::new(handle);

        let mut stream = client
            .query_until_not_empty(&Context::background(), &["CREATE TABLE t (id int)", "SELECT 0"])
            .await
            .unwrap();

        assert_eq!(stream.meta().query, "SELECT 0");
        assert!(!stream.has_next());
    }

    #[tokio::test]
    async fn test_query_until_not_empty_without_candidates() {
        let client = Client::new(ScriptedHandle::default());
        let mut stream = client
            .query_until_not_empty(&Context::background(), &[])
            .await
            .unwrap();
        assert!(!stream.has_next());
    }

    #[tokio::test]
    async fn test_query_until_not_empty_stops_on_error() {
        let handle = ScriptedHandle::new(&[("SELECT changes()", vec![vec![json!(1)]])]);
        let client = Client::new(handle.clone());

        let result = client
            .query_until_not_empty(&Context::background(), &["SELEC broken", "SELECT changes()"])
            .await;

        assert!(matches!(result, Err(DriverError::Execution(_))));
        assert_eq!(handle.executed(), vec!["SELEC broken"]);
    }

    #[tokio::test]
    async fn test_columns_binds_table_then_schema() {
        let sql = "SELECT name, type FROM columns WHERE table = ?1 AND schema = ?2";
        let handle = ScriptedHandle::new(&[(
            "SELECT name, type FROM columns WHERE table = ?1 AND schema = ?2 [Users] [dbo]",
            vec![
                vec![json!("id"), json!("int")],
                vec![json!("email"), json!("nvarchar")],
            ],
        )]);
        let client = Client::new(handle);

        let columns = client
            .columns_from_query(&Context::background(), sql, &TableOptions::new("dbo", "Users"))
            .await
            .unwrap();

        assert_eq!(
            columns,
            vec![
                Column { name: "id".to_string(), data_type: "int".to_string() },
                Column { name: "email".to_string(), data_type: "nvarchar".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_columns_of_missing_table_is_not_found() {
        let handle = ScriptedHandle::new(&[("COLUMNS [missing] [dbo]", vec![])]);
        let client = Client::new(handle);

        let result = client
            .columns_from_query(&Context::background(), "COLUMNS", &TableOptions::new("dbo", "missing"))
            .await;

        assert!(matches!(
            result,
            Err(DriverError::NotFound { ref schema, ref table }) if schema == "dbo" && table == "missing"
        ));
    }

    #[tokio::test]
    async fn test_columns_with_malformed_row() {
        let handle = ScriptedHandle::new(&[("COLUMNS [t] [s]", vec![vec![json!("id"), json!(7)]])]);
        let client = Client::new(handle);

        let result = client
            .columns_from_query(&Context::background(), "COLUMNS", &TableOptions::new("s", "t"))
            .await;

        assert!(matches!(result, Err(DriverError::MalformedRow { index: 0, .. })));
    }

    #[tokio::test]
    async fn test_cancelled_query_surfaces_cancellation() {
        let client = Arc::new(Client::new(ScriptedHandle::new(&[(SLOW_QUERY, vec![])])));
        let (context, cancel) = Context::background().with_cancel();

        let running = {
            let client = client.clone();
            tokio::spawn(async move { client.query(&context, SLOW_QUERY).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = running.await.unwrap();
        assert!(matches!(result, Err(DriverError::Cancelled)));
    }

    #[tokio::test]
    async fn test_query_deadline() {
        let client = Client::new(ScriptedHandle::new(&[(SLOW_QUERY, vec![])]));
        let context = Context::background().with_timeout(Duration::from_millis(20));

        let result = client.query(&context, SLOW_QUERY).await;
        assert!(matches!(result, Err(DriverError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_swap_replaces_and_closes_previous_handle() {
        let first = ScriptedHandle::new(&[("SELECT DB_NAME()", vec![vec![json!("master")]])]);
        let second = ScriptedHandle::new(&[("SELECT DB_NAME()", vec![vec![json!("sales")]])]);
        let client = Client::new(first.clone());

        client.swap(second.clone()).await;

        let mut stream = client.query(&Context::background(), "SELECT DB_NAME()").await.unwrap();
        assert_eq!(stream.next_row().unwrap(), vec![json!("sales")]);
        assert!(first.closed.load(Ordering::SeqCst));
        assert!(!second.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_swap_waits_for_in_flight_query() {
        let first = ScriptedHandle::new(&[(SLOW_QUERY, vec![])]);
        let client = Arc::new(Client::new(first.clone()));
        let context = Context::background().with_timeout(Duration::from_millis(100));

        let running = {
            let client = client.clone();
            tokio::spawn(async move { client.query(&context, SLOW_QUERY).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        client.swap(ScriptedHandle::default()).await;

        // The swap could only take the write guard once the query released it
        assert!(running.is_finished());
        assert!(matches!(running.await.unwrap(), Err(DriverError::DeadlineExceeded)));
        assert!(first.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deadline_applies_while_waiting_behind_swap() {
        let handle = ScriptedHandle::new(&[(SLOW_QUERY, vec![]), ("SELECT 1", vec![vec![json!(1)]])]);
        let client = Arc::new(Client::new(handle));

        let slow = {
            let client = client.clone();
            let context = Context::background().with_timeout(Duration::from_secs(2));
            tokio::spawn(async move { client.query(&context, SLOW_QUERY).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Queued on the write guard; later readers line up behind it
        let swap = {
            let client = client.clone();
            tokio::spawn(async move { client.swap(ScriptedHandle::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let context = Context::background().with_timeout(Duration::from_millis(50));
        let result = client.query(&context, "SELECT 1").await;

        assert!(matches!(result, Err(DriverError::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_millis(500));

        slow.abort();
        swap.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_applies_while_waiting_behind_swap() {
        let handle = ScriptedHandle::new(&[(SLOW_QUERY, vec![]), ("SELECT 1", vec![vec![json!(1)]])]);
        let client = Arc::new(Client::new(handle));

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.query(&Context::background(), SLOW_QUERY).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let swap = {
            let client = client.clone();
            tokio::spawn(async move { client.swap(ScriptedHandle::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (context, cancel) = Context::background().with_cancel();
        let waiting = {
            let client = client.clone();
            tokio::spawn(async move { client.query(&context, "SELECT 1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(500), waiting)
            .await
            .expect("cancelled query returns without the guard")
            .unwrap();
        assert!(matches!(result, Err(DriverError::Cancelled)));

        slow.abort();
        swap.await.unwrap();
    }

    #[tokio::test]
    async fn test_queries_fail_fast_while_close_waits() {
        let handle = ScriptedHandle::new(&[(SLOW_QUERY, vec![]), ("SELECT 1", vec![vec![json!(1)]])]);
        let client = Arc::new(Client::new(handle.clone()));

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.query(&Context::background(), SLOW_QUERY).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let closing = {
            let client = client.clone();
            tokio::spawn(async move { client.close().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            client.query(&Context::background(), "SELECT 1"),
        )
        .await
        .expect("query after close does not queue");
        assert!(matches!(result, Err(DriverError::Closed)));

        slow.abort();
        closing.await.unwrap();
        assert!(handle.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let handle = ScriptedHandle::new(&[("SELECT 1", vec![vec![json!(1)]])]);
        let client = Client::new(handle.clone());

        client.close().await;
        client.close().await;

        assert!(handle.closed.load(Ordering::SeqCst));
        let result = client.query(&Context::background(), "SELECT 1").await;
        assert!(matches!(result, Err(DriverError::Closed)));
    }

    #[tokio::test]
    async fn test_swap_after_close_releases_new_handle() {
        let client = Client::new(ScriptedHandle::default());
        client.close().await;

        let incoming = ScriptedHandle::default();
        client.swap(incoming.clone()).await;
        assert!(incoming.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_expect_text_values() {
        let [schema, name] = expect_text_values::<2>(0, vec![json!("dbo"), json!("Users")]).unwrap();
        assert_eq!((schema.as_str(), name.as_str()), ("dbo", "Users"));

        assert!(matches!(
            expect_text_values::<2>(4, vec![json!("dbo")]),
            Err(DriverError::MalformedRow { index: 4, .. })
        ));
        assert!(matches!(
            expect_text_values::<2>(1, vec![json!("dbo"), Value::Null]),
            Err(DriverError::MalformedRow { index: 1, .. })
        ));
    }
}
