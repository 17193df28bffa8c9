//! Raw SQL query execution endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::time::Duration;

use crate::api::{error_response, ApiState};
use crate::schema::{QueryRequest, QueryResponse};

/// Handler for POST /api/query
///
/// Executes a raw SQL query through the driver and returns at most
/// `maxResultRows` rows.
///
/// # Security Warning
///
/// This endpoint allows executing ANY SQL statement including INSERT, UPDATE, DELETE.
/// It should only be used in development environments!
///
/// Request body:
/// ```json
/// {
///   "sql": "SELECT * FROM users LIMIT 10",
///   "timeoutMilliseconds": 5000
/// }
/// ```
///
/// Response:
/// ```json
/// {
///   "columns": ["id", "name"],
///   "rows": [[1, "Alice"]],
///   "meta": { "query": "SELECT * FROM users LIMIT 10", "timestamp": "..." },
///   "truncated": false
/// }
/// ```
pub async fn execute_query_handler(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Response {
    tracing::debug!(sql = %request.sql, "executing SQL query");

    let context = match request.timeout_milliseconds {
        Some(milliseconds) => state
            .options
            .context()
            .with_timeout(Duration::from_millis(milliseconds)),
        None => state.options.context(),
    };

    let mut stream = match state.driver.query(&context, &request.sql).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(%error, "failed to execute query");
            return error_response(&error);
        }
    };

    match stream.collect_rows(state.options.max_result_rows) {
        Ok((rows, truncated)) => {
            let response = QueryResponse {
                columns: stream.header().to_vec(),
                rows,
                meta: stream.meta().clone(),
                truncated,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(error) => {
            tracing::warn!(%error, "failed to read query results");
            error_response(&error)
        }
    }
}
