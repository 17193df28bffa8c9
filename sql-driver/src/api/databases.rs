//! Database switching endpoints
//!
//! Only available when the driver has the database switching capability;
//! otherwise both endpoints answer 501.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::api::{error_response, ApiState};
use crate::schema::SelectDatabaseRequest;

fn not_supported() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "error": "Driver does not support switching databases"
        })),
    )
        .into_response()
}

/// Handler for GET /api/databases
pub async fn list_databases_handler(State(state): State<ApiState>) -> Response {
    let Some(switcher) = state.driver.as_database_switcher() else {
        return not_supported();
    };

    match switcher.list_databases().await {
        Ok(databases) => (StatusCode::OK, Json(databases)).into_response(),
        Err(error) => {
            tracing::warn!(%error, "failed to list databases");
            error_response(&error)
        }
    }
}

/// Handler for POST /api/databases/select
///
/// Request body:
/// ```json
/// { "name": "analytics" }
/// ```
///
/// Answers 204 once the new connection is in place, or 502 if it could not
/// be opened (the previous connection stays active).
pub async fn select_database_handler(
    State(state): State<ApiState>,
    Json(request): Json<SelectDatabaseRequest>,
) -> Response {
    let Some(switcher) = state.driver.as_database_switcher() else {
        return not_supported();
    };

    match switcher.select_database(&request.name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => {
            tracing::warn!(database = %request.name, %error, "failed to select database");
            error_response(&error)
        }
    }
}
