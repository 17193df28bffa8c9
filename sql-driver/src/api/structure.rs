//! Schema structure and column endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::api::{error_response, ApiState};
use crate::schema::TableOptions;

/// Handler for GET /api/structure
///
/// Returns the schema forest: one group per schema with its tables, views
/// and routines as children.
pub async fn get_structure_handler(State(state): State<ApiState>) -> Response {
    match state.driver.structure().await {
        Ok(structure) => (StatusCode::OK, Json(structure)).into_response(),
        Err(error) => {
            tracing::warn!(%error, "failed to load structure");
            error_response(&error)
        }
    }
}

/// Handler for GET /api/schemas/{schema}/tables/{table}/columns
///
/// # Arguments
///
/// * `state` - Driver from state
/// * `schema`, `table` - Identifies the table
///
/// # Returns
///
/// JSON list of columns in declaration order, or 404 if the table does not exist
pub async fn get_columns_handler(
    State(state): State<ApiState>,
    Path((schema, table)): Path<(String, String)>,
) -> Response {
    let options = TableOptions::new(schema, table);

    match state.driver.columns(&options).await {
        Ok(columns) => (StatusCode::OK, Json(columns)).into_response(),
        Err(error) => {
            tracing::warn!(
                schema = %options.schema,
                table = %options.table,
                %error,
                "failed to get columns"
            );
            error_response(&error)
        }
    }
}
