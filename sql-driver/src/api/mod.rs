//! REST API endpoints
//!
//! This module contains the HTTP handlers that expose a [`Driver`] to an
//! interactive frontend.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use std::sync::Arc;

use crate::config::DriverOptions;
use crate::database::traits::{Driver, DriverError};

pub mod databases;
pub mod query;
pub mod structure;

// Re-export handlers for convenience
pub use databases::{list_databases_handler, select_database_handler};
pub use query::execute_query_handler;
pub use structure::{get_columns_handler, get_structure_handler};

/// Shared state of the API handlers
#[derive(Clone)]
pub struct ApiState {
    pub driver: Arc<dyn Driver>,
    pub options: Arc<DriverOptions>,
}

impl ApiState {
    pub fn new(driver: Arc<dyn Driver>, options: DriverOptions) -> Self {
        Self {
            driver,
            options: Arc::new(options),
        }
    }
}

/// Create the API router with all endpoints
///
/// # Arguments
///
/// * `state` - Driver and options shared by the handlers
///
/// # Returns
///
/// An Axum Router configured with all API routes
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/query", axum::routing::post(query::execute_query_handler))
        .route("/structure", axum::routing::get(structure::get_structure_handler))
        .route(
            "/schemas/{schema}/tables/{table}/columns",
            axum::routing::get(structure::get_columns_handler),
        )
        .route("/databases", axum::routing::get(databases::list_databases_handler))
        .route(
            "/databases/select",
            axum::routing::post(databases::select_database_handler),
        )
        .with_state(state)
}

/// HTTP status for a driver error
pub fn status_for(error: &DriverError) -> StatusCode {
    match error {
        DriverError::NotFound { .. } => StatusCode::NOT_FOUND,
        DriverError::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        DriverError::MalformedRow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DriverError::ConnectionSwitchFailed { .. } => StatusCode::BAD_GATEWAY,
        DriverError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        DriverError::Cancelled => client_closed_request(),
        DriverError::Execution(_)
        | DriverError::StreamExhausted
        | DriverError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
    }
}

/// Non-standard 499: the query was abandoned by its caller, not rejected
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
}

/// JSON error body with a status derived from the error kind
pub fn error_response(error: &DriverError) -> Response {
    (
        status_for(error),
        Json(serde_json::json!({
            "error": error.to_string()
        })),
    )
        .into_response()
}
