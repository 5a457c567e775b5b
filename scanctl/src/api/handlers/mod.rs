//! HTTP request handlers for the API endpoints.
//!
//! - [`scan`]: credential validation and the full compliance scan
//! - [`fix`]: remediation of a single finding
//! - [`analysis`]: structured and narrative analysis of a report
//!
//! Bodies are taken as `Result<Json<T>, JsonRejection>` so malformed JSON is reported
//! through [`crate::errors::Error`] like every other failure.

use axum::{
    Json,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

pub mod analysis;
pub mod fix;
pub mod scan;

/// Fallback for every non-POST request on an API route.
pub async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(json!({ "error": format!("Method {method} Not Allowed") })),
    )
        .into_response()
}
