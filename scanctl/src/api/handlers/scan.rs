use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    AppState,
    api::models::errors::ErrorResponse,
    credentials::RawCredentials,
    errors::Result,
    report::ComplianceReport,
    scan::run_scan,
};

#[utoipa::path(
    post,
    path = "/api/scan",
    tag = "compliance",
    summary = "Run a compliance scan",
    description = "Validate the credential bundle, inspect MFA, RLS and PITR status of the project, and return the aggregated report. Nothing is persisted.",
    request_body = RawCredentials,
    responses(
        (status = 200, description = "Scan completed", body = ComplianceReport),
        (status = 400, description = "Missing or malformed credentials", body = ErrorResponse),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
        (status = 500, description = "An inspector failed", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn scan(State(state): State<AppState>, payload: std::result::Result<Json<RawCredentials>, JsonRejection>) -> Result<Json<ComplianceReport>> {
    let Json(raw) = payload?;
    let report = run_scan(&state.backends, &state.validator, &raw).await?;
    Ok(Json(report))
}
