use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    AppState,
    api::models::errors::ErrorResponse,
    errors::ServerFailure,
    remediation::{FixOutcome, FixRequest, apply_fix},
};

#[utoipa::path(
    post,
    path = "/api/fix",
    tag = "compliance",
    summary = "Apply a fix",
    description = "Apply the corrective action for one finding: enable RLS on a table, enable PITR on the project, or send an MFA reminder. Only the credentials the chosen action needs are required.",
    request_body = FixRequest,
    responses(
        (status = 200, description = "Fix applied", body = FixOutcome),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
        (status = 500, description = "Unknown issue type, unsafe table name, missing credentials, or the backend rejected the change", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn fix(State(state): State<AppState>, payload: Result<Json<FixRequest>, JsonRejection>) -> Result<Json<FixOutcome>, ServerFailure> {
    let Json(request) = payload?;
    let outcome = apply_fix(&state.backends, &state.validator, &request).await?;
    Ok(Json(outcome))
}
