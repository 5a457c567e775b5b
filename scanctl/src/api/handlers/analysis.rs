use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        chat::{AnalyzeRequest, ChatRequest, ChatResponse},
        errors::ErrorResponse,
    },
    errors::{Error, Result, ServerFailure},
    report::{Analysis, ComplianceReport},
};

#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "analysis",
    summary = "Ask about a report",
    description = "Send a question together with a compliance report. The report is analyzed, rendered into a prompt, and answered by the configured text-generation service.",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Generated answer and the structured analysis", body = ChatResponse),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
        (status = 500, description = "Missing message or report, an inconsistent report, or the text-generation service failed", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<Json<ChatResponse>, ServerFailure> {
    let Json(request) = payload?;

    let message = request.message.filter(|m| !m.trim().is_empty());
    let (Some(message), Some(report)) = (message, request.report) else {
        return Err(Error::BadRequest {
            message: "Message and report data are required".to_string(),
        }
        .into());
    };

    let report = ComplianceReport::from_value(report)?;
    let narrative = state.narrator.narrate(&message, &report, Utc::now()).await?;

    Ok(Json(ChatResponse {
        response: narrative.response,
        analysis: narrative.analysis,
    }))
}

#[utoipa::path(
    post,
    path = "/api/analyze",
    tag = "analysis",
    summary = "Analyze a report",
    description = "Compute scores, findings grouped by severity, recommendations and per-category details for a report, without calling the text-generation service.",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Structured analysis", body = Analysis),
        (status = 400, description = "Missing or inconsistent report", body = ErrorResponse),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn analyze(payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>) -> Result<Json<Analysis>> {
    let Json(request) = payload?;
    let report = request.report.ok_or_else(|| Error::BadRequest {
        message: "Report data is required".to_string(),
    })?;

    let report = ComplianceReport::from_value(report)?;
    Ok(Json(Analysis::of(&report, Utc::now())?))
}
