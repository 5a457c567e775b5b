//! OpenAPI documentation for the `/api/*` endpoints, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::{
    chat::{AnalyzeRequest, ChatRequest, ChatResponse},
    errors::ErrorResponse,
};
use crate::credentials::RawCredentials;
use crate::remediation::{FixOutcome, FixRequest, FixTarget};
use crate::report::{
    Analysis, AnalysisDetails, CategoryDetail, ComplianceReport, Finding, MfaSection, PitrSection, ProjectRecord, Risks,
    RlsSection, ScoreSet, TableRecord, UserRecord,
};
use crate::types::{FindingCategory, Severity};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "scanctl",
        description = "Compliance scanning for managed Postgres projects: MFA adoption, row-level security and point-in-time recovery."
    ),
    paths(
        api::handlers::scan::scan,
        api::handlers::fix::fix,
        api::handlers::analysis::chat,
        api::handlers::analysis::analyze,
    ),
    components(schemas(
        RawCredentials,
        ComplianceReport,
        MfaSection,
        RlsSection,
        PitrSection,
        UserRecord,
        TableRecord,
        ProjectRecord,
        FixRequest,
        FixTarget,
        FixOutcome,
        ChatRequest,
        ChatResponse,
        AnalyzeRequest,
        Analysis,
        AnalysisDetails,
        CategoryDetail,
        ScoreSet,
        Risks,
        Finding,
        FindingCategory,
        Severity,
        ErrorResponse,
    )),
    tags(
        (name = "compliance", description = "Scanning and remediation"),
        (name = "analysis", description = "Scores, findings and generated commentary for a report"),
    )
)]
pub struct ApiDoc;
