use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::report::{Analysis, ComplianceReport};

/// A question about a previously produced report.
///
/// Both fields are optional at the wire level so that a missing one produces the
/// usual `{"error": ...}` body rather than a deserialization rejection.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[schema(value_type = Option<ComplianceReport>)]
    pub report: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    #[schema(value_type = Option<ComplianceReport>)]
    pub report: Option<Value>,
}
