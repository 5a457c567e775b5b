use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Technical error chain. Only present when the server exposes error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
