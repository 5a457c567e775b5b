use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// One or more required credential fields were absent or empty
    #[error("Missing required credentials: {}", fields.join(", "))]
    MissingCredentials { fields: Vec<&'static str> },

    /// The project endpoint URL could not be parsed
    #[error("Invalid Supabase URL format: {reason}")]
    InvalidEndpoint { reason: String },

    /// A key or token does not follow the platform's prefix convention
    #[error("Invalid {credential} format")]
    InvalidKeyFormat { credential: &'static str },

    /// The identity admin API could not be queried
    #[error("Failed to fetch users: {message}")]
    IdentityFetch { status: Option<u16>, message: String },

    /// The database catalog could not be queried
    #[error("Database connection failed: {message}")]
    SchemaFetch { message: String },

    /// The management API could not be queried for project settings
    #[error("Failed to fetch project settings: {message}")]
    ProjectSettingsFetch { status: Option<u16>, message: String },

    /// A report supplied by a caller is missing sections or is inconsistent
    #[error("Malformed report: {message}")]
    MalformedReportInput { message: String },

    /// A table name failed the identifier allow-list
    #[error("Invalid table name: {identifier:?}")]
    UnsafeIdentifier { identifier: String },

    /// The requested remediation category is not one we know how to fix
    #[error("Unknown issue type: {category}")]
    UnknownFindingCategory { category: String },

    /// A corrective action was rejected by the backend
    #[error("{message}")]
    RemediationFailed { status: Option<u16>, message: String },

    /// The text-generation service failed or returned nothing
    #[error("{message}")]
    NarrativeService { message: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error chain attached to error responses, surfaced to callers only when
/// `expose_error_details` is enabled.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub message: String,
    pub trace: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingCredentials { .. }
            | Error::InvalidEndpoint { .. }
            | Error::InvalidKeyFormat { .. }
            | Error::MalformedReportInput { .. }
            | Error::UnsafeIdentifier { .. }
            | Error::UnknownFindingCategory { .. }
            | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::IdentityFetch { .. }
            | Error::SchemaFetch { .. }
            | Error::ProjectSettingsFetch { .. }
            | Error::RemediationFailed { .. }
            | Error::NarrativeService { .. }
            | Error::Internal { .. }
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the message shown to callers. Upstream failures are passed through
    /// verbatim; only our own internal failures are masked.
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn trace(&self) -> String {
        match self {
            Error::Other(err) => format!("{err:?}"),
            other => format!("{other:?}"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::IdentityFetch { .. }
            | Error::SchemaFetch { .. }
            | Error::ProjectSettingsFetch { .. }
            | Error::RemediationFailed { .. }
            | Error::NarrativeService { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let details = ErrorDetails {
            message: self.user_message(),
            trace: self.trace(),
        };

        let mut response = (status, Json(json!({ "error": details.message }))).into_response();
        response.extensions_mut().insert(details);
        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest {
            message: rejection.body_text(),
        }
    }
}

/// Failure of an endpoint that answers every error with 500, whatever its cause.
/// The body and logging are those of the wrapped [`Error`].
#[derive(Debug)]
pub struct ServerFailure(pub Error);

impl From<Error> for ServerFailure {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ServerFailure {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.into())
    }
}

impl IntoResponse for ServerFailure {
    fn into_response(self) -> Response {
        let mut response = self.0.into_response();
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}
