//! Per-request project credentials and the validator that gates every upstream call.
//!
//! Credentials are supplied by the caller with each request and live only as long as
//! the request does. Nothing in this module performs I/O; validation must complete
//! before any inspector or remediation backend is touched.

use std::fmt;

use serde::Deserialize;
use url::Url;
use utoipa::ToSchema;

use crate::config::CredentialPolicy;
use crate::errors::{Error, Result};
use crate::types::ProjectRef;

const SERVICE_ROLE_KEY_PREFIX: &str = "eyJ";
const MANAGEMENT_TOKEN_PREFIX: &str = "sbp_";

/// Credential bundle exactly as the caller sent it. Every field is optional here so
/// that missing fields can be reported together.
#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawCredentials {
    /// Project endpoint, e.g. `https://abcd1234.supabase.co`
    #[serde(alias = "endpointUrl")]
    pub supabase_url: Option<String>,
    /// Service role key for the identity admin API
    pub service_role_key: Option<String>,
    /// Password of the `postgres` database user
    #[serde(alias = "databasePassword")]
    pub db_password: Option<String>,
    /// Personal access token for the management API
    pub management_token: Option<String>,
}

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("supabase_url", &self.supabase_url)
            .field("service_role_key", &redacted(&self.service_role_key))
            .field("db_password", &redacted(&self.db_password))
            .field("management_token", &redacted(&self.management_token))
            .finish()
    }
}

fn redacted(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<missing>",
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// A validated credential bundle.
#[derive(Clone)]
pub struct Credentials {
    pub endpoint: Url,
    pub project_ref: ProjectRef,
    pub service_role_key: String,
    pub db_password: String,
    pub management_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint.as_str())
            .field("project_ref", &self.project_ref)
            .finish_non_exhaustive()
    }
}

/// Database access derived from a credential bundle.
#[derive(Clone)]
pub struct DatabaseAccess {
    pub project_ref: ProjectRef,
    pub password: String,
}

impl fmt::Debug for DatabaseAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseAccess")
            .field("project_ref", &self.project_ref)
            .finish_non_exhaustive()
    }
}

/// Management API access derived from a credential bundle.
#[derive(Clone)]
pub struct ManagementAccess {
    pub project_ref: ProjectRef,
    pub token: String,
}

impl fmt::Debug for ManagementAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementAccess")
            .field("project_ref", &self.project_ref)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn database_access(&self) -> DatabaseAccess {
        DatabaseAccess {
            project_ref: self.project_ref.clone(),
            password: self.db_password.clone(),
        }
    }

    pub fn management_access(&self) -> ManagementAccess {
        ManagementAccess {
            project_ref: self.project_ref.clone(),
            token: self.management_token.clone(),
        }
    }
}

/// Checks credential shape: presence, then endpoint syntax, then key prefixes.
#[derive(Debug, Clone, Copy)]
pub struct CredentialValidator {
    enforce_key_prefixes: bool,
}

impl CredentialValidator {
    pub fn new(policy: &CredentialPolicy) -> Self {
        Self {
            enforce_key_prefixes: policy.enforce_key_prefixes,
        }
    }

    /// Validate the full bundle required for a scan.
    pub fn validate(&self, raw: &RawCredentials) -> Result<Credentials> {
        let endpoint = present(&raw.supabase_url);
        let service_role_key = present(&raw.service_role_key);
        let db_password = present(&raw.db_password);
        let management_token = present(&raw.management_token);

        let (Some(endpoint), Some(service_role_key), Some(db_password), Some(management_token)) =
            (endpoint, service_role_key, db_password, management_token)
        else {
            return Err(Error::MissingCredentials {
                fields: missing_fields(raw, &[Field::Endpoint, Field::ServiceRoleKey, Field::DbPassword, Field::ManagementToken]),
            });
        };

        let endpoint = parse_endpoint(endpoint)?;
        let project_ref = ProjectRef::from_endpoint(&endpoint)?;
        self.check_service_role_key(service_role_key)?;
        self.check_management_token(management_token)?;

        Ok(Credentials {
            endpoint,
            project_ref,
            service_role_key: service_role_key.to_string(),
            db_password: db_password.to_string(),
            management_token: management_token.to_string(),
        })
    }

    /// Validate only what a direct database action needs.
    pub fn validate_database_access(&self, raw: &RawCredentials) -> Result<DatabaseAccess> {
        let (Some(endpoint), Some(password)) = (present(&raw.supabase_url), present(&raw.db_password)) else {
            return Err(Error::MissingCredentials {
                fields: missing_fields(raw, &[Field::Endpoint, Field::DbPassword]),
            });
        };

        let endpoint = parse_endpoint(endpoint)?;
        Ok(DatabaseAccess {
            project_ref: ProjectRef::from_endpoint(&endpoint)?,
            password: password.to_string(),
        })
    }

    /// Validate only what a management API action needs.
    pub fn validate_management_access(&self, raw: &RawCredentials) -> Result<ManagementAccess> {
        let (Some(endpoint), Some(token)) = (present(&raw.supabase_url), present(&raw.management_token)) else {
            return Err(Error::MissingCredentials {
                fields: missing_fields(raw, &[Field::Endpoint, Field::ManagementToken]),
            });
        };

        let endpoint = parse_endpoint(endpoint)?;
        let project_ref = ProjectRef::from_endpoint(&endpoint)?;
        self.check_management_token(token)?;

        Ok(ManagementAccess {
            project_ref,
            token: token.to_string(),
        })
    }

    fn check_service_role_key(&self, key: &str) -> Result<()> {
        if self.enforce_key_prefixes && !key.starts_with(SERVICE_ROLE_KEY_PREFIX) {
            return Err(Error::InvalidKeyFormat {
                credential: "service role key",
            });
        }
        Ok(())
    }

    fn check_management_token(&self, token: &str) -> Result<()> {
        if self.enforce_key_prefixes && !token.starts_with(MANAGEMENT_TOKEN_PREFIX) {
            return Err(Error::InvalidKeyFormat {
                credential: "management token",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Field {
    Endpoint,
    ServiceRoleKey,
    DbPassword,
    ManagementToken,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Endpoint => "supabaseUrl",
            Field::ServiceRoleKey => "serviceRoleKey",
            Field::DbPassword => "dbPassword",
            Field::ManagementToken => "managementToken",
        }
    }

    fn value(self, raw: &RawCredentials) -> &Option<String> {
        match self {
            Field::Endpoint => &raw.supabase_url,
            Field::ServiceRoleKey => &raw.service_role_key,
            Field::DbPassword => &raw.db_password,
            Field::ManagementToken => &raw.management_token,
        }
    }
}

fn missing_fields(raw: &RawCredentials, fields: &[Field]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|field| present(field.value(raw)).is_none())
        .map(|field| field.name())
        .collect()
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint.trim()).map_err(|e| Error::InvalidEndpoint { reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidEndpoint {
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RawCredentials {
        RawCredentials {
            supabase_url: Some("https://abcd1234.supabase.co".to_string()),
            service_role_key: Some("eyJhbGciOiJIUzI1NiJ9.test".to_string()),
            db_password: Some("hunter2".to_string()),
            management_token: Some("sbp_0123456789".to_string()),
        }
    }

    fn strict() -> CredentialValidator {
        CredentialValidator::new(&CredentialPolicy::default())
    }

    #[test]
    fn test_valid_bundle() {
        let credentials = strict().validate(&full()).unwrap();
        assert_eq!(credentials.project_ref.as_str(), "abcd1234");
        assert_eq!(credentials.endpoint.host_str(), Some("abcd1234.supabase.co"));
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let raw = RawCredentials {
            db_password: Some("   ".to_string()),
            management_token: None,
            ..full()
        };

        match strict().validate(&raw) {
            Err(Error::MissingCredentials { fields }) => assert_eq!(fields, vec!["dbPassword", "managementToken"]),
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }

    #[test]
    fn test_presence_checked_before_url() {
        let raw = RawCredentials {
            supabase_url: Some("not a url".to_string()),
            service_role_key: None,
            ..full()
        };
        assert!(matches!(strict().validate(&raw), Err(Error::MissingCredentials { .. })));
    }

    #[test]
    fn test_invalid_endpoint() {
        for bad in ["not a url", "abcd1234.supabase.co", "ftp://abcd1234.supabase.co"] {
            let raw = RawCredentials {
                supabase_url: Some(bad.to_string()),
                ..full()
            };
            assert!(
                matches!(strict().validate(&raw), Err(Error::InvalidEndpoint { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_prefixes_enforced() {
        let raw = RawCredentials {
            service_role_key: Some("service-key".to_string()),
            ..full()
        };
        assert!(matches!(
            strict().validate(&raw),
            Err(Error::InvalidKeyFormat {
                credential: "service role key"
            })
        ));

        let raw = RawCredentials {
            management_token: Some("token".to_string()),
            ..full()
        };
        assert!(matches!(
            strict().validate(&raw),
            Err(Error::InvalidKeyFormat {
                credential: "management token"
            })
        ));
    }

    #[test]
    fn test_key_prefixes_can_be_relaxed() {
        let lenient = CredentialValidator::new(&CredentialPolicy {
            enforce_key_prefixes: false,
        });
        let raw = RawCredentials {
            service_role_key: Some("service-key".to_string()),
            management_token: Some("token".to_string()),
            ..full()
        };
        assert!(lenient.validate(&raw).is_ok());
    }

    #[test]
    fn test_partial_validation() {
        let raw = RawCredentials {
            supabase_url: Some("https://abcd1234.supabase.co".to_string()),
            db_password: Some("hunter2".to_string()),
            ..Default::default()
        };

        let database = strict().validate_database_access(&raw).unwrap();
        assert_eq!(database.project_ref.as_str(), "abcd1234");

        match strict().validate_management_access(&raw) {
            Err(Error::MissingCredentials { fields }) => assert_eq!(fields, vec!["managementToken"]),
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let raw = full();
        let rendered = format!("{raw:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("sbp_0123456789"));

        let credentials = strict().validate(&raw).unwrap();
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("abcd1234.supabase.co"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("eyJ"));
    }

    #[test]
    fn test_deserializes_both_field_spellings() {
        let raw: RawCredentials = serde_json::from_value(serde_json::json!({
            "endpointUrl": "https://abcd1234.supabase.co",
            "serviceRoleKey": "eyJ",
            "databasePassword": "pw",
            "managementToken": "sbp_x"
        }))
        .unwrap();
        assert!(strict().validate(&raw).is_ok());
    }
}
