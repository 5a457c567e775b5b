//! Identity admin API client.
//!
//! The admin user listing has been observed to come back in three layouts depending on
//! the platform version: a bare array, `{"users": [...]}`, or `{"data": [...]}`. Anything
//! else is treated as "no users" rather than an error; see [`UserListShape`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use super::IdentityApi;
use super::http::{build_client, failure_of, join};
use crate::config::IdentityConfig;
use crate::errors::{Error, Result};
use crate::report::UserRecord;

const ADMIN_USERS_PATH: &str = "auth/v1/admin/users";

/// The layout a user listing arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum UserListShape {
    /// `[...]`
    Bare(Vec<Value>),
    /// `{"users": [...]}`
    Users(Vec<Value>),
    /// `{"data": [...]}`
    Data(Vec<Value>),
    /// Anything else. Normalizes to an empty list.
    Unrecognized,
}

impl UserListShape {
    pub fn classify(payload: Value) -> Self {
        match payload {
            Value::Array(items) => UserListShape::Bare(items),
            Value::Object(mut map) => match (map.remove("users"), map.remove("data")) {
                (Some(Value::Array(items)), _) => UserListShape::Users(items),
                (_, Some(Value::Array(items))) => UserListShape::Data(items),
                _ => UserListShape::Unrecognized,
            },
            _ => UserListShape::Unrecognized,
        }
    }

    pub fn into_entries(self) -> Vec<Value> {
        match self {
            UserListShape::Bare(items) | UserListShape::Users(items) | UserListShape::Data(items) => items,
            UserListShape::Unrecognized => Vec::new(),
        }
    }
}

/// Normalize a whole listing payload into user records.
pub fn parse_users(payload: Value) -> Vec<UserRecord> {
    let shape = UserListShape::classify(payload);
    if shape == UserListShape::Unrecognized {
        debug!("Unrecognized user listing shape, treating as empty");
    }
    shape.into_entries().iter().map(normalize_user).collect()
}

/// Build a record from one raw user entry. Missing or malformed fields never fail.
pub fn normalize_user(raw: &Value) -> UserRecord {
    let text = |key: &str| raw.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    let has_factor = raw.get("factors").and_then(Value::as_array).is_some_and(|factors| !factors.is_empty());
    let flagged = raw.get("mfa_enabled").and_then(Value::as_bool).unwrap_or(false);

    let last_sign_in = text("last_sign_in_at")
        .or_else(|| text("last_sign_in"))
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    UserRecord {
        id: text("id").unwrap_or("unknown").to_string(),
        email: text("email").unwrap_or("unknown").to_string(),
        mfa_enabled: has_factor || flagged,
        last_sign_in,
    }
}

/// The concrete implementation of [`IdentityApi`].
pub struct IdentityApiReqwest {
    client: Client,
}

impl IdentityApiReqwest {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.request_timeout)?,
        })
    }
}

#[async_trait]
impl IdentityApi for IdentityApiReqwest {
    #[instrument(skip_all, fields(host = endpoint.host_str().unwrap_or_default()))]
    async fn list_users(&self, endpoint: &Url, service_role_key: &str) -> Result<Vec<UserRecord>> {
        let url = join(endpoint, ADMIN_USERS_PATH).map_err(|e| Error::IdentityFetch {
            status: None,
            message: format!("could not build admin users URL: {e}"),
        })?;

        debug!("Fetching users from {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(service_role_key)
            .header("apikey", service_role_key)
            .send()
            .await
            .map_err(|e| Error::IdentityFetch {
                status: None,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let (status, message) = failure_of(response, "Failed to fetch users").await;
            return Err(Error::IdentityFetch {
                status: Some(status),
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| Error::IdentityFetch {
            status: None,
            message: format!("error decoding response body: {e}"),
        })?;

        let users = parse_users(payload);
        info!("Fetched {} users", users.len());
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::install_crypto_provider;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_data_shape_with_factor() {
        let users = parse_users(json!({ "data": [{ "id": "1", "email": "a@x.com", "factors": [{}] }] }));
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "1");
        assert_eq!(users[0].email, "a@x.com");
        assert!(users[0].mfa_enabled);
    }

    #[test]
    fn test_empty_and_unrecognized_shapes() {
        assert!(parse_users(json!([])).is_empty());
        assert!(parse_users(json!({})).is_empty());
        assert!(parse_users(json!({ "users": "nope" })).is_empty());
        assert!(parse_users(json!("users")).is_empty());
        assert!(parse_users(Value::Null).is_empty());
        assert_eq!(UserListShape::classify(json!({ "total": 3 })), UserListShape::Unrecognized);
    }

    #[test]
    fn test_all_listing_shapes_recognized() {
        let entry = json!({ "id": "1" });
        assert!(matches!(UserListShape::classify(json!([entry.clone()])), UserListShape::Bare(v) if v.len() == 1));
        assert!(matches!(UserListShape::classify(json!({ "users": [entry.clone()] })), UserListShape::Users(v) if v.len() == 1));
        assert!(matches!(UserListShape::classify(json!({ "data": [entry] })), UserListShape::Data(v) if v.len() == 1));
    }

    #[test]
    fn test_mfa_flag_derivation() {
        assert!(normalize_user(&json!({ "id": "1", "mfa_enabled": true })).mfa_enabled);
        assert!(!normalize_user(&json!({ "id": "1", "factors": [] })).mfa_enabled);
        assert!(!normalize_user(&json!({ "id": "1", "factors": null })).mfa_enabled);
        assert!(!normalize_user(&json!({ "id": "1", "factors": "totp", "mfa_enabled": "yes" })).mfa_enabled);
        assert!(!normalize_user(&json!({})).mfa_enabled);
    }

    #[test]
    fn test_missing_fields_default() {
        let user = normalize_user(&json!({ "id": 42, "last_sign_in_at": "yesterday" }));
        assert_eq!(user.id, "unknown");
        assert_eq!(user.email, "unknown");
        assert!(user.last_sign_in.is_none());

        let user = normalize_user(&json!({ "id": "1", "last_sign_in": "2024-05-01T12:00:00.123456Z" }));
        assert_eq!(user.last_sign_in.unwrap().to_rfc3339(), "2024-05-01T12:00:00.123456+00:00");
    }

    fn client() -> IdentityApiReqwest {
        install_crypto_provider();
        IdentityApiReqwest::new(&IdentityConfig {
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_users_sends_service_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(header("apikey", "eyJtest"))
            .and(header("authorization", "Bearer eyJtest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    { "id": "1", "email": "a@x.com", "factors": [{ "factor_type": "totp" }] },
                    { "id": "2", "email": "b@x.com" }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let users = client().list_users(&endpoint, "eyJtest").await.unwrap();

        assert_eq!(users.len(), 2);
        assert!(users[0].mfa_enabled);
        assert!(!users[1].mfa_enabled);
    }

    #[tokio::test]
    async fn test_list_users_surfaces_upstream_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid API key" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let err = client().list_users(&endpoint, "eyJbad").await.unwrap_err();

        match err {
            Error::IdentityFetch { status, message } => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected IdentityFetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_users_rejects_non_json_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let err = client().list_users(&endpoint, "eyJtest").await.unwrap_err();
        assert!(matches!(err, Error::IdentityFetch { status: None, .. }));
    }

    #[tokio::test]
    async fn test_list_users_network_failure() {
        // Nothing listens on port 1
        let endpoint = Url::parse("http://127.0.0.1:1").unwrap();
        let err = client().list_users(&endpoint, "eyJtest").await.unwrap_err();
        assert!(matches!(err, Error::IdentityFetch { status: None, .. }));
    }
}
