//! Management API client: project settings and the PITR switch.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use super::ManagementApi;
use super::http::{build_client, failure_of, join};
use crate::config::ManagementConfig;
use crate::credentials::ManagementAccess;
use crate::errors::{Error, Result};
use crate::report::ProjectRecord;
use crate::types::ProjectRef;

const PITR_SETTING: &str = "point_in_time_recovery_enabled";

/// Build a project record from a settings payload. Missing fields fall back to the
/// project ref for the name and `false` for PITR.
pub fn project_record(project_ref: &ProjectRef, settings: &Value) -> ProjectRecord {
    ProjectRecord {
        project_id: project_ref.to_string(),
        name: settings
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(project_ref.as_str())
            .to_string(),
        pitr_enabled: settings.get(PITR_SETTING).and_then(Value::as_bool).unwrap_or(false),
    }
}

/// The concrete implementation of [`ManagementApi`].
pub struct ManagementApiReqwest {
    client: Client,
    base_url: Url,
}

impl ManagementApiReqwest {
    pub fn new(config: &ManagementConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.request_timeout)?,
            base_url: config.base_url.clone(),
        })
    }

    fn project_url(&self, project_ref: &ProjectRef) -> std::result::Result<Url, url::ParseError> {
        join(&self.base_url, &format!("v1/projects/{project_ref}"))
    }
}

#[async_trait]
impl ManagementApi for ManagementApiReqwest {
    #[instrument(skip_all, fields(project_ref = %access.project_ref))]
    async fn project_settings(&self, access: &ManagementAccess) -> Result<ProjectRecord> {
        let url = self.project_url(&access.project_ref).map_err(|e| Error::ProjectSettingsFetch {
            status: None,
            message: format!("could not build project URL: {e}"),
        })?;

        debug!("Fetching project settings from {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&access.token)
            .send()
            .await
            .map_err(|e| Error::ProjectSettingsFetch {
                status: None,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let (status, message) = failure_of(response, "Failed to fetch project settings").await;
            return Err(Error::ProjectSettingsFetch {
                status: Some(status),
                message,
            });
        }

        let settings: Value = response.json().await.map_err(|e| Error::ProjectSettingsFetch {
            status: None,
            message: format!("error decoding response body: {e}"),
        })?;

        let record = project_record(&access.project_ref, &settings);
        info!(pitr_enabled = record.pitr_enabled, "Fetched project settings");
        Ok(record)
    }

    #[instrument(skip_all, fields(project_ref = %access.project_ref))]
    async fn enable_point_in_time_recovery(&self, access: &ManagementAccess) -> Result<()> {
        let url = self.project_url(&access.project_ref).map_err(|e| Error::RemediationFailed {
            status: None,
            message: format!("Failed to enable PITR: could not build project URL: {e}"),
        })?;

        let response = self
            .client
            .patch(url)
            .bearer_auth(&access.token)
            .json(&json!({ PITR_SETTING: true }))
            .send()
            .await
            .map_err(|e| Error::RemediationFailed {
                status: None,
                message: format!("Failed to enable PITR: {e}"),
            })?;

        if !response.status().is_success() {
            let (status, message) = failure_of(response, "request rejected").await;
            return Err(Error::RemediationFailed {
                status: Some(status),
                message: format!("Failed to enable PITR: {message}"),
            });
        }

        info!("Point-in-time recovery enabled");
        Ok(())
    }
}
