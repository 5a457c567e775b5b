//! Small domain types shared across the scan and remediation paths.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::errors::Error;

/// The three compliance controls we inspect and know how to remediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FindingCategory {
    #[serde(rename = "MFA")]
    Mfa,
    #[serde(rename = "RLS")]
    Rls,
    #[serde(rename = "PITR")]
    Pitr,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 3] = [FindingCategory::Mfa, FindingCategory::Rls, FindingCategory::Pitr];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::Mfa => "MFA",
            FindingCategory::Rls => "RLS",
            FindingCategory::Pitr => "PITR",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FindingCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MFA" => Ok(FindingCategory::Mfa),
            "RLS" => Ok(FindingCategory::Rls),
            "PITR" => Ok(FindingCategory::Pitr),
            other => Err(Error::UnknownFindingCategory {
                category: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// Short project identifier embedded in the endpoint hostname, e.g. `abcd1234` in
/// `https://abcd1234.supabase.co`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ProjectRef(String);

impl ProjectRef {
    /// Takes the first label of the endpoint host.
    pub fn from_endpoint(endpoint: &Url) -> Result<Self, Error> {
        let host = endpoint.host_str().ok_or_else(|| Error::InvalidEndpoint {
            reason: "URL has no host".to_string(),
        })?;

        match host.split('.').next() {
            Some(label) if !label.is_empty() => Ok(Self(label.to_string())),
            _ => Err(Error::InvalidEndpoint {
                reason: format!("could not extract project reference from host {host}"),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static SAFE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

/// A table name that passed the identifier allow-list.
///
/// Identifiers cannot be bound as query parameters, so this type is the only thing
/// the RLS statement builder accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentifier(String);

impl TableIdentifier {
    pub fn parse(candidate: &str) -> Result<Self, Error> {
        if SAFE_IDENTIFIER.is_match(candidate) {
            Ok(Self(candidate.to_string()))
        } else {
            Err(Error::UnsafeIdentifier {
                identifier: candidate.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
