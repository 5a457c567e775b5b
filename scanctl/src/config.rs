//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` but can be specified via `-f` or the `SCANCTL_CONFIG` environment
//! variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration
//! 2. **Environment variables** - Variables prefixed with `SCANCTL_` override YAML values
//! 3. **GROQ_API_KEY / OPENAI_API_KEY** - Special case: sets `narrative.api_key` if present
//!
//! Nested values use double underscores, e.g. `SCANCTL_DATABASE__TLS=verify-full`.
//!
//! Credentials for the scanned projects are never part of this configuration: they
//! arrive with every request and are dropped when the request completes.

use std::{fmt, path::PathBuf, time::Duration};

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgSslMode;
use url::Url;

use crate::errors::Error;
use crate::types::ProjectRef;

/// Placeholder substituted with the project reference in `database.host_template`.
pub const PROJECT_REF_PLACEHOLDER: &str = "{project_ref}";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SCANCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Include the technical error chain in error responses. Leave off in production.
    pub expose_error_details: bool,
    /// Credential shape checks applied before any upstream call
    pub credentials: CredentialPolicy,
    /// Identity admin API client settings
    pub identity: IdentityConfig,
    /// Project management API client settings
    pub management: ManagementConfig,
    /// Direct database connection settings
    pub database: DatabaseConfig,
    /// Text-generation service used for narrative analysis
    pub narrative: NarrativeConfig,
    /// CORS settings for the browser front-end
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            enable_otel_export: false,
            expose_error_details: false,
            credentials: CredentialPolicy::default(),
            identity: IdentityConfig::default(),
            management: ManagementConfig::default(),
            database: DatabaseConfig::default(),
            narrative: NarrativeConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialPolicy {
    /// Require the `eyJ` service role key prefix and the `sbp_` management token prefix
    pub enforce_key_prefixes: bool,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            enforce_key_prefixes: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagementConfig {
    /// Base URL of the project management API
    pub base_url: Url,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.supabase.com".parse().expect("Failed to parse default management URL"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Certificate trust policy for the direct database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsPolicy {
    /// No TLS. Only meaningful for local development databases.
    Disable,
    /// Encrypted transport without certificate verification
    Require,
    /// Verify the certificate chain but not the hostname
    VerifyCa,
    /// Verify the certificate chain and the hostname
    VerifyFull,
}

impl From<TlsPolicy> for PgSslMode {
    fn from(policy: TlsPolicy) -> Self {
        match policy {
            TlsPolicy::Disable => PgSslMode::Disable,
            TlsPolicy::Require => PgSslMode::Require,
            TlsPolicy::VerifyCa => PgSslMode::VerifyCa,
            TlsPolicy::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Hostname pattern; `{project_ref}` is replaced with the project reference
    pub host_template: String,
    pub port: u16,
    pub user: String,
    pub name: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound on each statement, including time spent waiting for table locks
    #[serde(with = "humantime_serde")]
    pub statement_timeout: Duration,
    pub tls: TlsPolicy,
    /// Root certificate used with the `verify-ca` and `verify-full` policies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host_template: "db.{project_ref}.supabase.co".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            name: "postgres".to_string(),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(10),
            tls: TlsPolicy::Require,
            ca_cert_path: None,
        }
    }
}

impl DatabaseConfig {
    /// Database hostname for a project
    pub fn host_for(&self, project_ref: &ProjectRef) -> String {
        self.host_template.replace(PROJECT_REF_PLACEHOLDER, project_ref.as_str())
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NarrativeConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    pub base_url: Url,
    /// API key for the text-generation service. Chat requests fail when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1"
                .parse()
                .expect("Failed to parse default narrative URL"),
            api_key: None,
            model: "mixtral-8x7b-32768".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for NarrativeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the API from a browser. `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let timeouts = [
            ("identity.request_timeout", self.identity.request_timeout),
            ("management.request_timeout", self.management.request_timeout),
            ("database.connect_timeout", self.database.connect_timeout),
            ("database.statement_timeout", self.database.statement_timeout),
            ("narrative.request_timeout", self.narrative.request_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(Error::Internal {
                    operation: format!("Config validation: {name} must be greater than zero"),
                });
            }
        }

        if !self.database.host_template.contains(PROJECT_REF_PLACEHOLDER) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: database.host_template must contain the {PROJECT_REF_PLACEHOLDER} placeholder"
                ),
            });
        }

        if self.database.tls == TlsPolicy::Disable && self.database.ca_cert_path.is_some() {
            return Err(Error::Internal {
                operation: "Config validation: database.ca_cert_path is set but database.tls is 'disable'".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.narrative.temperature) {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: narrative.temperature ({}) must be between 0 and 2",
                    self.narrative.temperature
                ),
            });
        }

        if self.narrative.max_tokens == 0 {
            return Err(Error::Internal {
                operation: "Config validation: narrative.max_tokens cannot be 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // SCANCTL_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("SCANCTL_").ignore(&["CONFIG"]).split("__"))
            .merge(
                Env::raw()
                    .only(&["GROQ_API_KEY", "OPENAI_API_KEY"])
                    .map(|_| "narrative.api_key".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
