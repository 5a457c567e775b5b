//! # scanctl: compliance scanning for managed Postgres projects
//!
//! `scanctl` audits a single hosted Postgres project (Supabase style: an identity
//! service, a management API and a directly reachable database) for three controls:
//!
//! - **MFA**: how many users have a second factor registered
//! - **RLS**: how many tables in the `public` schema have row-level security enabled
//! - **PITR**: whether point-in-time recovery is switched on for the project
//!
//! It reports per-category and overall scores, turns shortfalls into findings,
//! applies one-click fixes, and can hand a report to a text-generation service for a
//! written analysis.
//!
//! ## Request Flow
//!
//! Every request carries the project's credentials; nothing is stored between
//! requests. A scan validates the credential bundle ([`credentials`]), runs the three
//! inspectors concurrently ([`inspectors`]), and folds their output into a
//! [`report::ComplianceReport`]. Fixes ([`remediation`]) and chat ([`narrative`]) are
//! independent follow-up calls made by the front-end.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use scanctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = scanctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     scanctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`config`] for the file format and environment overrides.

pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod inspectors;
pub mod narrative;
pub mod openapi;
pub mod remediation;
pub mod report;
pub mod scan;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{self, HeaderValue, Method},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bon::Builder;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

pub use config::Config;

use crate::api::handlers::method_not_allowed;
use crate::credentials::CredentialValidator;
use crate::errors::ErrorDetails;
use crate::inspectors::Backends;
use crate::narrative::{NarrativeAnalyzer, OpenAiCompatibleClient};
use crate::openapi::ApiDoc;

/// Shared state handed to every handler.
///
/// Everything here is built once at startup and is read-only afterwards; request
/// credentials never end up in it.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub backends: Backends,
    pub validator: CredentialValidator,
    pub narrator: Arc<NarrativeAnalyzer>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors
            .allowed_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST])
        .allow_headers([http::header::CONTENT_TYPE]))
}

/// Adds the error chain to error bodies when `expose_error_details` is on.
async fn error_details_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    if !state.config.expose_error_details {
        return response;
    }

    match response.extensions_mut().remove::<ErrorDetails>() {
        Some(details) => (
            response.status(),
            Json(json!({ "error": details.message, "details": details.trace })),
        )
            .into_response(),
        None => response,
    }
}

/// Build the application router.
///
/// - `GET /healthz`
/// - `GET /api-docs/openapi.json`
/// - `POST /api/{scan,fix,chat,analyze}`, with a 405 fallback for other methods
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/scan", post(api::handlers::scan::scan).fallback(method_not_allowed))
        .route("/fix", post(api::handlers::fix::fix).fallback(method_not_allowed))
        .route("/chat", post(api::handlers::analysis::chat).fallback(method_not_allowed))
        .route("/analyze", post(api::handlers::analysis::analyze).fallback(method_not_allowed))
        .layer(from_fn_with_state(state.clone(), error_details_middleware));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The HTTP service and the configuration it was built from.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create the production clients and build the router.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting scanctl with configuration: {:#?}", config);

        let backends = Backends::from_config(&config)?;
        let generator = Arc::new(OpenAiCompatibleClient::new(&config.narrative)?);

        let state = AppState::builder()
            .validator(CredentialValidator::new(&config.credentials))
            .backends(backends)
            .narrator(Arc::new(NarrativeAnalyzer::new(generator)?))
            .config(config)
            .build();

        Self::from_state(state)
    }

    /// Build the application around an existing state.
    pub fn from_state(state: AppState) -> anyhow::Result<Self> {
        let config = state.config.clone();
        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "scanctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
