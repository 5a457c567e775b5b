//! Helpers shared by the reqwest-backed clients.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Response};
use url::Url;

/// Build a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder().timeout(timeout).build().context("Failed to create HTTP client")
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends with `/`, so
/// `https://host/v1` joined with `projects` would otherwise lose the `v1`.
pub fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Join a relative path onto a base URL, keeping the base path.
pub fn join(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    ensure_slash(base).join(path.trim_start_matches('/'))
}

/// Pick a human-readable message out of an upstream error body: the JSON `message`
/// field, then `error`, then the raw text, then `fallback`.
pub fn upstream_message(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "msg"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()).filter(|m| !m.is_empty()) {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Status code and extracted message of a non-2xx response.
pub async fn failure_of(response: Response, fallback: &str) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status, body = %body, "Upstream returned an error response");
    (status, upstream_message(&body, fallback))
}
