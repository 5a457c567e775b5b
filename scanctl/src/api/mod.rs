//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for the `/api/*` endpoints
//! - **[`models`]**: Request/response data structures that are not domain types
//!
//! # API Structure
//!
//! - `POST /api/scan`: run a compliance scan with a credential bundle
//! - `POST /api/fix`: apply one corrective action
//! - `POST /api/chat`: ask the text-generation service about a report
//! - `POST /api/analyze`: structured analysis of a report, no text generation
//!
//! Every endpoint accepts only `POST`; other methods get `405` with `Allow: POST`.
//! Errors are returned as `{"error": "<message>"}`.

pub mod handlers;
pub mod models;
