//! API request/response models.

pub mod chat;
pub mod errors;
