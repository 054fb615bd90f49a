//! HTTP access to the statistics API.

mod client;
mod error;

pub use client::{ApiClient, Fetch};
pub use error::{json_kind, FetchError};

/// A row returned by a table endpoint.
pub type Row = serde_json::Value;
