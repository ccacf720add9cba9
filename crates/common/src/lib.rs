//! Shared identifier types used across the ingestion crates.

pub mod types;

pub use types::{OrderId, RecordKey};
