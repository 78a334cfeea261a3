//! Core type definitions for entitlement compliance.
//!
//! This crate defines the small value types shared by everything that
//! reasons about entitlements:
//! - Product, stack and consumer identifiers
//! - Certificate validity ranges
//! - Server timestamp parsing
//!
//! Compliance logic itself lives in `entitle-compliance`.

mod ids;
mod validity;

pub use ids::{ConsumerId, ProductId, StackId};
pub use validity::{parse_server_date, ValidityRange, OVERFLOW_FALLBACK_DATE};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid validity range: begin {begin} is after end {end}")]
    InvalidRange { begin: String, end: String },
}
