//! Error types for the compliance core.

use thiserror::Error;

/// Compliance-specific errors.
///
/// Most of these originate in collaborators (the server connection in
/// particular) and are logged rather than surfaced by `load`.
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// The entitlement authority could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The consumer credentials were rejected.
    #[error("unauthorized: invalid credentials for request")]
    Unauthorized,

    /// The consumer is not allowed to perform the request.
    #[error("forbidden: invalid credentials for request")]
    Forbidden,

    /// The consumer identity certificate has expired.
    #[error("identity certificate has expired")]
    ExpiredIdentity,

    /// The authority answered with a server-side failure.
    #[error("remote server error (HTTP error code {code})")]
    RemoteServer { code: u16 },

    /// The authority is throttling this consumer.
    #[error("server rate limit exceeded{}", retry_after.map(|s| format!(" (expires in {s} seconds)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// A local certificate could not be used.
    #[error("bad certificate: {0}")]
    BadCertificate(String),

    /// The operation requires a registered consumer.
    #[error("system is not registered")]
    NotRegistered,

    /// A local directory watch could not be set up.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid value in a shared type.
    #[error(transparent)]
    Types(#[from] entitle_types::Error),
}

impl ComplianceError {
    /// Returns true if the error means the consumer identity is unusable.
    ///
    /// These failures are recoverable: re-registration or an identity
    /// refresh fixes them, so best-effort operations swallow them.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden | Self::ExpiredIdentity
        )
    }
}

/// Result type for compliance operations.
pub type ComplianceResult<T> = Result<T, ComplianceError>;
