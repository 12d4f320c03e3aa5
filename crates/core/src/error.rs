//! Shared error taxonomy for the RAG core.
//!
//! Every crate defines its own `thiserror` enum and converts into this one
//! at its boundary.

use serde::{Deserialize, Serialize};

/// Stable machine-readable error kind, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    ProviderAuth,
    ProviderRateLimit,
    ProviderTransient,
    ProviderPermanent,
    Quality,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("provider credentials invalid: {0}")]
    ProviderAuth(String),

    #[error("provider rate limited: {0}")]
    ProviderRateLimit(String),

    #[error("provider transient failure: {0}")]
    ProviderTransient(String),

    #[error("provider permanent failure: {0}")]
    ProviderPermanent(String),

    #[error("quality threshold not reached after retries")]
    Quality,

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Permission(_) => ErrorKind::Permission,
            Error::ProviderAuth(_) => ErrorKind::ProviderAuth,
            Error::ProviderRateLimit(_) => ErrorKind::ProviderRateLimit,
            Error::ProviderTransient(_) => ErrorKind::ProviderTransient,
            Error::ProviderPermanent(_) => ErrorKind::ProviderPermanent,
            Error::Quality => ErrorKind::Quality,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Classification used by the CoT retry loop: is this worth retrying?
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProviderRateLimit(_) | Error::ProviderTransient(_)
        )
    }

    pub fn is_permanent_provider_failure(&self) -> bool {
        matches!(self, Error::ProviderPermanent(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::ProviderRateLimit("429".into()).is_transient());
        assert!(Error::ProviderTransient("timeout".into()).is_transient());
        assert!(!Error::ProviderPermanent("bad request".into()).is_transient());
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(Error::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Quality.kind(), ErrorKind::Quality);
    }
}
