//! Error types for the generation providers.

use std::fmt;

use thiserror::Error;

/// Error returned by a text or speech provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure, timeout, rate limit or 5xx. Worth retrying later.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (bad credentials, quota, invalid
    /// input). Retrying the same request will not help.
    #[error("provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered but the response lacked the expected fields.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Coarse classification of a [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Unavailable,
    Rejected,
    Malformed,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Unavailable => write!(f, "provider_unavailable"),
            ProviderErrorKind::Rejected => write!(f, "provider_rejected"),
            ProviderErrorKind::Malformed => write!(f, "malformed_response"),
        }
    }
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Unavailable(_) => ProviderErrorKind::Unavailable,
            ProviderError::Rejected { .. } => ProviderErrorKind::Rejected,
            ProviderError::Malformed(_) => ProviderErrorKind::Malformed,
        }
    }

    /// Returns true if a client-side retry may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ProviderErrorKind::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(ProviderError::Unavailable("timeout".into()).is_retryable());
        assert!(!ProviderError::Rejected {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!ProviderError::Malformed("no choices".into()).is_retryable());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ProviderErrorKind::Unavailable.to_string(), "provider_unavailable");
        assert_eq!(ProviderErrorKind::Rejected.to_string(), "provider_rejected");
        assert_eq!(ProviderErrorKind::Malformed.to_string(), "malformed_response");
    }
}
