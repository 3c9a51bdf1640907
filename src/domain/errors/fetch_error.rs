//! Image fetch error types.

use thiserror::Error;

/// Result type for image fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Errors surfaced to callers of an image fetch.
///
/// Persistent-tier failures never appear here; they demote the cache to
/// memory-only operation instead of failing the request.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum FetchError {
    #[error("malformed image url {url:?}: {reason}")]
    MalformedRequest { url: String, reason: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("decode error: {message}")]
    Decode { message: String },
}

impl FetchError {
    /// Creates malformed request error.
    #[must_use]
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRequest {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns whether the request itself was unusable.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedRequest { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(FetchError::network("timeout").is_recoverable());
        assert!(!FetchError::decode("truncated").is_recoverable());
        assert!(FetchError::malformed("nope", "relative URL").is_malformed());
    }

    #[test]
    fn test_display_includes_url() {
        let err = FetchError::malformed("ht!tp://", "invalid scheme");
        assert!(err.to_string().contains("ht!tp://"));
    }
}
