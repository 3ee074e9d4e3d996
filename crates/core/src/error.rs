use std::time::Duration;
use thiserror::Error;

/// A request that is malformed before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("text posts require non-empty content")]
    EmptyText,
    #[error("poll question must not be empty")]
    EmptyPollQuestion,
    #[error("poll requires at least 2 options, got {0}")]
    TooFewPollOptions(usize),
    #[error("album requires at least 2 media items, got {0}")]
    AlbumTooSmall(usize),
    #[error("album holds at most {max} media items, got {got}")]
    AlbumTooLarge { got: usize, max: usize },
    #[error("invalid channel handle: {0:?}")]
    InvalidHandle(String),
    #[error("unknown post type: {0}")]
    UnknownPostType(String),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transport-level failure; the provider may never have seen the request.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered and rejected the request.
    #[error("provider rejected request ({code}): {description}")]
    Provider {
        code: i64,
        description: String,
        retry_after: Option<u64>,
    },

    #[error("unresolved media reference: {reference}")]
    UnresolvedMedia { reference: String },

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// A multi-message send stopped after some messages went out. Never
    /// retried: the delivered items would be posted again.
    #[error("delivery stopped after {delivered} message(s): {source}")]
    Partial {
        delivered: usize,
        #[source]
        source: Box<DeliveryError>,
    },
}

impl DeliveryError {
    pub fn provider(code: i64, description: impl Into<String>) -> Self {
        DeliveryError::Provider {
            code,
            description: description.into(),
            retry_after: None,
        }
    }

    /// Whether the post should stay `pending` for a later sweep.
    ///
    /// Rate limits and provider-side 5xx are transient; every other provider
    /// rejection is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Validation(_) => false,
            DeliveryError::Network(_) => true,
            DeliveryError::Timeout(_) => true,
            DeliveryError::UnresolvedMedia { .. } => true,
            DeliveryError::Partial { .. } => false,
            DeliveryError::Provider {
                code, retry_after, ..
            } => *code == 429 || *code >= 500 || retry_after.is_some(),
        }
    }

    /// Short, stable label used in logs and outcome records.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Validation(_) => "validation",
            DeliveryError::Network(_) => "network",
            DeliveryError::Provider { .. } => "provider",
            DeliveryError::UnresolvedMedia { .. } => "unresolved_media",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Partial { .. } => "partial",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_timeout_are_retryable() {
        assert!(DeliveryError::Network("connection reset".into()).is_retryable());
        assert!(DeliveryError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(DeliveryError::UnresolvedMedia {
            reference: "blob:abc".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = DeliveryError::Provider {
            code: 429,
            description: "Too Many Requests: retry after 5".into(),
            retry_after: Some(5),
        };
        assert!(err.is_retryable());
        assert!(DeliveryError::provider(502, "Bad Gateway").is_retryable());
    }

    #[test]
    fn test_permanent_rejections() {
        assert!(!DeliveryError::provider(400, "Bad Request: chat not found").is_retryable());
        assert!(!DeliveryError::provider(403, "Forbidden: bot is not a member").is_retryable());
        assert!(!DeliveryError::from(ValidationError::TooFewPollOptions(1)).is_retryable());
    }

    #[test]
    fn test_partial_delivery_is_never_retried() {
        let err = DeliveryError::Partial {
            delivered: 1,
            source: Box::new(DeliveryError::provider(502, "Bad Gateway")),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "partial");
        assert_eq!(
            err.to_string(),
            "delivery stopped after 1 message(s): provider rejected request (502): Bad Gateway"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = DeliveryError::provider(400, "Bad Request: chat not found");
        assert_eq!(
            err.to_string(),
            "provider rejected request (400): Bad Request: chat not found"
        );
        assert_eq!(
            StoreError::not_found("post", "post_1").to_string(),
            "post not found: post_1"
        );
    }
}
