mod client;
mod history;
pub mod prompt;
mod stream;
mod tool_def;
pub mod types;

use reqwest::StatusCode;
use thiserror::Error;

pub use client::*;
pub use history::*;
pub use stream::*;
pub use tool_def::*;
pub use types::*;

/// Coarse classification of LLM transport failures. Drives the retry
/// decision and lets callers distinguish cancellation from real errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmErrorKind {
    #[error("rate limited")]
    RateLimited,
    #[error("server error")]
    Server,
    #[error("network error")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("client error")]
    Client,
    #[error("deserialize error")]
    Deserialize,
    #[error("cancelled")]
    Cancelled,
    #[error("unknown error")]
    Unknown,
}

pub fn classify_error(status: Option<StatusCode>, err: &anyhow::Error) -> LlmErrorKind {
    if let Some(kind) = err.downcast_ref::<LlmErrorKind>() {
        return kind.clone();
    }
    if let Some(st) = status {
        if st == StatusCode::TOO_MANY_REQUESTS {
            return LlmErrorKind::RateLimited;
        }
        if st.is_server_error() {
            return LlmErrorKind::Server;
        }
        if st.is_client_error() {
            return LlmErrorKind::Client;
        }
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() {
            return LlmErrorKind::Timeout;
        }
        if e.is_connect() || e.is_body() || e.is_request() {
            return LlmErrorKind::Network;
        }
        if e.is_decode() {
            return LlmErrorKind::Deserialize;
        }
    }
    LlmErrorKind::Unknown
}

pub fn should_retry(kind: &LlmErrorKind) -> bool {
    matches!(
        kind,
        LlmErrorKind::RateLimited
            | LlmErrorKind::Server
            | LlmErrorKind::Network
            | LlmErrorKind::Timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classifies_http_status() {
        let err = anyhow!("whatever");
        assert_eq!(
            classify_error(Some(StatusCode::TOO_MANY_REQUESTS), &err),
            LlmErrorKind::RateLimited
        );
        assert_eq!(
            classify_error(Some(StatusCode::INTERNAL_SERVER_ERROR), &err),
            LlmErrorKind::Server
        );
        assert_eq!(
            classify_error(Some(StatusCode::BAD_REQUEST), &err),
            LlmErrorKind::Client
        );
    }

    #[test]
    fn retry_policy_matches_classification() {
        assert!(should_retry(&LlmErrorKind::RateLimited));
        assert!(should_retry(&LlmErrorKind::Server));
        assert!(should_retry(&LlmErrorKind::Timeout));
        assert!(!should_retry(&LlmErrorKind::Client));
        assert!(!should_retry(&LlmErrorKind::Cancelled));
    }

    #[test]
    fn embedded_kind_wins_over_status() {
        let err = anyhow!(LlmErrorKind::Cancelled);
        assert_eq!(
            classify_error(Some(StatusCode::INTERNAL_SERVER_ERROR), &err),
            LlmErrorKind::Cancelled
        );
    }
}
