//! Domain Errors
//!
//! User-facing rejections, dataset refresh failures and per-provider DNS
//! failures. None of these are fatal to the process.

use crate::domain::value_objects::RuleKind;
use std::time::Duration;
use thiserror::Error;

/// Rejections returned to the caller of a classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("invalid domain: {0:?}")]
    InvalidDomain(String),

    #[error("{0} is a .cn domain; .cn domains are always direct")]
    CnDomainRejected(String),

    #[error("{domain} is not eligible for a {kind} rule")]
    AdditionNotEligible { domain: String, kind: RuleKind },
}

/// Failure of one dataset refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("dataset fetch failed: {0}")]
    FetchFailed(String),

    #[error("dataset parse failed: {0}")]
    ParseFailed(String),
}

/// Failure of a single DNS provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server answered {0}")]
    ResponseCode(String),

    #[error("invalid query name: {0}")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_messages() {
        let err = ClassifyError::AdditionNotEligible {
            domain: "example.com".to_string(),
            kind: RuleKind::Proxy,
        };
        assert_eq!(err.to_string(), "example.com is not eligible for a proxy rule");

        let err = ClassifyError::CnDomainRejected("example.cn".to_string());
        assert!(err.to_string().contains("example.cn"));
    }

    #[test]
    fn test_dns_error_timeout_message() {
        let err = DnsError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }

    #[test]
    fn test_refresh_error_variants_distinct() {
        assert_ne!(
            RefreshError::FetchFailed("x".into()),
            RefreshError::ParseFailed("x".into())
        );
    }
}
