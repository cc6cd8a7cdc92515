//! Backend error classification
//!
//! Every failure from a generative backend is sorted into one of six kinds.
//! Each kind is either fatal (abort the whole extraction, never retry) or
//! not; rate limits and network failures are additionally transient and are
//! retried by [`crate::with_retry`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// Provider throttled the request
    RateLimit,
    /// Credentials rejected
    Auth,
    /// Account out of credit or quota
    Billing,
    /// Connection, timeout or server-side failure
    Network,
    /// Request rejected as malformed
    Request,
    /// Anything else
    Unknown,
}

impl BackendErrorKind {
    /// Fatal kinds abort the whole extraction without retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendErrorKind::Auth | BackendErrorKind::Billing)
    }

    /// Transient kinds are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendErrorKind::RateLimit | BackendErrorKind::Network)
    }

    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::RateLimit => "rate_limit",
            BackendErrorKind::Auth => "auth",
            BackendErrorKind::Billing => "billing",
            BackendErrorKind::Network => "network",
            BackendErrorKind::Request => "request",
            BackendErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from the generative backend
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error: {message}")]
pub struct BackendError {
    /// Classification
    pub kind: BackendErrorKind,

    /// Provider message
    pub message: String,

    /// Server-suggested wait before retrying, if any
    pub retry_after: Option<Duration>,
}

impl BackendError {
    /// Create a new error of the given kind
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Rate limited, optionally with a server-suggested wait
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(BackendErrorKind::RateLimit, message)
        }
    }

    /// Credentials rejected
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Auth, message)
    }

    /// Out of credit
    pub fn billing(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Billing, message)
    }

    /// Connection or server failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    /// A single call exceeded its deadline
    pub fn timeout(after: Duration) -> Self {
        Self::network(format!("call timed out after {:?}", after))
    }

    /// Malformed request
    pub fn request(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Request, message)
    }

    /// Unclassified failure
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unknown, message)
    }

    /// Whether this error must abort the whole extraction
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Whether this error is worth retrying
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Classify an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        let kind = match status {
            401 | 403 => BackendErrorKind::Auth,
            402 => BackendErrorKind::Billing,
            429 => BackendErrorKind::RateLimit,
            408 | 500..=599 => BackendErrorKind::Network,
            400..=499 if mentions_billing(&lowered) => BackendErrorKind::Billing,
            400..=499 => BackendErrorKind::Request,
            _ => BackendErrorKind::Unknown,
        };
        Self::new(kind, format!("HTTP {}: {}", status, body))
    }

    /// Classify a free-text provider message
    ///
    /// For providers that only surface strings. Billing is checked before
    /// rate limiting because quota messages often mention both.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let kind = if mentions_billing(&lowered) {
            BackendErrorKind::Billing
        } else if lowered.contains("rate limit") || lowered.contains("429") || lowered.contains("overloaded") {
            BackendErrorKind::RateLimit
        } else if lowered.contains("authentication")
            || lowered.contains("api key")
            || lowered.contains("unauthorized")
            || lowered.contains("401")
        {
            BackendErrorKind::Auth
        } else if lowered.contains("timeout")
            || lowered.contains("timed out")
            || lowered.contains("connection")
            || lowered.contains("network")
        {
            BackendErrorKind::Network
        } else if lowered.contains("invalid request") || lowered.contains("400") {
            BackendErrorKind::Request
        } else {
            BackendErrorKind::Unknown
        };
        Self::new(kind, message)
    }
}

fn mentions_billing(lowered: &str) -> bool {
    lowered.contains("billing") || lowered.contains("credit balance") || lowered.contains("insufficient_quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_transient_are_disjoint() {
        for kind in [
            BackendErrorKind::RateLimit,
            BackendErrorKind::Auth,
            BackendErrorKind::Billing,
            BackendErrorKind::Network,
            BackendErrorKind::Request,
            BackendErrorKind::Unknown,
        ] {
            assert!(!(kind.is_fatal() && kind.is_transient()), "{}", kind);
        }
        assert!(BackendErrorKind::Auth.is_fatal());
        assert!(BackendErrorKind::Billing.is_fatal());
        assert!(BackendErrorKind::RateLimit.is_transient());
        assert!(BackendErrorKind::Network.is_transient());
        assert!(!BackendErrorKind::Request.is_transient());
        assert!(!BackendErrorKind::Unknown.is_fatal());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(BackendError::from_status(401, "").kind, BackendErrorKind::Auth);
        assert_eq!(BackendError::from_status(402, "").kind, BackendErrorKind::Billing);
        assert_eq!(BackendError::from_status(429, "").kind, BackendErrorKind::RateLimit);
        assert_eq!(BackendError::from_status(503, "").kind, BackendErrorKind::Network);
        assert_eq!(BackendError::from_status(400, "bad json").kind, BackendErrorKind::Request);
        assert_eq!(
            BackendError::from_status(400, "Your credit balance is too low").kind,
            BackendErrorKind::Billing
        );
    }

    #[test]
    fn test_from_message() {
        assert_eq!(BackendError::from_message("Rate limit exceeded").kind, BackendErrorKind::RateLimit);
        assert_eq!(BackendError::from_message("invalid API key").kind, BackendErrorKind::Auth);
        assert_eq!(BackendError::from_message("connection reset").kind, BackendErrorKind::Network);
        assert_eq!(BackendError::from_message("billing hard limit").kind, BackendErrorKind::Billing);
        assert_eq!(BackendError::from_message("something odd").kind, BackendErrorKind::Unknown);
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = BackendError::timeout(Duration::from_secs(5));
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = BackendError::auth("key revoked");
        assert_eq!(err.to_string(), "auth error: key revoked");
    }
}
