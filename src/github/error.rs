//! GitHub API error types.
//!
//! Errors are categorized as transient or permanent. The synchronization core
//! treats every kind identically (polling swallows the failure and counts the
//! workflow as not active, hook sync skips the repository), so the split
//! exists for logging and for embedding applications that surface errors
//! (e.g., deciding whether "try again" is worth offering).

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Transient error: 5xx, 429, rate-limited 403, network timeouts. A later
    /// poll cycle is expected to succeed.
    Transient,

    /// Permanent error: most 4xx, such as a bad token (401) or missing admin permission
    /// on hook creation (403/404), workflow deleted (404).
    Permanent,
}

/// A GitHub API error with categorization.
#[derive(Debug, Error)]
pub struct ApiError {
    pub kind: ApiErrorKind,

    /// HTTP status code, when the request got far enough to have one.
    pub status: Option<u16>,

    pub message: String,

    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl ApiError {
    /// Categorizes an HTTP status code into an error.
    ///
    /// 429 and 5xx are transient; a 403 is assumed rate-limit-or-permission
    /// and kept transient only for 429-style secondary limits, so plain 403
    /// is permanent here. Everything else in 4xx is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = if status == 429 || status >= 500 {
            ApiErrorKind::Transient
        } else {
            ApiErrorKind::Permanent
        };
        ApiError {
            kind,
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a reqwest transport error (connect failure, timeout, decode).
    pub fn transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        ApiError {
            kind: ApiErrorKind::Transient,
            status: source.status().map(|s| s.as_u16()),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a permanent error with no underlying transport error.
    pub fn permanent(message: impl Into<String>) -> Self {
        ApiError {
            kind: ApiErrorKind::Permanent,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if a later attempt is expected to succeed.
    pub fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }
}
