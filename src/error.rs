// src/error.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Message used when a clone fails; transient, so it is retried.
pub const CLONE_FAILED: &str = "failed to clone repository";
/// Message used when a fetch fails; transient, so it is retried.
pub const FETCH_FAILED: &str = "failed to fetch";

const UNKNOWN_MESSAGE: &str = "unknown error occurred";

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Broad classification of a failure, which drives the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "VCS_ERROR")]
    VersionControl,
    #[serde(rename = "PARSING_ERROR")]
    Parsing,
    #[serde(rename = "FILESYSTEM_ERROR")]
    FileSystem,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::VersionControl => "VCS_ERROR",
            ErrorKind::Parsing => "PARSING_ERROR",
            ErrorKind::FileSystem => "FILESYSTEM_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure with free-form diagnostic context
#[derive(Error, Debug)]
#[error("[{kind}] {message}{}", cause_suffix(.source))]
pub struct AnalyzerError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    #[source]
    source: Option<Cause>,
}

fn cause_suffix(source: &Option<Cause>) -> String {
    source
        .as_ref()
        .map(|cause| format!(": {}", cause))
        .unwrap_or_default()
}

impl AnalyzerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Wrap `source` and attach every `(key, value)` pair from `context`
    pub fn wrap<E, I, K, V>(kind: ErrorKind, message: impl Into<String>, source: E, context: I) -> Self
    where
        E: Into<Cause>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        context
            .into_iter()
            .fold(Self::new(kind, message).with_source(source), |err, (k, v)| {
                err.with_context(k, v)
            })
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Cause>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport failures are transient. Version-control failures are only
    /// transient when they come from a clone or fetch; a missing branch will
    /// still be missing on the next attempt.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Network | ErrorKind::Timeout => true,
            ErrorKind::VersionControl => self.message == CLONE_FAILED || self.message == FETCH_FAILED,
            _ => false,
        }
    }

    /// Back-off before the next attempt; zero for non-retryable kinds
    pub fn retry_delay(&self) -> Duration {
        match self.kind {
            ErrorKind::Network => Duration::from_secs(5),
            ErrorKind::Timeout => Duration::from_secs(10),
            ErrorKind::VersionControl if self.is_retryable() => Duration::from_secs(3),
            _ => Duration::ZERO,
        }
    }

    fn unknown(source: impl Into<Cause>) -> Self {
        Self::new(ErrorKind::Unknown, UNKNOWN_MESSAGE).with_source(source)
    }
}

impl From<git2::Error> for AnalyzerError {
    fn from(err: git2::Error) -> Self {
        Self::unknown(err)
    }
}

impl From<std::io::Error> for AnalyzerError {
    fn from(err: std::io::Error) -> Self {
        Self::unknown(err)
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(err)
    }
}

impl From<Cause> for AnalyzerError {
    fn from(err: Cause) -> Self {
        Self::unknown(err)
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_are_retryable() {
        let network = AnalyzerError::new(ErrorKind::Network, "connection reset");
        assert!(network.is_retryable());
        assert_eq!(network.retry_delay(), Duration::from_secs(5));

        let timeout = AnalyzerError::new(ErrorKind::Timeout, "deadline exceeded");
        assert!(timeout.is_retryable());
        assert_eq!(timeout.retry_delay(), Duration::from_secs(10));
    }

    #[test]
    fn clone_and_fetch_failures_are_retryable() {
        let clone = AnalyzerError::new(ErrorKind::VersionControl, CLONE_FAILED);
        assert!(clone.is_retryable());
        assert_eq!(clone.retry_delay(), Duration::from_secs(3));

        let fetch = AnalyzerError::new(ErrorKind::VersionControl, FETCH_FAILED);
        assert!(fetch.is_retryable());
        assert_eq!(fetch.retry_delay(), Duration::from_secs(3));
    }

    #[test]
    fn other_vcs_failures_are_terminal() {
        let err = AnalyzerError::new(ErrorKind::VersionControl, "branch not found");
        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn content_failures_are_terminal() {
        for kind in [
            ErrorKind::Parsing,
            ErrorKind::FileSystem,
            ErrorKind::Validation,
            ErrorKind::Unknown,
        ] {
            let err = AnalyzerError::new(kind, CLONE_FAILED);
            assert!(!err.is_retryable(), "{kind} should not be retryable");
            assert_eq!(err.retry_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn display_includes_kind_message_and_cause() {
        let bare = AnalyzerError::new(ErrorKind::Validation, "index file is empty");
        assert_eq!(bare.to_string(), "[VALIDATION_ERROR] index file is empty");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let wrapped = AnalyzerError::new(ErrorKind::FileSystem, "failed to read index file").with_source(io);
        assert_eq!(
            wrapped.to_string(),
            "[FILESYSTEM_ERROR] failed to read index file: no such file"
        );
        assert!(wrapped.cause().is_some());
    }

    #[test]
    fn wrap_collects_context() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = AnalyzerError::wrap(
            ErrorKind::FileSystem,
            "failed to write report",
            io,
            [("output_file", "out.txt"), ("attempt", "1")],
        );
        assert_eq!(err.context.get("output_file").map(String::as_str), Some("out.txt"));
        assert_eq!(err.context.len(), 2);
    }

    #[test]
    fn untyped_errors_become_unknown() {
        let err: AnalyzerError = git2::Error::from_str("odb corrupt").into();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, UNKNOWN_MESSAGE);
        assert!(!err.is_retryable());
    }

    #[test]
    fn kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::VersionControl).unwrap();
        assert_eq!(json, "\"VCS_ERROR\"");
    }
}
