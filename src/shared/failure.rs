//! Failure classification
//!
//! Failures coming back from devices, the counter store or notification
//! endpoints are classified once, at the data-access boundary, into a
//! closed set of categories. Retry policies only ever branch on the
//! category.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure categories understood by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    NetworkUnreachable,
    HostUnreachable,
    /// Resource temporarily unavailable (EAGAIN, interrupted call)
    TryAgain,
    PermissionDenied,
    InvalidArgument,
    Cancelled,
    Other,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectionReset => "connection_reset",
            Self::ConnectionAborted => "connection_aborted",
            Self::NetworkUnreachable => "network_unreachable",
            Self::HostUnreachable => "host_unreachable",
            Self::TryAgain => "try_again",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidArgument => "invalid_argument",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }

    /// Infrastructure failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionRefused
                | Self::ConnectionReset
                | Self::ConnectionAborted
                | Self::NetworkUnreachable
                | Self::HostUnreachable
                | Self::TryAgain
        )
    }

    /// Failures that will not change on retry (auth, malformed input).
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::InvalidArgument)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reduced to its category plus the raw message for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{category}: {message}")]
pub struct FailureClassification {
    pub category: FailureCategory,
    pub message: String,
}

const PERMANENT_INDICATORS: &[(&str, FailureCategory)] = &[
    ("bad request", FailureCategory::InvalidArgument),
    ("malformed", FailureCategory::InvalidArgument),
    ("invalid argument", FailureCategory::InvalidArgument),
    ("invalid parameter", FailureCategory::InvalidArgument),
    ("unauthorized", FailureCategory::PermissionDenied),
    ("unauthorised", FailureCategory::PermissionDenied),
    ("forbidden", FailureCategory::PermissionDenied),
    ("permission denied", FailureCategory::PermissionDenied),
    ("access denied", FailureCategory::PermissionDenied),
    ("authentication", FailureCategory::PermissionDenied),
];

const TRANSIENT_INDICATORS: &[(&str, FailureCategory)] = &[
    ("timed out", FailureCategory::Timeout),
    ("timeout", FailureCategory::Timeout),
    ("connection refused", FailureCategory::ConnectionRefused),
    ("connection reset", FailureCategory::ConnectionReset),
    ("broken pipe", FailureCategory::ConnectionReset),
    ("connection aborted", FailureCategory::ConnectionAborted),
    ("network is unreachable", FailureCategory::NetworkUnreachable),
    ("network unreachable", FailureCategory::NetworkUnreachable),
    ("host unreachable", FailureCategory::HostUnreachable),
    ("no route to host", FailureCategory::HostUnreachable),
    ("try again", FailureCategory::TryAgain),
    ("temporarily unavailable", FailureCategory::TryAgain),
    ("cancel", FailureCategory::Cancelled),
    // generic loss-of-link wording
    ("connection", FailureCategory::ConnectionReset),
    ("network", FailureCategory::ConnectionReset),
    ("socket", FailureCategory::ConnectionReset),
];

impl FailureClassification {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Classify a free-form failure message.
    ///
    /// Permanent indicators win over transient ones, so "unauthorized
    /// connection" is a permission problem, not a link problem.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        let category = PERMANENT_INDICATORS
            .iter()
            .chain(TRANSIENT_INDICATORS.iter())
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, category)| *category)
            .unwrap_or(FailureCategory::Other);

        Self { category, message }
    }

    pub fn from_io_error(err: &io::Error) -> Self {
        let category = match err.kind() {
            io::ErrorKind::TimedOut => FailureCategory::Timeout,
            io::ErrorKind::ConnectionRefused => FailureCategory::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => FailureCategory::ConnectionReset,
            io::ErrorKind::ConnectionAborted => FailureCategory::ConnectionAborted,
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => FailureCategory::TryAgain,
            io::ErrorKind::PermissionDenied => FailureCategory::PermissionDenied,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                FailureCategory::InvalidArgument
            }
            _ => return Self::from_message(err.to_string()),
        };
        Self::new(category, err.to_string())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Cancelled, message)
    }

    pub fn is_cancellation(&self) -> bool {
        self.category == FailureCategory::Cancelled
    }
}

impl From<io::Error> for FailureClassification {
    fn from(err: io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Errors that can report their own classification.
pub trait Classified {
    fn classification(&self) -> FailureClassification;
}

impl Classified for FailureClassification {
    fn classification(&self) -> FailureClassification {
        self.clone()
    }
}

impl Classified for io::Error {
    fn classification(&self) -> FailureClassification {
        FailureClassification::from_io_error(self)
    }
}
