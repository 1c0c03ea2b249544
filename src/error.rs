//! Error taxonomy for submission, polling and definition loading.
//!
//! Errors carry owned strings rather than transport errors so they can be cloned into
//! every snapshot a monitor publishes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a request to the backend did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The backend answered with a non-2xx status.
    Status { status: u16, detail: Option<String> },
    /// The request never got an answer (connect, TLS, timeout, body read).
    Transport { detail: String },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Status {
                status,
                detail: Some(detail),
            } => write!(f, "status {status}: {detail}"),
            Failure::Status { status, detail: None } => write!(f, "status {status}"),
            Failure::Transport { detail } => write!(f, "transport error: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("run request failed ({failure})")]
    SubmissionFailed { failure: Failure },

    #[error("status request failed ({failure})")]
    FetchFailed { failure: Failure },

    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    #[error("failed to load workflow definition ({failure})")]
    DefinitionFailed { failure: Failure },

    #[error("invalid input: {detail}")]
    InvalidInput { detail: String },
}

/// Machine-checkable discriminant of a `MonitorError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SubmissionFailed,
    FetchFailed,
    MalformedResponse,
    DefinitionFailed,
    InvalidInput,
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::SubmissionFailed { .. } => ErrorKind::SubmissionFailed,
            MonitorError::FetchFailed { .. } => ErrorKind::FetchFailed,
            MonitorError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            MonitorError::DefinitionFailed { .. } => ErrorKind::DefinitionFailed,
            MonitorError::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// HTTP status behind the error, when the backend answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            MonitorError::SubmissionFailed { failure }
            | MonitorError::FetchFailed { failure }
            | MonitorError::DefinitionFailed { failure } => match failure {
                Failure::Status { status, .. } => Some(*status),
                Failure::Transport { .. } => None,
            },
            _ => None,
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        MonitorError::MalformedResponse {
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        MonitorError::InvalidInput {
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
