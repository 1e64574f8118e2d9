//! Common error types for Vouch components.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds a verification attempt can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Capture device unavailable or permission denied
    Camera,
    /// Landmark source never became ready
    Detector,
    /// Processing phase exceeded its bound
    Timeout,
    /// Verification endpoint declined the evidence
    Rejected,
    /// Local evidence persistence failed
    Save,
    /// Verification endpoint unreachable or answered garbage
    Submission,
}

impl ErrorKind {
    /// Message shown to the user alongside the retry/cancel choice
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Camera => {
                "We couldn't access your camera. Allow camera access in your settings, then try again."
            }
            Self::Detector => "Face detection failed to start. Please try again.",
            Self::Timeout => {
                "Verification is taking longer than expected. Your recording was kept; you can resubmit it."
            }
            Self::Rejected => "Verification was not successful. You can start a new attempt.",
            Self::Save => "We couldn't save your recording on this device. Please try again.",
            Self::Submission => {
                "We couldn't reach the verification service. Your recording was kept; you can resubmit it."
            }
        }
    }

    /// Whether the evidence artifact survives and can be resubmitted as-is
    pub fn allows_resubmit(&self) -> bool {
        matches!(self, Self::Timeout | Self::Submission)
    }
}

/// Common errors across Vouch components
#[derive(Debug, Error)]
pub enum VouchError {
    /// Capture device acquisition or stream failure
    #[error("Camera error: {0}")]
    Camera(String),

    /// Landmark source initialization failure
    #[error("Detector error: {0}")]
    Detector(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Verification explicitly rejected
    #[error("Verification rejected: {0}")]
    Rejected(String),

    /// Evidence could not be persisted
    #[error("Save error: {0}")]
    Save(String),

    /// Evidence store backend I/O error
    #[error("Store error: {0}")]
    Store(String),

    /// Transport failure talking to the verification endpoint
    #[error("Submission error: {0}")]
    Submission(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VouchError {
    /// Session-visible kind this error ends an attempt with
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Camera(_) => ErrorKind::Camera,
            Self::Detector(_) => ErrorKind::Detector,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Submission(_) => ErrorKind::Submission,
            // Only the processing phase sees these, while persisting evidence
            Self::Save(_)
            | Self::Store(_)
            | Self::Config(_)
            | Self::InvalidInput(_)
            | Self::Internal(_) => ErrorKind::Save,
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Camera(_) => 503,
            Self::Detector(_) => 503,
            Self::Timeout(_) => 504,
            Self::Rejected(_) => 403,
            Self::Save(_) => 500,
            Self::Store(_) => 503,
            Self::Submission(_) => 502,
            Self::Config(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Detector(_) | Self::Timeout(_) | Self::Store(_) | Self::Submission(_)
        )
    }
}

impl From<serde_json::Error> for VouchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization: {}", err))
    }
}
