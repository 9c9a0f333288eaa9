//! Error types for Marquee Core

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::types::PlaybackMethod;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    // Negotiation errors
    #[error("Capability negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("No playable media source for item {item_id}")]
    NoPlayableSource { item_id: String },

    // Adapter errors
    #[error("Adapter rejected the stream: {0}")]
    AdapterLoadFailure(String),

    #[error("Playback stalled at {position:.1}s")]
    PlaybackStalled { position: f64 },

    #[error("Live track switch rejected: {0}")]
    TrackSwitchFailure(String),

    #[error("Playback failed after exhausting fallbacks (last method {last_method}): {reason}")]
    PlaybackFailed {
        last_method: PlaybackMethod,
        reason: String,
    },

    // Session errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("No active playback session")]
    NoActiveSession,

    #[error("Unknown stream index {index}")]
    UnknownStream { index: i32 },

    // Server errors
    #[error("Server returned {status} for {endpoint}")]
    ServerStatus { endpoint: String, status: u16 },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Malformed server payload: {0}")]
    Payload(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a negotiation error
    pub fn negotiation(msg: impl Into<String>) -> Self {
        Error::NegotiationFailure(msg.into())
    }

    /// Create an adapter load error
    pub fn adapter(msg: impl Into<String>) -> Self {
        Error::AdapterLoadFailure(msg.into())
    }

    /// Returns true if the fallback chain should handle this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::AdapterLoadFailure(_)
                | Error::PlaybackStalled { .. }
                | Error::TrackSwitchFailure(_)
        )
    }

    /// Returns true if this error ends playback and must be shown to the user
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::NegotiationFailure(_)
                | Error::NoPlayableSource { .. }
                | Error::PlaybackFailed { .. }
                | Error::ServerStatus { .. }
                | Error::Network(_)
                | Error::Payload(_)
        )
    }

    /// Returns the error code for logs and the failure dialog
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NegotiationFailure(_) => "NEGOTIATION_FAILED",
            Error::NoPlayableSource { .. } => "NO_PLAYABLE_SOURCE",
            Error::AdapterLoadFailure(_) => "ADAPTER_LOAD",
            Error::PlaybackStalled { .. } => "PLAYBACK_STALLED",
            Error::TrackSwitchFailure(_) => "TRACK_SWITCH",
            Error::PlaybackFailed { .. } => "PLAYBACK_FAILED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::NoActiveSession => "NO_SESSION",
            Error::UnknownStream { .. } => "UNKNOWN_STREAM",
            Error::ServerStatus { .. } => "SERVER_STATUS",
            Error::Network(_) => "NETWORK",
            Error::Url(_) => "URL",
            Error::Payload(_) => "PAYLOAD",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}

/// User-facing failure dialog with a technical-detail field
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackFailure {
    /// Dialog title
    pub title: String,
    /// Guidance shown to the user
    pub message: String,
    /// Technical detail for support
    pub detail: String,
    /// Stable error code
    pub code: &'static str,
    /// When the failure was surfaced
    pub occurred_at: DateTime<Utc>,
}

impl PlaybackFailure {
    /// Build the dialog for a terminal error
    pub fn from_error(error: &Error) -> Self {
        let (title, message) = match error {
            Error::NegotiationFailure(_) | Error::ServerStatus { .. } | Error::Network(_) => (
                "Unable to Start Playback",
                "The server could not prepare this item. Check your connection and sign-in, then try again.",
            ),
            Error::NoPlayableSource { .. } => (
                "Unsupported Media",
                "This item has no version this device can play, and the server cannot convert it.",
            ),
            _ => (
                "Playback Failed",
                "Playback could not be started with any available method.",
            ),
        };

        Self {
            title: title.to_string(),
            message: message.to_string(),
            detail: error.to_string(),
            code: error.error_code(),
            occurred_at: Utc::now(),
        }
    }
}
