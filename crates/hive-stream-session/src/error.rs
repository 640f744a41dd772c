//! Session error.

use hive_stream_core::{OptionsError, TransportError};
use thiserror::Error;

/// Errors surfaced by sessions and their handles.
///
/// Transport failures pass through unchanged.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("A run is already streaming")]
    Busy,
    #[error("No thread attached")]
    NoThread,
    #[error("Run was stopped or its thread changed before it started")]
    Superseded,
}

impl StreamError {
    /// Whether the options were rejected before a session existed.
    #[must_use]
    pub const fn is_malformed_options(&self) -> bool {
        matches!(self, Self::Options(_))
    }
}
