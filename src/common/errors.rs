use thiserror::Error;

use crate::common::types::{ChannelId, GuildId};

/// Failures reported by a streaming or transport backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend refused the request outright (bad id, region lock, ...).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The backend could not be reached or is not ready.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by player operations.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The reference did not pass the backend's validity check.
    #[error("invalid track reference: {0:?}")]
    InvalidReference(String),

    #[error("failed to open stream for {reference}: {source}")]
    StreamOpen {
        reference: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to fetch metadata for {reference}: {source}")]
    Metadata {
        reference: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to join channel {channel} in guild {guild}: {source}")]
    Connect {
        guild: GuildId,
        channel: ChannelId,
        #[source]
        source: BackendError,
    },

    /// The controller was torn down; a new one must be created.
    #[error("player for guild {0} has been destroyed")]
    Destroyed(GuildId),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
