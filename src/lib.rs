//! Per-guild music playback control: a track queue with one-track lookahead,
//! an explicit playback state machine and an idle timeout that tears players
//! down, driven through pluggable streaming and voice backends.

pub mod backend;
pub mod common;
pub mod configs;
pub mod player;

pub use common::errors::{BackendError, PlayerError, PlayerResult};
pub use configs::Config;
pub use player::{
    NextTrack, PlaybackController, PlayerManager, PlayerSnapshot, PlayerStatus, TrackRef,
};
