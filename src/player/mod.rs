pub mod controller;
pub mod manager;
pub mod queue;
pub mod state;
pub mod timer;
pub mod track;

pub use controller::{NextTrack, PlaybackController};
pub use manager::PlayerManager;
pub use queue::TrackQueue;
pub use state::{PlayerSnapshot, PlayerStatus};
pub use track::TrackRef;
