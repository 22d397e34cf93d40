use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlayerConfig {
    /// How long a player may sit idle or paused before it is torn down.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Frame length used by the loopback engine.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
}

impl PlayerConfig {
    /// Never zero, so a new player is not torn down the moment it exists.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            frame_ms: default_frame_ms(),
        }
    }
}

fn default_idle_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_frame_ms() -> u64 {
    20
}
