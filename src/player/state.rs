use serde::Serialize;

use super::track::TrackRef;
use crate::common::types::GuildId;

/// Lifecycle of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    Idle,
    Playing,
    Paused,
    /// Terminal. Commands fail until a new player is created.
    Destroyed,
}

impl PlayerStatus {
    pub fn is_live(self) -> bool {
        self != Self::Destroyed
    }

    /// States in which an idle timer must be outstanding.
    pub fn wants_idle_timer(self) -> bool {
        matches!(self, Self::Idle | Self::Paused)
    }
}

/// Everything that can drive the state machine, from commands and from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Play,
    Pause,
    Resume,
    /// The engine paused on its own.
    BackendPaused,
    /// The engine resumed on its own.
    BackendPlaying,
    StreamEnded,
    StreamFailed,
    Stop,
    IdleTimeout,
    Destroy,
}

/// Side effects the controller performs, in order, after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ArmIdleTimer,
    CancelIdleTimer,
    StartPlayback,
    PauseBackend,
    ResumeBackend,
    StopBackend,
    CloseStream,
    NotifyStopped,
    CloseSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: PlayerStatus,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: PlayerStatus, effects: &[Effect]) -> Option<Self> {
        Some(Self {
            next,
            effects: effects.to_vec(),
        })
    }
}

/// The whole player state machine. `None` means the input is ignored in `from`.
pub fn transition(from: PlayerStatus, input: Input) -> Option<Transition> {
    use Effect::*;
    use PlayerStatus::*;

    match (from, input) {
        (Destroyed, _) => None,

        (_, Input::Destroy) => Transition::to(
            Destroyed,
            &[CancelIdleTimer, NotifyStopped, StopBackend, CloseStream, CloseSession],
        ),
        // The firing timer is already spent, nothing to cancel.
        (_, Input::IdleTimeout) => Transition::to(
            Destroyed,
            &[NotifyStopped, StopBackend, CloseStream, CloseSession],
        ),

        (Idle, Input::Play) => Transition::to(Playing, &[CancelIdleTimer, StartPlayback]),

        (Playing, Input::Pause) => Transition::to(Paused, &[PauseBackend, ArmIdleTimer]),
        (Paused, Input::Resume) => Transition::to(Playing, &[CancelIdleTimer, ResumeBackend]),
        (Playing, Input::BackendPaused) => Transition::to(Paused, &[ArmIdleTimer]),
        (Paused, Input::BackendPlaying) => Transition::to(Playing, &[CancelIdleTimer]),

        (Playing | Paused, Input::StreamEnded | Input::StreamFailed) => {
            Transition::to(Idle, &[CloseStream, ArmIdleTimer])
        }

        (Playing | Paused, Input::Stop) => Transition::to(
            Idle,
            &[NotifyStopped, StopBackend, CloseStream, ArmIdleTimer],
        ),
        (Idle, Input::Stop) => Transition::to(Idle, &[NotifyStopped, CloseStream]),

        _ => None,
    }
}

/// Read-only view of a player, serialisable for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub guild_id: GuildId,
    pub status: PlayerStatus,
    /// Most recently started track, kept after it ends.
    pub current: Option<TrackRef>,
    pub up_next: Option<TrackRef>,
    pub queued: Vec<TrackRef>,
    pub connected: bool,
    pub idle_timer_armed: bool,
}
