//! Seams to the collaborators that own real media work.
//!
//! A [`StreamingBackend`] validates references, opens audio streams and hands
//! out one [`AudioEngine`] per player. A [`VoiceTransport`] owns the voice
//! connection a player is subscribed to.

pub mod loopback;
#[cfg(test)]
pub(crate) mod mock;
pub mod youtube;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    common::{
        errors::BackendError,
        types::{ChannelId, GuildId, SessionId},
    },
    player::TrackRef,
};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an opened stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opened audio stream. Clones share the same stop signal, so closing any
/// clone tells the producer and the engine to let go of it.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    id: StreamId,
    reference: TrackRef,
    stop_signal: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn new(reference: TrackRef) -> Self {
        Self {
            id: StreamId::next(),
            reference,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn reference(&self) -> &TrackRef {
        &self.reference
    }

    /// Idempotent.
    pub fn close(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Engine-side playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    Idle,
    Playing,
    Paused,
}

/// Notifications emitted by an [`AudioEngine`], tagged with the stream they concern.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Status { stream: StreamId, status: EngineStatus },
    Error { stream: StreamId, message: String },
}

impl EngineEvent {
    pub fn stream(&self) -> StreamId {
        match self {
            Self::Status { stream, .. } | Self::Error { stream, .. } => *stream,
        }
    }
}

/// Player engine bound to one controller.
pub trait AudioEngine: Send + Sync {
    /// Starts playing `stream`, replacing whatever was playing. Returns immediately.
    fn play(&self, stream: StreamHandle);
    fn pause(&self);
    fn unpause(&self);
    fn stop(&self);
    /// Receiver for status and error notifications.
    fn events(&self) -> flume::Receiver<EngineEvent>;
}

#[async_trait]
pub trait StreamingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap, synchronous validity check of a raw reference.
    fn validate(&self, reference: &str) -> bool;

    async fn open_stream(&self, track: &TrackRef) -> Result<StreamHandle, BackendError>;

    async fn fetch_title(&self, track: &TrackRef) -> Result<String, BackendError>;

    /// A fresh engine for a new player.
    fn create_engine(&self) -> Arc<dyn AudioEngine>;
}

/// Voice connection lifecycle as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEvent {
    Connecting,
    Ready,
    Disconnected,
    /// The connection is gone for good (kicked, channel deleted, ...).
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSession {
    pub session_id: SessionId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// A freshly established session plus its lifecycle feed.
pub struct Connection {
    pub session: VoiceSession,
    pub events: flume::Receiver<SessionEvent>,
}

/// Bridge to the main gateway used to request voice state changes.
pub trait GatewayAdapter: Send + Sync {
    /// Sends a voice state update. `None` leaves the channel. Returns false if
    /// the shard could not take the payload.
    fn send_voice_state(&self, guild_id: &GuildId, channel_id: Option<&ChannelId>) -> bool;
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        channel_id: &ChannelId,
        guild_id: &GuildId,
        adapter: Arc<dyn GatewayAdapter>,
    ) -> Result<Connection, BackendError>;

    /// Routes the engine's audio into the session.
    fn subscribe(&self, session: &VoiceSession, engine: Arc<dyn AudioEngine>);

    async fn disconnect(&self, session: VoiceSession);
}
