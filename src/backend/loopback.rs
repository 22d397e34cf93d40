//! In-process backends that simulate playback without touching the network.
//!
//! The engine "plays" a stream by ticking through fixed-size frames, honouring
//! pause and the stream's stop signal, and reports status changes the same way
//! a real engine would. Useful for local runs and end-to-end tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{
    AudioEngine, Connection, EngineEvent, EngineStatus, GatewayAdapter, SessionEvent,
    StreamHandle, StreamingBackend, VoiceSession, VoiceTransport, youtube::YouTubeUrlValidator,
};
use crate::{
    common::{
        errors::BackendError,
        types::{ChannelId, GuildId, SessionId},
    },
    configs::PlayerConfig,
    player::TrackRef,
};

const DEFAULT_TRACK_LENGTH: Duration = Duration::from_secs(3 * 60);

/// YouTube-flavoured streaming backend whose tracks all have the same length.
pub struct LoopbackBackend {
    validator: YouTubeUrlValidator,
    frame: Duration,
    track_length: Duration,
}

impl LoopbackBackend {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            validator: YouTubeUrlValidator::new(),
            frame: config.frame_duration(),
            track_length: DEFAULT_TRACK_LENGTH,
        }
    }

    pub fn with_track_length(mut self, length: Duration) -> Self {
        self.track_length = length;
        self
    }

    fn frames_per_track(&self) -> u64 {
        let frames = self.track_length.as_millis() / self.frame.as_millis().max(1);
        u64::try_from(frames).unwrap_or(u64::MAX).max(1)
    }
}

#[async_trait]
impl StreamingBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn validate(&self, reference: &str) -> bool {
        self.validator.is_valid(reference)
    }

    async fn open_stream(&self, track: &TrackRef) -> Result<StreamHandle, BackendError> {
        if !self.validator.is_valid(track.as_str()) {
            return Err(BackendError::Rejected(format!("not a video link: {}", track)));
        }
        Ok(StreamHandle::new(track.clone()))
    }

    async fn fetch_title(&self, track: &TrackRef) -> Result<String, BackendError> {
        self.validator
            .video_id(track.as_str())
            .map(|id| format!("YouTube video {}", id))
            .ok_or_else(|| BackendError::Rejected(format!("not a video link: {}", track)))
    }

    fn create_engine(&self) -> Arc<dyn AudioEngine> {
        Arc::new(LoopbackEngine::new(self.frame, self.frames_per_track()))
    }
}

struct Playback {
    stream: StreamHandle,
    paused: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Frame-ticking engine. One per player.
pub struct LoopbackEngine {
    frame: Duration,
    frames_per_track: u64,
    current: Mutex<Option<Playback>>,
    tx: flume::Sender<EngineEvent>,
    rx: flume::Receiver<EngineEvent>,
}

impl LoopbackEngine {
    pub fn new(frame: Duration, frames_per_track: u64) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            frame,
            frames_per_track,
            current: Mutex::new(None),
            tx,
            rx,
        }
    }

    fn emit(&self, stream: &StreamHandle, status: EngineStatus) {
        let _ = self.tx.send(EngineEvent::Status {
            stream: stream.id(),
            status,
        });
    }

    fn set_paused(&self, paused: bool) {
        let current = self.current.lock();
        let Some(playback) = current.as_ref() else {
            return;
        };
        if playback.task.is_finished() || playback.paused.swap(paused, Ordering::SeqCst) == paused {
            return;
        }
        let status = if paused {
            EngineStatus::Paused
        } else {
            EngineStatus::Playing
        };
        self.emit(&playback.stream, status);
    }
}

impl AudioEngine for LoopbackEngine {
    fn play(&self, stream: StreamHandle) {
        // Reported before the task starts so it can never trail a pause.
        self.emit(&stream, EngineStatus::Playing);
        let paused = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_frames(
            stream.clone(),
            paused.clone(),
            self.frame,
            self.frames_per_track,
            self.tx.clone(),
        ));

        let previous = self.current.lock().replace(Playback {
            stream,
            paused,
            task,
        });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    fn pause(&self) {
        self.set_paused(true);
    }

    fn unpause(&self) {
        self.set_paused(false);
    }

    fn stop(&self) {
        if let Some(playback) = self.current.lock().take() {
            let finished = playback.task.is_finished();
            playback.task.abort();
            if !finished {
                self.emit(&playback.stream, EngineStatus::Idle);
            }
        }
    }

    fn events(&self) -> flume::Receiver<EngineEvent> {
        self.rx.clone()
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        if let Some(playback) = self.current.get_mut().take() {
            playback.task.abort();
        }
    }
}

async fn run_frames(
    stream: StreamHandle,
    paused: Arc<AtomicBool>,
    frame: Duration,
    total: u64,
    tx: flume::Sender<EngineEvent>,
) {
    let id = stream.id();
    let mut played = 0u64;
    let mut interval = tokio::time::interval(frame);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    while played < total {
        interval.tick().await;
        if stream.is_closed() {
            debug!("Stream {} closed after {} frames", id, played);
            break;
        }
        if !paused.load(Ordering::SeqCst) {
            played += 1;
        }
    }

    let _ = tx.send(EngineEvent::Status {
        stream: id,
        status: EngineStatus::Idle,
    });
}

struct LiveSession {
    session: VoiceSession,
    adapter: Arc<dyn GatewayAdapter>,
    events: flume::Sender<SessionEvent>,
    engine: Option<Arc<dyn AudioEngine>>,
}

/// Transport that keeps sessions in memory and drives their lifecycle feed.
#[derive(Default)]
pub struct LoopbackTransport {
    sessions: DashMap<SessionId, LiveSession>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| s.engine.is_some())
    }

    /// Simulates the voice server dropping the session, as when the bot is
    /// kicked or the channel is deleted. Returns false for unknown sessions.
    pub fn drop_session(&self, session_id: &SessionId) -> bool {
        let Some((_, live)) = self.sessions.remove(session_id) else {
            return false;
        };
        info!(
            "[{}] Voice session {} dropped by remote",
            live.session.guild_id, session_id
        );
        live.adapter.send_voice_state(&live.session.guild_id, None);
        let _ = live.events.send(SessionEvent::Disconnected);
        let _ = live.events.send(SessionEvent::Destroyed);
        true
    }
}

#[async_trait]
impl VoiceTransport for LoopbackTransport {
    async fn connect(
        &self,
        channel_id: &ChannelId,
        guild_id: &GuildId,
        adapter: Arc<dyn GatewayAdapter>,
    ) -> Result<Connection, BackendError> {
        let (tx, rx) = flume::unbounded();
        let _ = tx.send(SessionEvent::Connecting);

        if !adapter.send_voice_state(guild_id, Some(channel_id)) {
            return Err(BackendError::Unavailable(
                "gateway refused the voice state update".into(),
            ));
        }

        let session = VoiceSession {
            session_id: SessionId::generate(),
            guild_id: guild_id.clone(),
            channel_id: channel_id.clone(),
        };
        let _ = tx.send(SessionEvent::Ready);

        self.sessions.insert(
            session.session_id.clone(),
            LiveSession {
                session: session.clone(),
                adapter,
                events: tx,
                engine: None,
            },
        );
        Ok(Connection {
            session,
            events: rx,
        })
    }

    fn subscribe(&self, session: &VoiceSession, engine: Arc<dyn AudioEngine>) {
        if let Some(mut live) = self.sessions.get_mut(&session.session_id) {
            live.engine = Some(engine);
        }
    }

    async fn disconnect(&self, session: VoiceSession) {
        let Some((_, live)) = self.sessions.remove(&session.session_id) else {
            return;
        };
        live.adapter.send_voice_state(&session.guild_id, None);
        let _ = live.events.send(SessionEvent::Destroyed);
    }
}
