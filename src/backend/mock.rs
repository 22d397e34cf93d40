//! Recording backends for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AudioEngine, Connection, EngineEvent, EngineStatus, GatewayAdapter, SessionEvent,
    StreamHandle, StreamingBackend, VoiceSession, VoiceTransport,
};
use crate::{
    common::{
        errors::BackendError,
        types::{ChannelId, GuildId, SessionId},
    },
    player::TrackRef,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Play(String),
    Pause,
    Unpause,
    Stop,
}

pub struct MockEngine {
    pub calls: Mutex<Vec<EngineCall>>,
    pub current: Mutex<Option<StreamHandle>>,
    tx: flume::Sender<EngineEvent>,
    rx: flume::Receiver<EngineEvent>,
}

impl MockEngine {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            calls: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            tx,
            rx,
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Pushes an event as if the engine emitted it.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl AudioEngine for MockEngine {
    fn play(&self, stream: StreamHandle) {
        self.calls
            .lock()
            .push(EngineCall::Play(stream.reference().to_string()));
        *self.current.lock() = Some(stream);
    }

    fn pause(&self) {
        self.calls.lock().push(EngineCall::Pause);
    }

    fn unpause(&self) {
        self.calls.lock().push(EngineCall::Unpause);
    }

    fn stop(&self) {
        self.calls.lock().push(EngineCall::Stop);
    }

    fn events(&self) -> flume::Receiver<EngineEvent> {
        self.rx.clone()
    }
}

/// Accepts any reference starting with `ok:`; `ok:fail` cannot be opened.
pub struct MockStreaming {
    pub engine: Arc<MockEngine>,
    pub opened: Mutex<Vec<StreamHandle>>,
}

impl MockStreaming {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(MockEngine::new()),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn last_stream(&self) -> Option<StreamHandle> {
        self.opened.lock().last().cloned()
    }

    /// Sends a status event for the most recently opened stream.
    pub fn report(&self, status: EngineStatus) {
        if let Some(stream) = self.last_stream() {
            self.engine.emit(EngineEvent::Status {
                stream: stream.id(),
                status,
            });
        }
    }
}

#[async_trait]
impl StreamingBackend for MockStreaming {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate(&self, reference: &str) -> bool {
        reference.starts_with("ok:")
    }

    async fn open_stream(&self, track: &TrackRef) -> Result<StreamHandle, BackendError> {
        if track == "ok:fail" {
            return Err(BackendError::Unavailable("stream refused".into()));
        }
        let stream = StreamHandle::new(track.clone());
        self.opened.lock().push(stream.clone());
        Ok(stream)
    }

    async fn fetch_title(&self, track: &TrackRef) -> Result<String, BackendError> {
        match track.as_str().strip_prefix("ok:") {
            Some("untitled") => Err(BackendError::Rejected("no metadata".into())),
            Some(rest) => Ok(rest.to_uppercase()),
            None => Err(BackendError::Rejected("unknown".into())),
        }
    }

    fn create_engine(&self) -> Arc<dyn AudioEngine> {
        self.engine.clone()
    }
}

pub struct MockTransport {
    pub connects: Mutex<u32>,
    pub disconnects: Mutex<Vec<SessionId>>,
    pub subscribed: Mutex<u32>,
    pub refuse: Mutex<bool>,
    lifecycle: Mutex<Option<flume::Sender<SessionEvent>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: Mutex::new(0),
            disconnects: Mutex::new(Vec::new()),
            subscribed: Mutex::new(0),
            refuse: Mutex::new(false),
            lifecycle: Mutex::new(None),
        })
    }

    /// Reports a lifecycle event on the last connected session.
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.lifecycle.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn connects(&self) -> u32 {
        *self.connects.lock()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.lock().len()
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        channel_id: &ChannelId,
        guild_id: &GuildId,
        adapter: Arc<dyn GatewayAdapter>,
    ) -> Result<Connection, BackendError> {
        if *self.refuse.lock() {
            return Err(BackendError::Unavailable("no voice server".into()));
        }
        adapter.send_voice_state(guild_id, Some(channel_id));
        *self.connects.lock() += 1;

        let (tx, rx) = flume::unbounded();
        *self.lifecycle.lock() = Some(tx);
        Ok(Connection {
            session: VoiceSession {
                session_id: SessionId::generate(),
                guild_id: guild_id.clone(),
                channel_id: channel_id.clone(),
            },
            events: rx,
        })
    }

    fn subscribe(&self, _session: &VoiceSession, _engine: Arc<dyn AudioEngine>) {
        *self.subscribed.lock() += 1;
    }

    async fn disconnect(&self, session: VoiceSession) {
        self.disconnects.lock().push(session.session_id);
    }
}

/// Records every voice state update it is asked to send.
#[derive(Default)]
pub struct MockAdapter {
    pub updates: Mutex<Vec<(GuildId, Option<ChannelId>)>>,
}

impl GatewayAdapter for MockAdapter {
    fn send_voice_state(&self, guild_id: &GuildId, channel_id: Option<&ChannelId>) -> bool {
        self.updates
            .lock()
            .push((guild_id.clone(), channel_id.cloned()));
        true
    }
}
