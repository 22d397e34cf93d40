use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    queue::TrackQueue,
    state::{Effect, Input, PlayerSnapshot, PlayerStatus, Transition, transition},
    timer::IdleTimer,
    track::TrackRef,
};
use crate::{
    backend::{
        AudioEngine, Connection, EngineEvent, EngineStatus, GatewayAdapter, SessionEvent,
        StreamHandle, StreamingBackend, VoiceSession, VoiceTransport,
    },
    common::{
        errors::{PlayerError, PlayerResult},
        types::{ChannelId, GuildId, SessionId},
    },
    configs::PlayerConfig,
};

/// Outcome of asking for the next track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextTrack {
    Started(TrackRef),
    /// Lookahead slot and queue are both empty. Not an error.
    NothingToPlay,
}

type StopHook = Box<dyn FnOnce() + Send>;

/// Mutable player state. Only touched with the controller lock held.
struct Core {
    status: PlayerStatus,
    queue: TrackQueue,
    /// One-track lookahead kept outside the bulk queue.
    up_next: Option<TrackRef>,
    stream: Option<StreamHandle>,
    session: Option<VoiceSession>,
    lifecycle_task: Option<JoinHandle<()>>,
    idle_timer: IdleTimer,
    stop_hook: Option<StopHook>,
    /// Hook taken by a stop, run once the lock is released.
    fired_hook: Option<StopHook>,
    /// Set by a user pause. Engine reports of playing are stale until cleared.
    pause_requested: bool,
}

struct Inner {
    guild_id: GuildId,
    idle_timeout: Duration,
    streaming: Arc<dyn StreamingBackend>,
    transport: Arc<dyn VoiceTransport>,
    engine: Arc<dyn AudioEngine>,
    destroyed: AtomicBool,
    core: Mutex<Core>,
    event_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.get_mut().take() {
            debug!("[{}] Aborting engine event task", self.guild_id);
            task.abort();
        }
        if let Some(task) = self.core.get_mut().lifecycle_task.take() {
            task.abort();
        }
    }
}

/// Per-guild player: queue, lookahead, state machine and idle timeout.
///
/// Cheap to clone; all clones drive the same player. Every command, engine
/// event, session event and timer firing is serialised through one lock, and
/// each of them goes through [`transition`] so timer bookkeeping lives in a
/// single place.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        guild_id: GuildId,
        config: &PlayerConfig,
        streaming: Arc<dyn StreamingBackend>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        let engine = streaming.create_engine();
        let events = engine.events();
        let idle_timeout = config.idle_timeout();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            // Players start out idle, so the idle timer starts ticking right away.
            let mut idle_timer = IdleTimer::new();
            idle_timer.arm(idle_timeout, idle_callback(weak.clone()));

            Inner {
                guild_id,
                idle_timeout,
                streaming,
                transport,
                engine,
                destroyed: AtomicBool::new(false),
                core: Mutex::new(Core {
                    status: PlayerStatus::Idle,
                    queue: TrackQueue::new(),
                    up_next: None,
                    stream: None,
                    session: None,
                    lifecycle_task: None,
                    idle_timer,
                    stop_hook: None,
                    fired_hook: None,
                    pause_requested: false,
                }),
                event_task: parking_lot::Mutex::new(Some(spawn_event_pump(weak.clone(), events))),
            }
        });

        Self { inner }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.inner.guild_id
    }

    /// Lock-free check, usable from sync code.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> PlayerStatus {
        self.inner.core.lock().await.status
    }

    /// Most recently started track.
    pub async fn now_playing(&self) -> Option<TrackRef> {
        self.inner.core.lock().await.queue.current().cloned()
    }

    /// The lookahead slot. Never mutates anything.
    pub async fn peek_next(&self) -> Option<TrackRef> {
        self.inner.core.lock().await.up_next.clone()
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let core = self.inner.core.lock().await;
        PlayerSnapshot {
            guild_id: self.inner.guild_id.clone(),
            status: core.status,
            current: core.queue.current().cloned(),
            up_next: core.up_next.clone(),
            queued: core.queue.iter().cloned().collect(),
            connected: core.session.is_some(),
            idle_timer_armed: core.idle_timer.is_armed(),
        }
    }

    /// Validates `raw` and puts it in the lookahead slot, or at the tail of
    /// the queue when the slot is taken.
    pub async fn add_track(&self, raw: &str) -> PlayerResult<TrackRef> {
        let track = self.parse(raw)?;
        let mut core = self.inner.core.lock().await;
        self.ensure_live(&core)?;

        if core.up_next.is_none() {
            core.up_next = Some(track.clone());
        } else {
            core.queue.enqueue(track.clone());
        }
        debug!(
            "[{}] Queued {} ({} waiting)",
            self.inner.guild_id,
            track,
            core.queue.len()
        );
        Ok(track)
    }

    /// Plays `raw` right away, replacing the current track. The queue is left alone.
    pub async fn play(&self, raw: &str) -> PlayerResult<TrackRef> {
        let track = self.parse(raw)?;
        let mut core = self.inner.core.lock().await;
        self.ensure_live(&core)?;
        let started = self.start(&mut core, track.clone()).await;
        self.release(core);
        started.map(|_| track)
    }

    /// Promotes the lookahead (or queue head) to current and starts it.
    ///
    /// If the stream cannot be opened the promoted track is consumed and the
    /// error returned; the player stays idle.
    pub async fn play_next(&self) -> PlayerResult<NextTrack> {
        let mut guard = self.inner.core.lock().await;
        self.ensure_live(&guard)?;

        let core = &mut *guard;
        let next = match core.up_next.take() {
            Some(track) => Some(track),
            None => core.queue.dequeue(),
        };
        let Some(track) = next else {
            return Ok(NextTrack::NothingToPlay);
        };
        core.up_next = core.queue.dequeue();

        let started = self.start(core, track.clone()).await;
        self.release(guard);
        started.map(|_| NextTrack::Started(track))
    }

    /// Starts the current track again from the top.
    pub async fn replay(&self) -> PlayerResult<NextTrack> {
        let mut core = self.inner.core.lock().await;
        self.ensure_live(&core)?;

        let Some(track) = core.queue.current().cloned() else {
            return Ok(NextTrack::NothingToPlay);
        };
        let started = self.start(&mut core, track.clone()).await;
        self.release(core);
        started.map(|_| NextTrack::Started(track))
    }

    /// Empties the lookahead slot and the queue. The current track keeps
    /// playing. Returns how many tracks were dropped.
    pub async fn clear_queue(&self) -> PlayerResult<usize> {
        let mut core = self.inner.core.lock().await;
        self.ensure_live(&core)?;

        let dropped = core.queue.len() + usize::from(core.up_next.take().is_some());
        core.queue.clear();
        debug!("[{}] Cleared {} queued track(s)", self.inner.guild_id, dropped);
        Ok(dropped)
    }

    /// Playing ⇄ Paused. Does nothing while idle. Returns the resulting status.
    pub async fn toggle_pause(&self) -> PlayerResult<PlayerStatus> {
        let mut core = self.inner.core.lock().await;
        let input = match core.status {
            PlayerStatus::Idle => return Ok(PlayerStatus::Idle),
            PlayerStatus::Playing => Input::Pause,
            PlayerStatus::Paused => Input::Resume,
            PlayerStatus::Destroyed => {
                return Err(PlayerError::Destroyed(self.inner.guild_id.clone()));
            }
        };
        self.apply(&mut core, input).await;
        core.pause_requested = core.status == PlayerStatus::Paused;
        Ok(core.status)
    }

    /// Halts playback and releases the stream; keeps the voice session.
    /// Safe to call in any state.
    pub async fn stop(&self) {
        let mut core = self.inner.core.lock().await;
        self.apply(&mut core, Input::Stop).await;
        self.release(core);
    }

    /// Tears the player down for good. Safe to call repeatedly and concurrently.
    pub async fn destroy(&self) {
        let mut core = self.inner.core.lock().await;
        if self.apply(&mut core, Input::Destroy).await {
            info!("[{}] Player destroyed", self.inner.guild_id);
        }
        self.release(core);
    }

    /// Registers a one-shot callback run by the next stop or teardown, e.g. to
    /// delete a "now playing" message. Replaces any previous hook.
    ///
    /// The hook runs after the player lock is released, so it may call back
    /// into the controller.
    pub async fn attach_stop_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.core.lock().await.stop_hook = Some(Box::new(hook));
    }

    /// Connects to a voice channel and routes this player's audio into it.
    /// A second call while connected is a no-op.
    pub async fn join(
        &self,
        channel_id: ChannelId,
        guild_id: GuildId,
        adapter: Arc<dyn GatewayAdapter>,
    ) -> PlayerResult<()> {
        let mut core = self.inner.core.lock().await;
        self.ensure_live(&core)?;
        if core.session.is_some() {
            debug!("[{}] Already connected, ignoring join", self.inner.guild_id);
            return Ok(());
        }

        let Connection { session, events } = self
            .inner
            .transport
            .connect(&channel_id, &guild_id, adapter)
            .await
            .map_err(|source| PlayerError::Connect {
                guild: guild_id.clone(),
                channel: channel_id.clone(),
                source,
            })?;

        self.inner
            .transport
            .subscribe(&session, self.inner.engine.clone());
        info!(
            "[{}] Joined channel {} (session {})",
            self.inner.guild_id, channel_id, session.session_id
        );

        core.lifecycle_task = Some(spawn_lifecycle_watcher(
            Arc::downgrade(&self.inner),
            session.session_id.clone(),
            events,
        ));
        core.session = Some(session);

        // Joining counts as activity.
        if core.status.wants_idle_timer() {
            self.run_effect(&mut core, Effect::ArmIdleTimer).await;
        }
        Ok(())
    }

    /// Looks up the display title of `raw` through the streaming backend.
    pub async fn title(&self, raw: &str) -> PlayerResult<String> {
        let track = self.parse(raw)?;
        self.inner
            .streaming
            .fetch_title(&track)
            .await
            .map_err(|source| PlayerError::Metadata {
                reference: track.to_string(),
                source,
            })
    }

    /// Feeds an engine notification into the state machine. Events about any
    /// stream other than the current one are dropped.
    pub async fn on_engine_event(&self, event: EngineEvent) {
        let mut core = self.inner.core.lock().await;
        if core.stream.as_ref().map(StreamHandle::id) != Some(event.stream()) {
            debug!(
                "[{}] Dropping event for stale stream {}",
                self.inner.guild_id,
                event.stream()
            );
            return;
        }

        let input = match event {
            EngineEvent::Status { status, .. } => match status {
                EngineStatus::Idle => Input::StreamEnded,
                // Reported before the user paused; hold the engine to the pause.
                EngineStatus::Playing if core.pause_requested => {
                    debug!(
                        "[{}] Ignoring stale playing report while paused",
                        self.inner.guild_id
                    );
                    self.inner.engine.pause();
                    return;
                }
                EngineStatus::Playing => Input::BackendPlaying,
                EngineStatus::Paused => Input::BackendPaused,
            },
            EngineEvent::Error { stream, message } => {
                warn!(
                    "[{}] Playback error on stream {}: {}",
                    self.inner.guild_id, stream, message
                );
                Input::StreamFailed
            }
        };
        self.apply(&mut core, input).await;
    }

    fn parse(&self, raw: &str) -> PlayerResult<TrackRef> {
        TrackRef::parse_with(raw, |r| self.inner.streaming.validate(r))
    }

    fn ensure_live(&self, core: &Core) -> PlayerResult<()> {
        if core.status.is_live() {
            Ok(())
        } else {
            Err(PlayerError::Destroyed(self.inner.guild_id.clone()))
        }
    }

    /// Stops whatever is playing, opens `track` and starts it.
    async fn start(&self, core: &mut Core, track: TrackRef) -> PlayerResult<()> {
        self.apply(core, Input::Stop).await;

        let stream = match self.inner.streaming.open_stream(&track).await {
            Ok(stream) => stream,
            Err(source) => {
                warn!(
                    "[{}] Could not open stream for {}: {}",
                    self.inner.guild_id, track, source
                );
                return Err(PlayerError::StreamOpen {
                    reference: track.to_string(),
                    source,
                });
            }
        };

        info!(
            "[{}] Playback: {} (stream {})",
            self.inner.guild_id,
            track,
            stream.id()
        );
        core.stream = Some(stream);
        core.queue.set_current(track);
        self.apply(core, Input::Play).await;
        Ok(())
    }

    /// Runs one state machine step. Returns false if `input` was ignored.
    async fn apply(&self, core: &mut Core, input: Input) -> bool {
        let Some(Transition { next, effects }) = transition(core.status, input) else {
            debug!(
                "[{}] {:?} ignored while {:?}",
                self.inner.guild_id, input, core.status
            );
            return false;
        };

        debug!(
            "[{}] {:?} -> {:?} on {:?}",
            self.inner.guild_id, core.status, next, input
        );
        core.status = next;
        if next != PlayerStatus::Paused {
            core.pause_requested = false;
        }
        if next == PlayerStatus::Destroyed {
            self.inner.destroyed.store(true, Ordering::SeqCst);
        }

        for effect in effects {
            self.run_effect(core, effect).await;
        }
        true
    }

    async fn run_effect(&self, core: &mut Core, effect: Effect) {
        match effect {
            Effect::ArmIdleTimer => core.idle_timer.arm(
                self.inner.idle_timeout,
                idle_callback(Arc::downgrade(&self.inner)),
            ),
            Effect::CancelIdleTimer => core.idle_timer.cancel(),
            Effect::StartPlayback => {
                if let Some(stream) = &core.stream {
                    self.inner.engine.play(stream.clone());
                }
            }
            Effect::PauseBackend => self.inner.engine.pause(),
            Effect::ResumeBackend => self.inner.engine.unpause(),
            Effect::StopBackend => self.inner.engine.stop(),
            Effect::CloseStream => {
                if let Some(stream) = core.stream.take() {
                    stream.close();
                }
            }
            Effect::NotifyStopped => {
                if let Some(hook) = core.stop_hook.take() {
                    core.fired_hook = Some(hook);
                }
            }
            Effect::CloseSession => {
                if let Some(task) = core.lifecycle_task.take() {
                    task.abort();
                }
                if let Some(session) = core.session.take() {
                    info!(
                        "[{}] Leaving channel {} (session {})",
                        self.inner.guild_id, session.channel_id, session.session_id
                    );
                    self.inner.transport.disconnect(session).await;
                }
            }
        }
    }

    async fn on_idle_timeout(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        if !core.idle_timer.claim(generation) {
            debug!("[{}] Ignoring stale idle timer", self.inner.guild_id);
            return;
        }
        info!(
            "[{}] Idle for {:?}, tearing player down",
            self.inner.guild_id, self.inner.idle_timeout
        );
        self.apply(&mut core, Input::IdleTimeout).await;
        self.release(core);
    }

    /// Returns true once the watcher has nothing left to do.
    async fn on_session_event(&self, session_id: &SessionId, event: SessionEvent) -> bool {
        if event != SessionEvent::Destroyed {
            debug!(
                "[{}] Voice session {} is {:?}",
                self.inner.guild_id, session_id, event
            );
            return false;
        }

        let mut core = self.inner.core.lock().await;
        if core.session.as_ref().map(|s| &s.session_id) != Some(session_id) {
            return true;
        }

        warn!(
            "[{}] Voice session {} destroyed externally, stopping",
            self.inner.guild_id, session_id
        );
        self.apply(&mut core, Input::Stop).await;
        core.session = None;
        // This is the running watcher; detach rather than abort.
        core.lifecycle_task = None;
        self.release(core);
        true
    }

    /// Drops the lock, then runs a stop hook fired while it was held.
    fn release(&self, mut core: MutexGuard<'_, Core>) {
        let hook = core.fired_hook.take();
        drop(core);
        if let Some(hook) = hook {
            hook();
        }
    }
}

type IdleCallback = Box<dyn FnOnce(u64) -> BoxFuture<'static, ()> + Send>;

// Boxed so the timer future does not have to name the controller's own futures.
fn idle_callback(weak: Weak<Inner>) -> IdleCallback {
    Box::new(move |generation| {
        async move {
            if let Some(inner) = weak.upgrade() {
                PlaybackController { inner }
                    .on_idle_timeout(generation)
                    .await;
            }
        }
        .boxed()
    })
}

fn spawn_event_pump(weak: Weak<Inner>, events: flume::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let controller = PlaybackController { inner };
            controller.on_engine_event(event).await;
            if controller.is_destroyed() {
                break;
            }
        }
    })
}

fn spawn_lifecycle_watcher(
    weak: Weak<Inner>,
    session_id: SessionId,
    events: flume::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let controller = PlaybackController { inner };
            if controller.on_session_event(&session_id, event).await {
                break;
            }
        }
    })
}
