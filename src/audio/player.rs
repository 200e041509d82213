use futures::FutureExt;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serenity::model::id::GuildId;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        clock::PlaybackClock,
        events::{Notifier, PlayerEvent},
        queue::{QueuePage, SongQueue},
        sink::{ActivePlayback, AudioSink, SinkHandle},
    },
    error::{ControlError, ResolutionError, SinkError},
    sources::{FullTrack, PreviewTrack, TrackResolver},
};

/// Tunables for every session's player loop.
#[derive(Debug, Clone, Copy)]
pub struct PlayerSettings {
    /// How long the loop waits on an empty queue before tearing the session down.
    pub idle_timeout: Duration,
    pub default_volume: f32,
    /// Upper bound on a single full resolution.
    pub resolve_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(180),
            default_volume: 0.5,
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the player loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    /// Waiting on the queue.
    Idle,
    /// Full resolution in flight for the next track.
    Resolving,
    Playing,
    /// Completion fired, about to start the next cycle.
    Finishing,
    /// The loop has exited; the session is dead.
    Stopped,
}

/// Why the player loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    IdleTimeout,
    Cancelled,
}

/// The track being streamed together with its sink handle. Stored as one
/// value so the two can only be observed together.
struct NowPlaying {
    track: Arc<FullTrack>,
    handle: Arc<dyn SinkHandle>,
    clock: PlaybackClock,
}

struct SessionState {
    now_playing: Option<NowPlaying>,
    phase: PlayerPhase,
    looping: bool,
    volume: f32,
}

/// Snapshot of the current track for display.
#[derive(Debug, Clone)]
pub struct NowPlayingInfo {
    pub track: Arc<FullTrack>,
    pub elapsed: Duration,
    pub paused: bool,
    pub looping: bool,
}

enum Cycle {
    /// Start the next cycle, replaying this track if looping is on.
    Continue(Option<Arc<FullTrack>>),
    Exit(LoopExit),
}

/// Playback state of one guild: its queue, the current track and the
/// background loop that drives playback.
///
/// Only the player loop starts tracks or clears the current track after
/// completion. Control operations act on the queue, on flags, or on the
/// sink handle of the current track.
pub struct PlaybackSession {
    guild_id: GuildId,
    queue: SongQueue,
    state: Mutex<SessionState>,
    sink: RwLock<Option<Arc<dyn AudioSink>>>,
    resolver: Arc<dyn TrackResolver>,
    notifier: Arc<dyn Notifier>,
    settings: PlayerSettings,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl PlaybackSession {
    pub fn new(
        guild_id: GuildId,
        resolver: Arc<dyn TrackResolver>,
        notifier: Arc<dyn Notifier>,
        settings: PlayerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            queue: SongQueue::new(),
            state: Mutex::new(SessionState {
                now_playing: None,
                phase: PlayerPhase::Idle,
                looping: false,
                volume: settings.default_volume.clamp(0.0, 1.0),
            }),
            sink: RwLock::new(None),
            resolver,
            notifier,
            settings,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Runs the player loop until the idle window elapses on an empty queue
    /// or the session is shut down.
    ///
    /// A panic inside one cycle is logged and reported; the loop then
    /// carries on with the next cycle.
    pub async fn run(self: Arc<Self>) -> LoopExit {
        info!("▶️ Player loop started for guild {}", self.guild_id);
        let mut replay = None;

        loop {
            match AssertUnwindSafe(self.cycle(replay.take()))
                .catch_unwind()
                .await
            {
                Ok(Cycle::Continue(next)) => replay = next,
                Ok(Cycle::Exit(exit)) => {
                    self.state.lock().phase = PlayerPhase::Stopped;
                    info!("⏹️ Player loop for guild {} exited: {:?}", self.guild_id, exit);
                    return exit;
                }
                Err(panic) => self.recover_from_panic(panic),
            }
        }
    }

    async fn cycle(&self, replay: Option<Arc<FullTrack>>) -> Cycle {
        self.state.lock().phase = PlayerPhase::Idle;

        let track = match replay.filter(|_| self.is_looping()) {
            Some(track) => {
                debug!("🔂 Replaying {} in guild {}", track.title(), self.guild_id);
                track
            }
            None => {
                let preview = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Cycle::Exit(LoopExit::Cancelled),
                    next = tokio::time::timeout(self.settings.idle_timeout, self.queue.dequeue()) => {
                        match next {
                            Ok(preview) => preview,
                            Err(_) => {
                                {
                                    let mut state = self.state.lock();
                                    // enqueue pushes under this lock, so a track
                                    // that beat the deadline is still seen here
                                    if !self.queue.is_empty() {
                                        return Cycle::Continue(None);
                                    }
                                    state.phase = PlayerPhase::Stopped;
                                }
                                info!("💤 Guild {} idle for {:?}, leaving", self.guild_id, self.settings.idle_timeout);
                                self.notifier.notify(self.guild_id, PlayerEvent::IdleDisconnect);
                                return Cycle::Exit(LoopExit::IdleTimeout);
                            }
                        }
                    }
                };

                match self.resolve(preview).await {
                    Some(Ok(track)) => track,
                    Some(Err(())) => return Cycle::Continue(None),
                    None => return Cycle::Exit(LoopExit::Cancelled),
                }
            }
        };

        let sink = self.sink.read().clone();
        let Some(sink) = sink else {
            self.report_fault(track.title(), SinkError::NotConnected);
            return Cycle::Continue(None);
        };

        let volume = self.volume();
        let started = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Cycle::Exit(LoopExit::Cancelled),
            started = sink.start(&track, volume) => started,
        };
        let ActivePlayback { handle, completion } = match started {
            Ok(playback) => playback,
            Err(error) => {
                self.report_fault(track.title(), error);
                return Cycle::Continue(None);
            }
        };

        {
            let mut state = self.state.lock();
            // shutdown cancels before it takes the current track, so checking
            // under the lock closes the window between start and store
            if self.cancel.is_cancelled() {
                drop(state);
                if let Err(e) = handle.stop() {
                    warn!("Could not stop track in guild {}: {}", self.guild_id, e);
                }
                return Cycle::Exit(LoopExit::Cancelled);
            }
            state.now_playing = Some(NowPlaying {
                track: track.clone(),
                handle,
                clock: PlaybackClock::start(),
            });
            state.phase = PlayerPhase::Playing;
        }

        info!("🎵 Now playing in guild {}: {}", self.guild_id, track.title());
        self.notifier
            .notify(self.guild_id, PlayerEvent::NowPlaying(track.clone()));

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.stop_current();
                return Cycle::Exit(LoopExit::Cancelled);
            }
            outcome = completion.wait() => outcome,
        };

        {
            let mut state = self.state.lock();
            state.now_playing = None;
            state.phase = PlayerPhase::Finishing;
        }

        match outcome {
            Ok(()) => {
                debug!("Finished {} in guild {}", track.title(), self.guild_id);
                Cycle::Continue(Some(track))
            }
            Err(error) => {
                self.report_fault(track.title(), error);
                // a faulting track is not replayed even when looping
                Cycle::Continue(None)
            }
        }
    }

    /// `None` when cancelled, `Some(Err(()))` after a reported failure.
    async fn resolve(&self, preview: PreviewTrack) -> Option<Result<Arc<FullTrack>, ()>> {
        self.state.lock().phase = PlayerPhase::Resolving;
        debug!("Resolving {} for guild {}", preview.display_title(), self.guild_id);

        let resolved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            resolved = tokio::time::timeout(
                self.settings.resolve_timeout,
                self.resolver.resolve_full(&preview),
            ) => resolved.unwrap_or(Err(ResolutionError::Timeout(self.settings.resolve_timeout))),
        };

        match resolved {
            Ok(track) => Some(Ok(Arc::new(track))),
            Err(error) => {
                warn!(
                    "❌ Could not resolve {} in guild {}: {}",
                    preview.display_title(),
                    self.guild_id,
                    error
                );
                self.notifier.notify(
                    self.guild_id,
                    PlayerEvent::ResolutionFailed {
                        track: preview,
                        error,
                    },
                );
                Some(Err(()))
            }
        }
    }

    fn report_fault(&self, title: &str, error: SinkError) {
        warn!("⚠️ Playback fault in guild {} on {}: {}", self.guild_id, title, error);
        self.notifier.notify(
            self.guild_id,
            PlayerEvent::PlaybackFault {
                title: title.to_string(),
                error,
            },
        );
    }

    fn recover_from_panic(&self, panic: Box<dyn Any + Send>) {
        let message = panic_message(panic.as_ref());
        error!("💥 Player loop cycle panicked in guild {}: {}", self.guild_id, message);

        let title = self
            .stop_current()
            .map(|track| track.title().to_string())
            .unwrap_or_else(|| "player loop".to_string());
        self.report_fault(&title, SinkError::Playback(message));
    }

    /// Takes the current track out of the state and stops its handle.
    fn stop_current(&self) -> Option<Arc<FullTrack>> {
        let now_playing = self.state.lock().now_playing.take()?;
        if let Err(e) = now_playing.handle.stop() {
            warn!("Could not stop track in guild {}: {}", self.guild_id, e);
        }
        Some(now_playing.track)
    }

    // Connection

    /// Attaches the voice connection future tracks are streamed to,
    /// replacing any previous one. Returns the previous connection.
    pub fn connect(&self, sink: Arc<dyn AudioSink>) -> Result<Option<Arc<dyn AudioSink>>, ControlError> {
        self.accepting()?;
        Ok(self.sink.write().replace(sink))
    }

    pub fn is_connected(&self) -> bool {
        self.sink.read().is_some()
    }

    /// Stops the loop, clears the queue, stops the current track and
    /// releases the connection. Returns false if already shut down.
    pub async fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.cancel.cancel();
        let cleared = self.queue.clear();
        {
            let mut state = self.state.lock();
            state.looping = false;
            state.phase = PlayerPhase::Stopped;
        }
        self.stop_current();

        let sink = self.sink.write().take();
        if let Some(sink) = sink {
            sink.release().await;
        }

        info!(
            "👋 Session for guild {} shut down ({} queued tracks dropped)",
            self.guild_id, cleared
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Locks the state if the session still has a running loop. Holding the
    /// guard while enqueueing keeps the idle exit from missing the track.
    fn accepting(&self) -> Result<MutexGuard<'_, SessionState>, ControlError> {
        let state = self.state.lock();
        if self.is_closed() || state.phase == PlayerPhase::Stopped {
            return Err(ControlError::SessionClosed);
        }
        Ok(state)
    }

    // Queue operations

    /// Queues a track and returns its 0-based position at insertion.
    pub fn enqueue(&self, track: PreviewTrack) -> Result<usize, ControlError> {
        let _state = self.accepting()?;
        Ok(self.queue.enqueue(track))
    }

    pub fn enqueue_all(&self, tracks: Vec<PreviewTrack>) -> Result<usize, ControlError> {
        let _state = self.accepting()?;
        Ok(self.queue.extend(tracks))
    }

    pub fn queue(&self) -> &SongQueue {
        &self.queue
    }

    pub fn queue_page(&self, page: usize, per_page: usize) -> QueuePage {
        self.queue.page(page, per_page)
    }

    pub fn remove(&self, index: usize) -> Result<PreviewTrack, ControlError> {
        Ok(self.queue.remove(index)?)
    }

    pub fn move_track(&self, from: usize, to: usize) -> Result<PreviewTrack, ControlError> {
        Ok(self.queue.move_track(from, to)?)
    }

    pub fn shuffle(&self) -> Result<(), ControlError> {
        Ok(self.queue.shuffle()?)
    }

    pub fn clear_queue(&self) -> usize {
        self.queue.clear()
    }

    // Playback control

    pub fn is_playing(&self) -> bool {
        self.state.lock().now_playing.is_some()
    }

    pub fn phase(&self) -> PlayerPhase {
        self.state.lock().phase
    }

    pub fn now_playing(&self) -> Option<NowPlayingInfo> {
        let state = self.state.lock();
        state.now_playing.as_ref().map(|np| NowPlayingInfo {
            track: np.track.clone(),
            elapsed: np.clock.elapsed(),
            paused: np.clock.is_paused(),
            looping: state.looping,
        })
    }

    /// Stops the current track; the loop advances as if it ended.
    pub fn skip(&self) -> Result<Arc<FullTrack>, ControlError> {
        let (track, handle) = {
            let state = self.state.lock();
            let np = state
                .now_playing
                .as_ref()
                .ok_or(ControlError::NothingPlaying)?;
            (np.track.clone(), np.handle.clone())
        };

        handle.stop()?;
        info!("⏭️ Skipped {} in guild {}", track.title(), self.guild_id);
        Ok(track)
    }

    pub fn pause(&self) -> Result<(), ControlError> {
        let mut state = self.state.lock();
        let np = state
            .now_playing
            .as_mut()
            .ok_or(ControlError::NothingPlaying)?;
        if np.clock.is_paused() {
            return Err(ControlError::AlreadyPaused);
        }

        np.handle.pause()?;
        np.clock.pause();
        info!("⏸️ Paused in guild {}", self.guild_id);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ControlError> {
        let mut state = self.state.lock();
        let np = state
            .now_playing
            .as_mut()
            .ok_or(ControlError::NothingPlaying)?;
        if !np.clock.is_paused() {
            return Err(ControlError::NotPaused);
        }

        np.handle.resume()?;
        np.clock.resume();
        info!("▶️ Resumed in guild {}", self.guild_id);
        Ok(())
    }

    /// Clears the queue, turns loop off and stops the current track without
    /// leaving. Returns how many queued tracks were dropped.
    pub fn stop(&self) -> Result<usize, ControlError> {
        let cleared = self.queue.clear();
        let current = {
            let mut state = self.state.lock();
            state.looping = false;
            state
                .now_playing
                .as_ref()
                .map(|np| (np.track.clone(), np.handle.clone()))
        };

        if let Some((track, handle)) = current {
            handle.stop()?;
            info!("⏹️ Stopped {} in guild {}", track.title(), self.guild_id);
        }
        Ok(cleared)
    }

    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    /// Flips the loop flag. Only meaningful while something is playing.
    pub fn toggle_loop(&self) -> Result<bool, ControlError> {
        let mut state = self.state.lock();
        if state.now_playing.is_none() {
            return Err(ControlError::NothingPlaying);
        }

        state.looping = !state.looping;
        info!("🔁 Loop {} in guild {}", if state.looping { "on" } else { "off" }, self.guild_id);
        Ok(state.looping)
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Sets the volume for the current and all following tracks.
    pub fn set_volume(&self, volume: f32) -> Result<(), ControlError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(ControlError::VolumeOutOfRange(volume));
        }

        let mut state = self.state.lock();
        state.volume = volume;
        if let Some(np) = &state.now_playing {
            np.handle.set_volume(volume)?;
        }

        info!("🔊 Volume set to {}% in guild {}", (volume * 100.0).round() as u32, self.guild_id);
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
