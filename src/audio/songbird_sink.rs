use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{
    error::ControlError as TrackControlError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    audio::sink::{completion_pair, ActivePlayback, AudioSink, CompletionSignal, SinkHandle},
    error::SinkError,
    sources::FullTrack,
};

/// Builds the HTTP client used to pull audio streams.
///
/// No overall request timeout: a stream stays open for the whole track.
pub fn stream_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .user_agent("Mozilla/5.0 (compatible; jukebox)")
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(60))
        .build()
}

/// Voice connection of one guild, backed by a songbird [`Call`].
pub struct SongbirdSink {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    songbird: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdSink {
    pub fn new(
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
        songbird: Arc<Songbird>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            guild_id,
            call,
            songbird,
            http,
        }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn start(&self, track: &FullTrack, volume: f32) -> Result<ActivePlayback, SinkError> {
        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url().to_string()).into();

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_connection().is_none() {
                return Err(SinkError::NotConnected);
            }
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(volume) {
            warn!("Could not set volume in guild {}: {:?}", self.guild_id, e);
        }

        let (signal, completion) = completion_pair();
        for event in [TrackEvent::End, TrackEvent::Error] {
            let registered = handle.add_event(
                Event::Track(event),
                CompletionNotifier {
                    guild_id: self.guild_id,
                    signal: signal.clone(),
                },
            );

            // the track is already over; no event would ever arrive
            if let Err(e) = registered {
                debug!("Track in guild {} ended before events were attached: {:?}", self.guild_id, e);
                signal.fire(Ok(()));
            }
        }

        debug!("🎧 Streaming {} in guild {}", track.title(), self.guild_id);
        Ok(ActivePlayback {
            handle: Arc::new(SongbirdHandle(handle)),
            completion,
        })
    }

    async fn release(&self) {
        match self.songbird.remove(self.guild_id).await {
            Ok(()) => debug!("🔌 Left voice in guild {}", self.guild_id),
            Err(e) => debug!("Voice connection of guild {} already gone: {:?}", self.guild_id, e),
        }
    }
}

/// Fires the completion signal from songbird's track events.
struct CompletionNotifier {
    guild_id: GuildId,
    signal: CompletionSignal,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let failure = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        let outcome = match failure {
            Some(reason) => {
                warn!("❌ Track error in guild {}: {}", self.guild_id, reason);
                Err(SinkError::Playback(reason))
            }
            None => Ok(()),
        };
        self.signal.fire(outcome);

        None
    }
}

struct SongbirdHandle(TrackHandle);

fn control_error(e: TrackControlError) -> SinkError {
    SinkError::Control(format!("{:?}", e))
}

impl SinkHandle for SongbirdHandle {
    fn stop(&self) -> Result<(), SinkError> {
        match self.0.stop() {
            Ok(()) | Err(TrackControlError::Finished) => Ok(()),
            Err(e) => Err(control_error(e)),
        }
    }

    fn pause(&self) -> Result<(), SinkError> {
        self.0.pause().map_err(control_error)
    }

    fn resume(&self) -> Result<(), SinkError> {
        self.0.play().map_err(control_error)
    }

    fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        self.0.set_volume(volume).map_err(control_error)
    }
}
