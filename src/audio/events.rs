use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::{
    error::{ResolutionError, SinkError},
    sources::{FullTrack, PreviewTrack},
};

/// Something the response layer may want to tell the guild about.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    NowPlaying(Arc<FullTrack>),
    /// A queued track could not be resolved and was skipped.
    ResolutionFailed {
        track: PreviewTrack,
        error: ResolutionError,
    },
    /// The sink refused to start a track, or faulted while playing it.
    PlaybackFault {
        title: String,
        error: SinkError,
    },
    /// The queue stayed empty for the whole idle window; the session is
    /// being torn down.
    IdleDisconnect,
}

/// Fire-and-forget delivery of [`PlayerEvent`]s.
pub trait Notifier: Send + Sync {
    fn notify(&self, guild_id: GuildId, event: PlayerEvent);
}

impl Notifier for UnboundedSender<(GuildId, PlayerEvent)> {
    fn notify(&self, guild_id: GuildId, event: PlayerEvent) {
        if self.send((guild_id, event)).is_err() {
            warn!("Event receiver closed, dropping notification for guild {}", guild_id);
        }
    }
}
