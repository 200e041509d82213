use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::GuildId,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::{audio::events::PlayerEvent, bot::AnnounceChannels, ui::embeds};

/// Posts player events to the channel each guild last used a command in.
///
/// Runs until every sender is dropped. Sending is awaited here, never on a
/// player loop.
pub async fn run_announcer(
    http: Arc<Http>,
    channels: AnnounceChannels,
    mut events: UnboundedReceiver<(GuildId, PlayerEvent)>,
) {
    info!("📣 Announcer started");

    while let Some((guild_id, event)) = events.recv().await {
        let channel_id = channels.get(&guild_id).map(|channel| *channel);
        let Some(channel_id) = channel_id else {
            debug!("No announce channel for guild {}, dropping {:?}", guild_id, event);
            continue;
        };

        if matches!(event, PlayerEvent::IdleDisconnect) {
            channels.remove(&guild_id);
        }

        let message = CreateMessage::new().embed(announcement_embed(&event));
        if let Err(e) = channel_id.send_message(http.as_ref(), message).await {
            warn!("Could not announce in guild {}: {:?}", guild_id, e);
        }
    }

    info!("📣 Announcer stopped");
}

pub fn announcement_embed(event: &PlayerEvent) -> CreateEmbed {
    match event {
        PlayerEvent::NowPlaying(track) => embeds::create_now_playing_embed(track),
        PlayerEvent::ResolutionFailed { track, error } => embeds::create_error_embed(
            "Skipped unplayable track",
            &format!("**{}**\n{}", track.display_title(), error),
        ),
        PlayerEvent::PlaybackFault { title, error } => embeds::create_warning_embed(
            "Playback problem",
            &format!("**{}**\n{}", title, error),
        ),
        PlayerEvent::IdleDisconnect => embeds::create_info_embed(
            "Leaving",
            "Nothing was queued for a while, so I left the voice channel.",
        ),
    }
}
