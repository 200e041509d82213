use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::player::PlaybackSession,
    bot::JukeboxBot,
    error::{ControlError, QueueError},
    ui::embeds::{self, QUEUE_PAGE_SIZE},
};

/// Dispatches a slash command
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a guild"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );
    bot.remember_channel(guild_id, command.channel_id);

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "move" => handle_move(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        _ => reply_error(ctx, &command, "Unknown command", "This command is not recognised.").await?,
    }

    Ok(())
}

// Connection

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_error(ctx, command, "Not in voice", "You are not connected to a voice channel.").await;
    };

    match bot.connect_voice(ctx, guild_id, channel_id).await {
        Ok(_) => reply_text(ctx, command, format!("🔊 Joined <#{}>", channel_id)).await,
        Err(e) => {
            warn!("Join failed in guild {}: {:?}", guild_id, e);
            reply_error(ctx, command, "Could not join", &e.to_string()).await
        }
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.leave_voice(ctx, guild_id).await {
        reply_text(ctx, command, "👋 Left the voice channel").await
    } else {
        reply_error(ctx, command, "Not connected", "I am not in a voice channel.").await
    }
}

// Playback

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    // resolving may take a while
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, embeds::create_error_embed("Not in voice", "You are not connected to a voice channel.")).await;
    };

    let previews = match bot.resolver.resolve_preview(&query, command.user.id).await {
        Ok(previews) => previews,
        Err(e) => {
            warn!("Preview resolution failed for '{}': {}", query, e);
            return edit(ctx, command, embeds::create_error_embed("Nothing found", &e.to_string())).await;
        }
    };

    // the session may idle out while the lookup runs; a closed one is
    // replaced once
    let mut retried = false;
    let enqueued = loop {
        let session = match bot.sessions.get(guild_id).filter(|s| s.is_connected()) {
            Some(session) => session,
            None => match bot.connect_voice(ctx, guild_id, channel_id).await {
                Ok(session) => session,
                Err(e) => {
                    return edit(ctx, command, embeds::create_error_embed("Could not join", &e.to_string())).await;
                }
            },
        };

        let room = bot.config().max_queue_size.saturating_sub(session.queue().len());
        if room == 0 {
            let reason = format!("The queue is full ({} tracks).", bot.config().max_queue_size);
            return edit(ctx, command, embeds::create_error_embed("Queue full", &reason)).await;
        }

        match enqueue_previews(&session, previews.clone(), room) {
            Err(ControlError::SessionClosed) if !retried => {
                debug!("Session for guild {} closed during lookup, reconnecting", guild_id);
                retried = true;
            }
            result => break result,
        }
    };

    let embed = match enqueued {
        Ok(Enqueued::Single { track, position }) => embeds::create_track_added_embed(&track, position),
        Ok(Enqueued::Many { added, dropped }) => {
            let mut embed = embeds::create_playlist_added_embed(added, &query);
            if dropped > 0 {
                embed = embed.field("⚠️ Skipped", format!("{} tracks did not fit in the queue", dropped), false);
            }
            embed
        }
        Err(e) => embeds::create_error_embed("Could not queue", &control_error_message(&e)),
    };

    edit(ctx, command, embed).await
}

enum Enqueued {
    Single {
        track: crate::sources::PreviewTrack,
        position: usize,
    },
    Many {
        added: usize,
        dropped: usize,
    },
}

/// Queues at most `room` of `previews`. A single result reports its
/// 1-based queue position.
fn enqueue_previews(
    session: &PlaybackSession,
    mut previews: Vec<crate::sources::PreviewTrack>,
    room: usize,
) -> Result<Enqueued, ControlError> {
    if previews.len() == 1 {
        let track = previews.remove(0);
        let index = session.enqueue(track.clone())?;
        return Ok(Enqueued::Single {
            track,
            position: index + 1,
        });
    }

    let total = previews.len();
    previews.truncate(room);
    let added = session.enqueue_all(previews)?;
    Ok(Enqueued::Many {
        added,
        dropped: total - added,
    })
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.pause() {
        Ok(()) => reply_text(ctx, command, "⏸️ Paused").await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.resume() {
        Ok(()) => reply_text(ctx, command, "▶️ Resumed").await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let was_playing = session.is_playing();
    let cleared = match session.stop() {
        Ok(cleared) => cleared,
        Err(e) => return reply_control_error(ctx, command, &e).await,
    };
    if !was_playing && cleared == 0 {
        return reply_text(ctx, command, "💤 Nothing to stop").await;
    }
    reply_text(ctx, command, format!("⏹️ Stopped and cleared {} queued tracks", cleared)).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.skip() {
        Ok(track) => reply_text(ctx, command, format!("⏭️ Skipped {}", track)).await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.now_playing() {
        Some(info) => reply(ctx, command, embeds::create_now_playing_status_embed(&info)).await,
        None => reply_control_error(ctx, command, &ControlError::NothingPlaying).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.toggle_loop() {
        Ok(true) => reply_text(ctx, command, "🔂 Looping the current song").await,
        Ok(false) => reply_text(ctx, command, "➡️ Loop disabled").await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let Some(level) = option_int(command, "level") else {
        return reply(ctx, command, embeds::create_volume_embed(session.volume())).await;
    };

    match percent_to_volume(level) {
        Some(volume) => match session.set_volume(volume) {
            Ok(()) => reply(ctx, command, embeds::create_volume_embed(volume)).await,
            Err(e) => reply_control_error(ctx, command, &e).await,
        },
        None => {
            reply_error(ctx, command, "Invalid volume", "Volume must be between 0 and 100.").await
        }
    }
}

// Queue

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let page = option_int(command, "page").unwrap_or(1).max(1) as usize;
    let queue_page = session.queue_page(page, QUEUE_PAGE_SIZE);
    let current = session.now_playing();

    reply(ctx, command, embeds::create_queue_embed(&queue_page, current.as_ref())).await
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match session.shuffle() {
        Ok(()) => reply_text(ctx, command, "🔀 Queue shuffled").await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let Some(index) = option_int(command, "index").and_then(to_queue_index) else {
        return reply_error(ctx, command, "Invalid position", "Positions start at 1.").await;
    };

    match session.remove(index) {
        Ok(track) => reply_text(ctx, command, format!("❌ Removed **{}**", track.display_title())).await,
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_move(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let from = option_int(command, "from").and_then(to_queue_index);
    let to = option_int(command, "to").and_then(to_queue_index);
    let (Some(from), Some(to)) = (from, to) else {
        return reply_error(ctx, command, "Invalid position", "Positions start at 1.").await;
    };

    match session.move_track(from, to) {
        Ok(track) => {
            reply_text(ctx, command, format!("📍 Moved **{}** to position {}", track.display_title(), to + 1)).await
        }
        Err(e) => reply_control_error(ctx, command, &e).await,
    }
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = require_session(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let cleared = session.clear_queue();
    reply_text(ctx, command, format!("🧹 Cleared {} tracks from the queue", cleared)).await
}

// Helpers

/// The guild's live session, or an error reply if there is none.
async fn require_session(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<Option<Arc<PlaybackSession>>> {
    match bot.sessions.get(guild_id) {
        Some(session) => Ok(Some(session)),
        None => {
            reply_error(
                ctx,
                command,
                "Not connected",
                "I am not in a voice channel. Use `/join` or `/play` first.",
            )
            .await?;
            Ok(None)
        }
    }
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// 1-based position as typed by users to a 0-based queue index.
fn to_queue_index(position: i64) -> Option<usize> {
    usize::try_from(position).ok()?.checked_sub(1)
}

/// 0-100 as typed by users to the 0.0-1.0 volume scale.
fn percent_to_volume(percent: i64) -> Option<f32> {
    (0..=100).contains(&percent).then(|| percent as f32 / 100.0)
}

/// User-facing wording for a rejected operation, with 1-based positions.
fn control_error_message(error: &ControlError) -> String {
    match error {
        ControlError::Queue(QueueError::IndexOutOfRange { index, len }) => format!(
            "There is no track at position {} (the queue has {}).",
            index + 1,
            len
        ),
        ControlError::Queue(QueueError::SamePosition(index)) => {
            format!("That track is already at position {}.", index + 1)
        }
        ControlError::VolumeOutOfRange(_) => "Volume must be between 0 and 100.".to_string(),
        other => {
            let message = other.to_string();
            let mut chars = message.chars();
            match chars.next() {
                Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
                None => message,
            }
        }
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn reply_text(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

async fn reply_error(
    ctx: &Context,
    command: &CommandInteraction,
    title: &str,
    description: &str,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_error_embed(title, description))
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_control_error(ctx: &Context, command: &CommandInteraction, error: &ControlError) -> Result<()> {
    reply_error(ctx, command, "Can't do that", &control_error_message(error)).await
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{player::PlayerSettings, player::tests::preview},
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;

    fn session() -> Arc<PlaybackSession> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        PlaybackSession::new(
            GuildId::new(5),
            Arc::new(MockTrackResolver::new()),
            Arc::new(tx),
            PlayerSettings::default(),
        )
    }

    #[test]
    fn test_positions_are_one_based() {
        assert_eq!(to_queue_index(1), Some(0));
        assert_eq!(to_queue_index(10), Some(9));
        assert_eq!(to_queue_index(0), None);
        assert_eq!(to_queue_index(-3), None);
    }

    #[test]
    fn test_percent_to_volume() {
        assert_eq!(percent_to_volume(0), Some(0.0));
        assert_eq!(percent_to_volume(50), Some(0.5));
        assert_eq!(percent_to_volume(100), Some(1.0));
        assert_eq!(percent_to_volume(101), None);
        assert_eq!(percent_to_volume(-1), None);
    }

    #[test]
    fn test_control_error_message_uses_user_positions() {
        assert_eq!(
            control_error_message(&ControlError::Queue(QueueError::IndexOutOfRange { index: 4, len: 3 })),
            "There is no track at position 5 (the queue has 3)."
        );
        assert_eq!(
            control_error_message(&ControlError::Queue(QueueError::SamePosition(0))),
            "That track is already at position 1."
        );
        assert_eq!(
            control_error_message(&ControlError::NothingPlaying),
            "Nothing is playing right now."
        );
    }

    #[tokio::test]
    async fn test_enqueue_single_reports_position() {
        let session = session();
        session.enqueue(preview("first")).unwrap();

        match enqueue_previews(&session, vec![preview("second")], 10).unwrap() {
            Enqueued::Single { track, position } => {
                assert_eq!(track.display_title(), "second");
                assert_eq!(position, 2);
            }
            Enqueued::Many { .. } => panic!("expected a single track"),
        }
    }

    #[tokio::test]
    async fn test_enqueue_playlist_respects_room() {
        let session = session();
        let playlist = (0..5).map(|i| preview(&format!("p{}", i))).collect();

        match enqueue_previews(&session, playlist, 3).unwrap() {
            Enqueued::Many { added, dropped } => {
                assert_eq!(added, 3);
                assert_eq!(dropped, 2);
            }
            Enqueued::Single { .. } => panic!("expected a playlist"),
        }
        assert_eq!(session.queue().len(), 3);
    }

    #[tokio::test]
    async fn test_enqueue_into_shut_down_session_is_rejected() {
        let session = session();
        session.shutdown().await;

        assert!(matches!(
            enqueue_previews(&session, vec![preview("late")], 10),
            Err(ControlError::SessionClosed)
        ));
        assert!(session.queue().is_empty());
    }
}
