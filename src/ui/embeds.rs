use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{player::NowPlayingInfo, queue::QueuePage},
    sources::{FullTrack, PreviewTrack},
};

/// Standard colour palette
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer shared by every embed
const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Tracks shown per queue page
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Announcement posted when the player loop starts a track
pub fn create_now_playing_embed(track: &FullTrack) -> CreateEmbed {
    track_embed("🎵 Now Playing", track)
        .field("⏱️ Duration", human_duration(track.duration()), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Reply to `/nowplaying`, with progress through the track
pub fn create_now_playing_status_embed(info: &NowPlayingInfo) -> CreateEmbed {
    let state = if info.paused { "⏸️ Paused" } else { "▶️ Playing" };
    let progress = format!(
        "{} / {}",
        format_duration(info.elapsed),
        format_duration(info.track.duration())
    );

    track_embed("🎵 Now Playing", &info.track)
        .field("⏱️ Progress", progress, true)
        .field("📻 State", state, true)
        .field("🔂 Loop", if info.looping { "On" } else { "Off" }, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn track_embed(title: &str, track: &FullTrack) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(track.to_string())
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artist", track.artist().unwrap_or("Unknown"), true)
        .field("👤 Requested by", format!("<@{}>", track.requested_by()), true)
        .field("🔗 URL", format!("[Open]({})", track.url()), true);

    if let Some(term) = track.search_term() {
        embed = embed.field("🔍 Search", format!("`{}`", term), true);
    }

    embed.thumbnail(track.thumbnail()).url(track.url())
}

/// Confirms a single track was queued at 1-based `position`
pub fn create_track_added_embed(track: &PreviewTrack, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Added to Queue")
        .description(format!("**{}**", track.display_title()))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Position", position.to_string(), true)
        .field("👤 Requested by", format!("<@{}>", track.requested_by()), true);

    if let Some(term) = track.search_term() {
        embed = embed.field("🔍 Search", format!("`{}`", term), true);
    }

    let added_at = Timestamp::from_unix_timestamp(track.added_at().timestamp())
        .unwrap_or_else(|_| Timestamp::now());

    embed
        .url(track.url())
        .timestamp(added_at)
        .footer(CreateEmbedFooter::new("🎵 Plays automatically when its turn comes"))
}

/// Confirms a playlist was queued
pub fn create_playlist_added_embed(track_count: usize, playlist_url: &str) -> CreateEmbed {
    let description = if track_count == 1 {
        "Added **1 track** from the playlist".to_string()
    } else {
        format!("Added **{} tracks** from the playlist", track_count)
    };

    CreateEmbed::default()
        .title("📋 Playlist Added")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .url(playlist_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Renders one page of the queue
pub fn create_queue_embed(page: &QueuePage, current: Option<&NowPlayingInfo>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        let status = if current.looping { "🔂" } else { "▶️" };
        embed = embed.field(format!("{} Playing", status), current.track.to_string(), false);
    }

    if page.total_items == 0 {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    embed = embed
        .description(queue_lines(page))
        .field("Total", format!("**{}** tracks", page.total_items), false);

    let footer = if page.total_pages > 1 {
        format!("Page {} of {} • Jukebox", page.current_page, page.total_pages)
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// `**n**. [title](url)` per track, numbered from 1.
fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(offset, track)| {
            format!(
                "**{}**. [{}]({})\n",
                page.first_index + offset + 1,
                track.display_title(),
                track.url()
            )
        })
        .collect()
}

pub fn create_volume_embed(volume: f32) -> CreateEmbed {
    let percent = (volume * 100.0).round() as u32;
    let emoji = match percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volume", emoji))
        .description(format!("**{}%**", percent))
        .field("📊 Level", volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume.clamp(0.0, 1.0) * segments as f32) as usize).min(segments);
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// `m:ss`, or `h:mm:ss` past the hour
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Spelled-out duration such as `1 hour, 3 minutes, 7 seconds`; zero
/// components are left out.
pub fn human_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let parts = [
        (total / 86_400, "day"),
        ((total % 86_400) / 3600, "hour"),
        ((total % 3600) / 60, "minute"),
        (total % 60, "second"),
    ];

    let rendered: Vec<String> = parts
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value == 1 {
                format!("1 {}", unit)
            } else {
                format!("{} {}s", value, unit)
            }
        })
        .collect();

    if rendered.is_empty() {
        "0 seconds".to_string()
    } else {
        rendered.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(Duration::from_secs(0)), "0 seconds");
        assert_eq!(human_duration(Duration::from_secs(61)), "1 minute, 1 second");
        assert_eq!(human_duration(Duration::from_secs(3600)), "1 hour");
        assert_eq!(
            human_duration(Duration::from_secs(2 * 86_400 + 3 * 3600 + 125)),
            "2 days, 3 hours, 2 minutes, 5 seconds"
        );
    }

    #[test]
    fn test_queue_lines_are_one_based() {
        let page = QueuePage {
            items: vec![
                PreviewTrack::new("https://example.com/a", serenity::model::id::UserId::new(1))
                    .with_title("A"),
                PreviewTrack::new("https://example.com/b", serenity::model::id::UserId::new(1)),
            ],
            first_index: 10,
            current_page: 2,
            total_pages: 2,
            total_items: 12,
        };

        assert_eq!(
            queue_lines(&page),
            "**11**. [A](https://example.com/a)\n**12**. [https://example.com/b](https://example.com/b)\n"
        );
    }

    #[test]
    fn test_volume_bar() {
        assert_eq!(volume_bar(0.0), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(volume_bar(1.0), format!("`[{}]`", "█".repeat(20)));
        assert_eq!(volume_bar(0.5), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
    }
}
