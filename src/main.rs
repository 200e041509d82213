use anyhow::{Context, Result};
use dashmap::DashMap;
use serenity::{
    model::{gateway::GatewayIntents, id::GuildId},
    Client,
};
use songbird::SerenityInit;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    events::{Notifier, PlayerEvent},
    manager::SessionManager,
    songbird_sink,
};
use crate::bot::{announcer, JukeboxBot};
use crate::config::Config;
use crate::sources::{TrackResolver, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.max_playlist_size,
        config.resolve_timeout,
        config.max_concurrent_resolves,
    ));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&resolver).await;
    }

    let version = resolver.verify().await?;
    info!("✅ yt-dlp {} available", version);

    // player events flow from the loops to the announcer
    let (event_tx, event_rx) = mpsc::unbounded_channel::<(GuildId, PlayerEvent)>();
    let notifier: Arc<dyn Notifier> = Arc::new(event_tx);
    let resolver: Arc<dyn TrackResolver> = resolver;

    let sessions = Arc::new(SessionManager::new(
        resolver.clone(),
        notifier,
        config.player_settings(),
    ));
    let announce_channels = Arc::new(DashMap::new());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = JukeboxBot::new(
        config.clone(),
        sessions.clone(),
        resolver,
        songbird_sink::stream_client()?,
        announce_channels.clone(),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    tokio::spawn(announcer::run_announcer(
        client.http.clone(),
        announce_channels,
        event_rx,
    ));

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        sessions.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(resolver: &YtDlpResolver) -> Result<()> {
    let version = resolver.verify().await.context("yt-dlp is not usable")?;

    println!("OK (yt-dlp {})", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_check_fails_without_resolver() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp", 10, Duration::from_secs(5), 1);
        let error = health_check(&resolver).await.unwrap_err();
        assert!(error.to_string().contains("yt-dlp is not usable"));
    }
}
