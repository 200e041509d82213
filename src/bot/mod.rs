//! # Bot Module
//!
//! Discord front end: slash command registration, command handling,
//! voice connections and player announcements.
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It owns no
//! playback state itself; every guild's queue and player loop live in the
//! [`SessionManager`]. The bot:
//!
//! - Joins voice channels and hands the connection to the guild's session
//! - Translates slash commands into session operations ([`handlers`])
//! - Remembers where each guild last issued a command, so the
//!   [`announcer`] knows where to post player events
//! - Tears a session down when the bot is disconnected from voice

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{
    audio::{manager::SessionManager, player::PlaybackSession, songbird_sink::SongbirdSink},
    config::Config,
    sources::TrackResolver,
};

/// Text channel player events are posted to, per guild.
pub type AnnounceChannels = Arc<DashMap<GuildId, ChannelId>>;

pub struct JukeboxBot {
    config: Arc<Config>,
    /// Per-guild playback sessions
    pub sessions: Arc<SessionManager>,
    /// Preview resolution for `/play`
    pub resolver: Arc<dyn TrackResolver>,
    /// HTTP client handed to every voice connection for streaming
    stream_client: reqwest::Client,
    announce_channels: AnnounceChannels,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        sessions: Arc<SessionManager>,
        resolver: Arc<dyn TrackResolver>,
        stream_client: reqwest::Client,
        announce_channels: AnnounceChannels,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            resolver,
            stream_client,
            announce_channels,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands, per guild if `GUILD_ID` is set (instant
    /// propagation) or globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, skipping registration", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!("Could not register guild commands. Check the 'applications.commands' permission.")
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!("Could not register global commands. Check the 'applications.commands' permission.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Joins `channel_id`, or moves there if already connected in this
    /// guild, and makes sure the guild's session streams to that call.
    pub async fn connect_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<PlaybackSession>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird is not initialised"))?;

        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("Could not join voice channel: {:?}", e))?;

        let session = self.sessions.get_or_create(guild_id);
        if !session.is_connected() {
            session.connect(Arc::new(SongbirdSink::new(
                guild_id,
                call,
                manager.clone(),
                self.stream_client.clone(),
            )))?;
        }

        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);
        Ok(session)
    }

    /// Destroys the guild's session and leaves voice. Returns false if the
    /// bot was not connected.
    pub async fn leave_voice(&self, ctx: &Context, guild_id: GuildId) -> bool {
        if self.sessions.destroy(guild_id).await {
            self.announce_channels.remove(&guild_id);
            return true;
        }

        // voice connection left behind without a session
        match songbird::get(ctx).await {
            Some(manager) => manager.remove(guild_id).await.is_ok(),
            None => false,
        }
    }

    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Tears the session down when the bot is disconnected from voice by
    /// anything other than `/leave` or the idle timeout.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if self.sessions.destroy(guild_id).await {
            info!("🔌 Disconnected from voice in guild {}, session destroyed", guild_id);
            self.announce_channels.remove(&guild_id);
        } else {
            debug!("Voice disconnect in guild {} with no live session", guild_id);
        }
    }
}
