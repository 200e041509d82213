//! # Audio Module
//!
//! Per-guild playback: queueing, the player loop and the voice output.
//!
//! ## Architecture
//!
//! ### [`manager`] - Session Manager
//! - One [`player::PlaybackSession`] per guild, created on first use
//! - Spawns each session's player loop and removes idle sessions
//!
//! ### [`player`] - Playback Session
//! - Runs the player loop: dequeue, resolve, start, wait for completion
//! - Control operations (skip, pause, resume, loop, volume, stop)
//!
//! ### [`queue`] - Song Queue
//! - FIFO of lightweight track previews with an awaitable dequeue
//! - Remove, move, shuffle and paging for display
//!
//! ### [`sink`] / [`songbird_sink`] - Audio Output
//! - The [`sink::AudioSink`] boundary the player loop streams to
//! - The songbird-backed implementation used by the bot
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let manager = SessionManager::new(resolver, notifier, PlayerSettings::default());
//!
//! let session = manager.get_or_create(guild_id);
//! session.connect(sink)?;
//! session.enqueue(preview)?;
//!
//! session.pause()?;
//! session.resume()?;
//! session.skip()?;
//! ```

pub mod clock;
pub mod events;
pub mod manager;
pub mod player;
pub mod queue;
pub mod sink;
pub mod songbird_sink;
