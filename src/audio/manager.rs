use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{
        events::Notifier,
        player::{LoopExit, PlaybackSession, PlayerPhase, PlayerSettings},
    },
    sources::TrackResolver,
};

type Registry = DashMap<GuildId, Arc<PlaybackSession>>;

/// Owns one [`PlaybackSession`] per guild and the task running its player
/// loop.
pub struct SessionManager {
    sessions: Arc<Registry>,
    resolver: Arc<dyn TrackResolver>,
    notifier: Arc<dyn Notifier>,
    settings: PlayerSettings,
}

impl SessionManager {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        notifier: Arc<dyn Notifier>,
        settings: PlayerSettings,
    ) -> Self {
        info!("🎵 Starting session manager (idle timeout {:?})", settings.idle_timeout);

        Self {
            sessions: Arc::new(DashMap::new()),
            resolver,
            notifier,
            settings,
        }
    }

    /// Returns the live session for `guild_id`, creating it and spawning its
    /// player loop if there is none. Concurrent callers get the same session.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<PlaybackSession> {
        let session = match self.sessions.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if !Self::is_finished(entry.get()) {
                    return entry.get().clone();
                }
                // the loop exited but its teardown has not removed it yet
                let session = self.new_session(guild_id);
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => {
                let session = self.new_session(guild_id);
                entry.insert(session.clone());
                session
            }
        };

        self.spawn_player(session.clone());
        session
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions
            .get(&guild_id)
            .map(|session| session.clone())
            .filter(|session| !Self::is_finished(session))
    }

    /// Removes and shuts down the session of `guild_id`. Returns false if
    /// there was none.
    pub async fn destroy(&self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some((_, session)) => {
                session.shutdown().await;
                debug!("{} sessions still active", self.active_sessions());
                true
            }
            None => {
                debug!("No session to destroy for guild {}", guild_id);
                false
            }
        }
    }

    /// Tears down every session.
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Shutting down {} sessions", guilds.len());

        for guild_id in guilds {
            self.destroy(guild_id).await;
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn new_session(&self, guild_id: GuildId) -> Arc<PlaybackSession> {
        debug!("Creating session for guild {}", guild_id);
        PlaybackSession::new(
            guild_id,
            self.resolver.clone(),
            self.notifier.clone(),
            self.settings,
        )
    }

    fn is_finished(session: &PlaybackSession) -> bool {
        session.is_closed() || session.phase() == PlayerPhase::Stopped
    }

    fn spawn_player(&self, session: Arc<PlaybackSession>) {
        let sessions = Arc::downgrade(&self.sessions);

        tokio::spawn(async move {
            if session.clone().run().await != LoopExit::IdleTimeout {
                return;
            }

            // only remove the entry if it still points at this session
            if let Some(sessions) = sessions.upgrade() {
                sessions.remove_if(&session.guild_id(), |_, current| {
                    Arc::ptr_eq(current, &session)
                });
            }
            session.shutdown().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        events::PlayerEvent,
        player::tests::{preview, resolver, FakeSink},
    };
    use std::{sync::atomic::Ordering, time::Duration};
    use tokio::sync::mpsc;

    fn manager() -> (SessionManager, mpsc::UnboundedReceiver<(GuildId, PlayerEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SessionManager::new(resolver(), Arc::new(tx), PlayerSettings::default()),
            rx,
        )
    }

    async fn wait_until_gone(manager: &SessionManager, guild_id: GuildId) {
        tokio::time::timeout(Duration::from_secs(3600), async {
            while manager.sessions.contains_key(&guild_id) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("session was never torn down");
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let (manager, _events) = manager();
        let guild = GuildId::new(10);

        let first = manager.get_or_create(guild);
        let second = manager.get_or_create(guild);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.active_sessions(), 1);
        assert!(manager.get(GuildId::new(11)).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let (manager, _events) = manager();
        let manager = Arc::new(manager);
        let guild = GuildId::new(12);
        let start = Arc::new(tokio::sync::Barrier::new(32));

        let callers: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    manager.get_or_create(guild)
                })
            })
            .collect();

        let mut sessions = Vec::new();
        for caller in callers {
            sessions.push(caller.await.unwrap());
        }

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(manager.active_sessions(), 1);
        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_sessions_are_independent_per_guild() {
        let (manager, _events) = manager();

        let a = manager.get_or_create(GuildId::new(1));
        let b = manager.get_or_create(GuildId::new(2));
        a.enqueue(preview("only in a")).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.queue().is_empty());
        assert_eq!(manager.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_destroy_twice_is_a_noop() {
        let (manager, _events) = manager();
        let guild = GuildId::new(20);
        let sink = Arc::new(FakeSink::default());

        let session = manager.get_or_create(guild);
        session.connect(sink.clone()).unwrap();
        session.enqueue(preview("queued")).unwrap();

        assert!(manager.destroy(guild).await);
        assert!(!manager.destroy(guild).await);

        assert_eq!(sink.releases.load(Ordering::SeqCst), 1);
        assert!(session.is_closed());
        assert!(session.queue().is_empty());
        assert!(manager.get(guild).is_none());
    }

    #[tokio::test]
    async fn test_destroy_unknown_guild() {
        let (manager, _events) = manager();
        assert!(!manager.destroy(GuildId::new(404)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_tears_itself_down() {
        let (manager, mut events) = manager();
        let guild = GuildId::new(30);
        let sink = Arc::new(FakeSink::default());

        let session = manager.get_or_create(guild);
        session.connect(sink.clone()).unwrap();

        wait_until_gone(&manager, guild).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !session.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let (event_guild, event) = events.recv().await.unwrap();
        assert_eq!(event_guild, guild);
        assert!(matches!(event, PlayerEvent::IdleDisconnect));
        assert_eq!(sink.releases.load(Ordering::SeqCst), 1);

        let fresh = manager.get_or_create(guild);
        assert!(!Arc::ptr_eq(&fresh, &session));
        assert!(!fresh.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let (manager, _events) = manager();
        let sessions: Vec<_> = (1..=3)
            .map(|id| manager.get_or_create(GuildId::new(id)))
            .collect();

        manager.shutdown_all().await;

        assert_eq!(manager.active_sessions(), 0);
        assert!(sessions.iter().all(|session| session.is_closed()));
    }
}
