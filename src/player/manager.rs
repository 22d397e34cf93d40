use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::controller::PlaybackController;
use crate::{
    backend::{StreamingBackend, VoiceTransport},
    common::types::GuildId,
    configs::PlayerConfig,
};

/// Alias for the per-guild player registry.
pub type PlayerMap = DashMap<GuildId, PlaybackController>;

/// Owns one [`PlaybackController`] per guild, all sharing the same backends.
pub struct PlayerManager {
    config: PlayerConfig,
    streaming: Arc<dyn StreamingBackend>,
    transport: Arc<dyn VoiceTransport>,
    players: PlayerMap,
}

impl PlayerManager {
    pub fn new(
        config: PlayerConfig,
        streaming: Arc<dyn StreamingBackend>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self {
            config,
            streaming,
            transport,
            players: DashMap::new(),
        }
    }

    /// Returns the guild's player, creating it if there is none or the old one
    /// tore itself down.
    pub fn get_or_create(&self, guild_id: &GuildId) -> PlaybackController {
        let mut entry = self
            .players
            .entry(guild_id.clone())
            .or_insert_with(|| self.spawn(guild_id));

        if entry.is_destroyed() {
            debug!("[{}] Replacing destroyed player", guild_id);
            *entry = self.spawn(guild_id);
        }
        entry.value().clone()
    }

    /// Live player for the guild, if any.
    pub fn get(&self, guild_id: &GuildId) -> Option<PlaybackController> {
        self.players
            .get(guild_id)
            .map(|p| p.value().clone())
            .filter(|p| !p.is_destroyed())
    }

    /// Drops the guild's player and tears it down. Returns false if there was none.
    pub async fn remove(&self, guild_id: &GuildId) -> bool {
        // Entry guard must be released before awaiting.
        let Some((_, player)) = self.players.remove(guild_id) else {
            return false;
        };
        player.destroy().await;
        true
    }

    /// Tears down every player.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|p| p.key().clone()).collect();
        info!("Shutting down {} player(s)", guilds.len());
        for guild_id in guilds {
            self.remove(&guild_id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn spawn(&self, guild_id: &GuildId) -> PlaybackController {
        info!(
            "[{}] Creating player on {} backend",
            guild_id,
            self.streaming.name()
        );
        PlaybackController::new(
            guild_id.clone(),
            &self.config,
            self.streaming.clone(),
            self.transport.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::mock::{MockStreaming, MockTransport},
        player::PlayerStatus,
    };

    fn manager() -> (PlayerManager, Arc<MockTransport>) {
        let transport = MockTransport::new();
        let manager = PlayerManager::new(
            PlayerConfig::default(),
            MockStreaming::new(),
            transport.clone(),
        );
        (manager, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn one_player_per_guild() {
        let (manager, _) = manager();
        let a = GuildId::from("a");

        let first = manager.get_or_create(&a);
        first.add_track("ok:x").await.unwrap();
        let again = manager.get_or_create(&a);
        assert_eq!(again.peek_next().await.unwrap(), "ok:x");

        manager.get_or_create(&GuildId::from("b"));
        assert_eq!(manager.len(), 2);
        assert!(manager.get(&GuildId::from("c")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_player_is_replaced() {
        let (manager, _) = manager();
        let a = GuildId::from("a");

        let old = manager.get_or_create(&a);
        old.add_track("ok:x").await.unwrap();
        old.destroy().await;
        assert!(manager.get(&a).is_none());

        let fresh = manager.get_or_create(&a);
        assert_eq!(fresh.status().await, PlayerStatus::Idle);
        assert!(fresh.peek_next().await.is_none());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_destroys_player() {
        let (manager, _) = manager();
        let a = GuildId::from("a");
        let player = manager.get_or_create(&a);

        assert!(manager.remove(&a).await);
        assert!(player.is_destroyed());
        assert!(!manager.remove(&a).await);
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_destroys_everything() {
        let (manager, _) = manager();
        let players: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|g| manager.get_or_create(&GuildId::from(g)))
            .collect();

        manager.shutdown().await;
        assert!(manager.is_empty());
        assert!(players.iter().all(PlaybackController::is_destroyed));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_players_expire_on_their_own() {
        let (manager, transport) = manager();
        let a = GuildId::from("a");
        manager.get_or_create(&a);

        tokio::time::sleep(PlayerConfig::default().idle_timeout() * 2).await;
        assert!(manager.get(&a).is_none());
        assert_eq!(transport.disconnect_count(), 0);
        assert_eq!(manager.get_or_create(&a).status().await, PlayerStatus::Idle);
    }
}
