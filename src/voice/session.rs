use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use super::connection::ActiveConnection;
use super::player::PlayerStateMachine;

/// Everything the bot keeps for one guild: its player and, while connected,
/// the voice connection together with its idle watchdog.
#[derive(Debug)]
pub struct GuildSession {
    guild_id: GuildId,
    player: Arc<PlayerStateMachine>,
    connection: Mutex<Option<ActiveConnection>>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            player: Arc::new(PlayerStateMachine::new(guild_id)),
            connection: Mutex::new(None),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn player(&self) -> &Arc<PlayerStateMachine> {
        &self.player
    }

    /// Lock the connection slot. Holding the guard serializes connection
    /// changes for this guild.
    pub(crate) async fn connection_slot(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.connection.lock().await
    }

    /// Whether a live (not yet closed) connection is stored.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.link().status().is_closed())
    }

    pub async fn channel_id(&self) -> Option<ChannelId> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|active| active.channel_id())
    }
}

/// Guild id → session map. Sessions live for the whole process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the guild's session, creating an idle one on first use.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("Creating voice session for guild {}", guild_id);
                Arc::new(GuildSession::new(guild_id))
            })
            .value()
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all sessions, e.g. for shutdown.
    pub fn all(&self) -> Vec<Arc<GuildSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }
}
