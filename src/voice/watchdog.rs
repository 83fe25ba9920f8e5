//! Leaves voice channels the bot has been left alone in.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serenity::model::id::ChannelId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::session::GuildSession;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Below this many members (the bot included) the channel counts as empty.
const MIN_MEMBERS: usize = 2;

/// Owning handle of a running watchdog. Cancelling, or dropping the handle,
/// stops the check loop before its next tick.
#[derive(Debug)]
pub struct WatchdogHandle {
    token: CancellationToken,
}

impl WatchdogHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct IdleWatchdog {
    manager: ConnectionManager,
    session: Weak<GuildSession>,
    channel_id: ChannelId,
    connection_id: u64,
    interval: Duration,
}

impl IdleWatchdog {
    pub fn new(
        manager: ConnectionManager,
        session: &Arc<GuildSession>,
        channel_id: ChannelId,
        connection_id: u64,
    ) -> Self {
        Self {
            manager,
            session: Arc::downgrade(session),
            channel_id,
            connection_id,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the check loop. The first check runs one interval from now.
    pub fn arm(self) -> WatchdogHandle {
        let token = CancellationToken::new();
        tokio::spawn(self.run(token.clone()));
        WatchdogHandle { token }
    }

    async fn run(self, token: CancellationToken) {
        debug!(
            "Idle watchdog armed for connection {} in channel {}",
            self.connection_id, self.channel_id
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let Some(session) = self.session.upgrade() else {
                break;
            };
            if self.check(&session, &token).await {
                break;
            }
        }

        debug!(
            "Idle watchdog for connection {} in channel {} stopped",
            self.connection_id, self.channel_id
        );
    }

    /// One occupancy check. Returns `true` once the loop should stop.
    async fn check(&self, session: &GuildSession, token: &CancellationToken) -> bool {
        let guild_id = session.guild_id();
        let members = self
            .manager
            .gateway()
            .channel_member_count(guild_id, self.channel_id);

        match members {
            Some(count) if count < MIN_MEMBERS => {
                if token.is_cancelled() {
                    return true;
                }
                info!(
                    "Alone in voice channel {} of guild {}, disconnecting",
                    self.channel_id, guild_id
                );
                self.manager
                    .disconnect_if_current(session, self.connection_id)
                    .await;
                true
            }
            Some(count) => {
                debug!(
                    "{} members in voice channel {} of guild {}",
                    count, self.channel_id, guild_id
                );
                false
            }
            None => {
                warn!(
                    "Member count of voice channel {} in guild {} unavailable, checking again later",
                    self.channel_id, guild_id
                );
                false
            }
        }
    }
}
