//! Joining, reusing and tearing down the voice connection of a guild session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serenity::model::id::ChannelId;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::session::GuildSession;
use super::watchdog::{IdleWatchdog, WatchdogHandle};
use super::{ConnectionStatus, TransportError, VoiceGateway, VoiceLink};
use crate::config::VoiceTimings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error("a playback is already in progress in this guild")]
    AlreadyBusy,

    #[error("failed to connect to voice channel {channel_id}: {source}")]
    HandshakeFailed {
        channel_id: ChannelId,
        #[source]
        source: TransportError,
    },
}

/// A ready voice connection stored in a session, together with the watchdog
/// armed for it.
pub struct ActiveConnection {
    id: u64,
    link: Arc<dyn VoiceLink>,
    watchdog: WatchdogHandle,
}

impl fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("id", &self.id)
            .field("channel_id", &self.link.channel_id())
            .field("status", &self.link.status())
            .finish()
    }
}

impl ActiveConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn link(&self) -> &Arc<dyn VoiceLink> {
        &self.link
    }

    pub fn channel_id(&self) -> ChannelId {
        self.link.channel_id()
    }

    /// Cancel the watchdog, then destroy the link.
    async fn teardown(self) {
        self.watchdog.cancel();
        self.link.destroy().await;
    }
}

/// Establishes and destroys voice connections for guild sessions.
///
/// Cheap to clone; clones share the gateway and the connection id counter.
#[derive(Clone)]
pub struct ConnectionManager {
    gateway: Arc<dyn VoiceGateway>,
    ready_timeout: Duration,
    idle_check_interval: Duration,
    next_id: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>, timings: &VoiceTimings) -> Self {
        Self {
            gateway,
            ready_timeout: timings.ready_timeout,
            idle_check_interval: timings.idle_check_interval,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn VoiceGateway> {
        &self.gateway
    }

    /// Connect `session` to `channel_id` and wait for the connection to be ready.
    ///
    /// A ready connection to the same channel is reused as is. A busy player
    /// refuses any connection change.
    pub async fn join(
        &self,
        session: &Arc<GuildSession>,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, ConnectError> {
        let guild_id = session.guild_id();
        if session.player().is_busy() {
            debug!("Refusing to join {} in guild {}: player busy", channel_id, guild_id);
            return Err(ConnectError::AlreadyBusy);
        }

        let mut slot = session.connection_slot().await;
        // a playback may have been admitted while we waited for the slot
        if session.player().is_busy() {
            return Err(ConnectError::AlreadyBusy);
        }

        if let Some(active) = slot.as_ref() {
            if active.channel_id() == channel_id && active.link().status() == ConnectionStatus::Ready
            {
                debug!("Reusing voice connection {} for guild {}", active.id(), guild_id);
                return Ok(active.link().clone());
            }
        }

        if let Some(stale) = slot.take() {
            info!(
                "Replacing voice connection {} (channel {}) in guild {}",
                stale.id(),
                stale.channel_id(),
                guild_id
            );
            session.player().unsubscribe().await;
            stale.teardown().await;
        }

        info!("Joining voice channel {} in guild {}", channel_id, guild_id);
        let link = self
            .gateway
            .join(guild_id, channel_id)
            .await
            .map_err(|source| ConnectError::HandshakeFailed { channel_id, source })?;

        if let Err(source) = link.await_ready(self.ready_timeout).await {
            warn!(
                "Voice connection to {} in guild {} failed: {}",
                channel_id, guild_id, source
            );
            link.destroy().await;
            return Err(ConnectError::HandshakeFailed { channel_id, source });
        }

        session.player().subscribe(link.clone()).await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let watchdog = IdleWatchdog::new(self.clone(), session, channel_id, id)
            .with_interval(self.idle_check_interval)
            .arm();

        *slot = Some(ActiveConnection {
            id,
            link: link.clone(),
            watchdog,
        });
        info!(
            "Voice connection {} ready in channel {} of guild {}",
            id, channel_id, guild_id
        );

        Ok(link)
    }

    /// Drop the session's connection. Returns `false` if there was no live one.
    ///
    /// A connection the driver already closed is still cleaned out of the slot.
    pub async fn disconnect(&self, session: &GuildSession) -> bool {
        let mut slot = session.connection_slot().await;
        let Some(active) = slot.take() else {
            debug!("No voice connection to drop in guild {}", session.guild_id());
            return false;
        };

        let was_live = !active.link().status().is_closed();
        info!(
            "Disconnecting voice connection {} in guild {}",
            active.id(),
            session.guild_id()
        );
        session.player().unsubscribe().await;
        active.teardown().await;
        was_live
    }

    /// Like [`disconnect`](Self::disconnect), but only if the session still
    /// holds the connection numbered `connection_id`.
    pub async fn disconnect_if_current(&self, session: &GuildSession, connection_id: u64) -> bool {
        let mut slot = session.connection_slot().await;
        if slot.as_ref().map(ActiveConnection::id) != Some(connection_id) {
            debug!(
                "Voice connection {} in guild {} already replaced",
                connection_id,
                session.guild_id()
            );
            return false;
        }

        let Some(active) = slot.take() else {
            return false;
        };
        session.player().unsubscribe().await;
        active.teardown().await;
        true
    }
}
