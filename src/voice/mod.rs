//! Per-guild voice session orchestration.
//!
//! Every guild gets one [`GuildSession`] holding a [`PlayerStateMachine`] and at
//! most one live voice connection. [`ConnectionManager`] owns connection setup and
//! teardown, [`PlaybackGuard`] admits at most one playback at a time and the
//! [`IdleWatchdog`] leaves channels the bot is alone in.
//!
//! The voice transport itself is reached through the [`VoiceGateway`] and
//! [`VoiceLink`] traits; [`songbird_gateway`] provides the production implementation.

pub mod connection;
pub mod playback;
pub mod player;
pub mod service;
pub mod session;
pub mod songbird_gateway;
pub mod watchdog;

use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tokio::sync::watch;

use crate::tts::AudioResource;

pub use connection::{ConnectError, ConnectionManager};
pub use playback::{PlaybackError, PlaybackGuard};
pub use player::{
    PlaybackTicket, PlayerEvent, PlayerSnapshot, PlayerState, PlayerStateMachine, TransitionError,
};
pub use service::{SpeakError, VoiceService};
pub use session::{GuildSession, SessionRegistry};
pub use watchdog::{IdleWatchdog, WatchdogHandle};

/// Lifecycle of a single voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

impl ConnectionStatus {
    /// Whether the handshake has finished one way or another.
    pub fn is_settled(self) -> bool {
        !matches!(self, ConnectionStatus::Signalling | ConnectionStatus::Connecting)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Destroyed)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("voice connection not ready after {0:?}")]
    Timeout(Duration),

    #[error("voice connection ended up {0:?} instead of ready")]
    Unreachable(ConnectionStatus),

    #[error("voice manager unavailable")]
    NoVoiceManager,

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("voice transport error: {0}")]
    Other(String),
}

/// Entry point to the voice transport.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Start joining `channel_id`. The returned link may not be ready yet.
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, TransportError>;

    /// Number of members in the voice channel, the bot included.
    ///
    /// `None` when the channel occupancy is unknown.
    fn channel_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize>;
}

/// One voice connection bound to a guild and channel.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    fn status(&self) -> ConnectionStatus;

    /// Wait until the connection is ready, failing after `timeout`.
    async fn await_ready(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Tear the connection down. Safe to call more than once.
    async fn destroy(&self);

    /// Start playing `audio`, reporting track progress through `ticket`.
    ///
    /// Any audio still playing on this connection is stopped first.
    async fn play(&self, audio: AudioResource, ticket: PlaybackTicket) -> Result<(), TransportError>;
}

/// Observable connection status shared by [`VoiceLink`] implementations.
#[derive(Debug)]
pub struct ConnectionState {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Signalling);
        Self { tx }
    }

    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Move to `status` unless the connection is already closed.
    ///
    /// `Destroyed` always wins. Returns whether the status changed.
    pub fn set(&self, status: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| {
            let allowed = status == ConnectionStatus::Destroyed || !current.is_closed();
            if allowed && *current != status {
                *current = status;
                true
            } else {
                false
            }
        })
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut rx = self.tx.subscribe();
        let settled = tokio::time::timeout(timeout, async move {
            rx.wait_for(|status| status.is_settled())
                .await
                .map(|status| *status)
        })
        .await;

        match settled {
            Err(_) => Err(TransportError::Timeout(timeout)),
            // the sender lives as long as `self`, so this only happens during teardown
            Ok(Err(_)) => Err(TransportError::Unreachable(ConnectionStatus::Destroyed)),
            Ok(Ok(ConnectionStatus::Ready)) => Ok(()),
            Ok(Ok(status)) => Err(TransportError::Unreachable(status)),
        }
    }
}
