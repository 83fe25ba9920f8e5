//! Single-flight admission of playbacks.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::player::{PlaybackTicket, PlayerEvent, PlayerState, StartWait};
use super::session::GuildSession;
use super::{ConnectionStatus, TransportError};
use crate::tts::AudioResource;

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("something is already playing in this guild")]
    Busy,

    #[error("the player is not connected to a voice channel")]
    NotConnected,

    #[error("playback did not start within {0:?}")]
    StartTimeout(Duration),

    #[error("playback ended before it started (player is {0})")]
    Aborted(PlayerState),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Admits at most one playback per guild at a time.
///
/// The busy check is the player's own atomic `Submit` transition, so no lock is
/// held while audio is handed to the transport.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackGuard {
    start_timeout: Duration,
}

impl Default for PlaybackGuard {
    fn default() -> Self {
        Self::new(DEFAULT_START_TIMEOUT)
    }
}

impl PlaybackGuard {
    pub fn new(start_timeout: Duration) -> Self {
        Self { start_timeout }
    }

    /// Play `audio` through the session's player and wait until it is audible.
    pub async fn play(&self, session: &GuildSession, audio: AudioResource) -> Result<(), PlaybackError> {
        let guild_id = session.guild_id();
        let player = session.player();

        let ticket = match player.submit() {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!("Playback refused in guild {}: {}", guild_id, e);
                return Err(PlaybackError::Busy);
            }
        };

        let link = match player.output().await {
            Some(link) if link.status() == ConnectionStatus::Ready => link,
            _ => {
                abandon(&ticket);
                return Err(PlaybackError::NotConnected);
            }
        };

        debug!(
            "Submitting {} bytes of audio in guild {} (submission {})",
            audio.len(),
            guild_id,
            ticket.submission()
        );
        if let Err(e) = link.play(audio, ticket.clone()).await {
            error!("Voice transport refused audio in guild {}: {}", guild_id, e);
            abandon(&ticket);
            return Err(e.into());
        }

        match player.await_start(&ticket, self.start_timeout).await {
            StartWait::Started => {
                info!("Playback started in guild {}", guild_id);
                Ok(())
            }
            StartWait::Abandoned(state) => {
                warn!(
                    "Playback in guild {} ended before starting, player is {}",
                    guild_id, state
                );
                Err(PlaybackError::Aborted(state))
            }
            StartWait::TimedOut => {
                warn!(
                    "Playback in guild {} did not start within {:?}",
                    guild_id, self.start_timeout
                );
                // the transport may still start it later; the player must not stay wedged
                abandon(&ticket);
                Err(PlaybackError::StartTimeout(self.start_timeout))
            }
        }
    }
}

/// Give the submission up if it is still the current one and has not started.
fn abandon(ticket: &PlaybackTicket) {
    if let Err(e) = ticket.report(PlayerEvent::Abandon) {
        debug!("Submission {} not abandoned: {}", ticket.submission(), e);
    }
}
