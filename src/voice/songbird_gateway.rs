//! [`VoiceGateway`] backed by songbird and the serenity cache.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use serenity::all::Cache;
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::{AudioStream, Input, LiveInput};
use songbird::tracks::{ReadyState, Track};
use songbird::{CoreEvent, Event, EventContext, Songbird, TrackEvent};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::player::{PlaybackTicket, PlayerEvent};
use super::{ConnectionState, ConnectionStatus, TransportError, VoiceGateway, VoiceLink};
use crate::tts::AudioResource;

/// Track events forwarded to the player, and what they mean for it.
const TRACK_EVENTS: [(TrackEvent, PlayerEvent); 5] = [
    (TrackEvent::Playable, PlayerEvent::Started),
    (TrackEvent::Play, PlayerEvent::Resume),
    (TrackEvent::Pause, PlayerEvent::Pause),
    (TrackEvent::End, PlayerEvent::Finished),
    (TrackEvent::Error, PlayerEvent::Finished),
];

/// Wrap in-memory audio as a songbird input, hinting the container format.
pub fn audio_input(audio: AudioResource) -> Input {
    let mut hint = Hint::new();
    hint.with_extension(audio.encoding.extension());
    let source: Box<dyn MediaSource> = Box::new(Cursor::new(audio.bytes));

    Input::Live(
        LiveInput::Raw(AudioStream {
            input: source,
            hint: Some(hint),
        }),
        None,
    )
}

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>) -> Self {
        Self { manager, cache }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let state = Arc::new(ConnectionState::new());
        let manager = self.manager.clone();
        let task_state = state.clone();

        let handshake = tokio::spawn(async move {
            task_state.set(ConnectionStatus::Connecting);
            match manager.join(guild_id, channel_id).await {
                Ok(call) => {
                    call.lock().await.add_global_event(
                        Event::Core(CoreEvent::DriverDisconnect),
                        DisconnectNotifier {
                            guild_id,
                            state: task_state.clone(),
                        },
                    );
                    task_state.set(ConnectionStatus::Ready);
                }
                Err(e) => {
                    warn!(
                        "Songbird failed to join channel {} in guild {}: {}",
                        channel_id, guild_id, e
                    );
                    task_state.set(ConnectionStatus::Disconnected);
                }
            }
        });

        Ok(Arc::new(SongbirdLink {
            manager: self.manager.clone(),
            guild_id,
            channel_id,
            state,
            handshake: Mutex::new(Some(handshake)),
        }))
    }

    fn channel_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let guild = self.cache.guild(guild_id)?;
        let count = guild
            .voice_states
            .values()
            .filter(|voice_state| voice_state.channel_id == Some(channel_id))
            .count();
        Some(count)
    }
}

pub struct SongbirdLink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    state: Arc<ConnectionState>,
    handshake: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    fn status(&self) -> ConnectionStatus {
        self.state.current()
    }

    async fn await_ready(&self, timeout: Duration) -> Result<(), TransportError> {
        self.state.wait_ready(timeout).await
    }

    async fn destroy(&self) {
        if let Some(handshake) = self.handshake.lock().await.take() {
            handshake.abort();
        }

        if !self.state.set(ConnectionStatus::Destroyed) {
            return;
        }
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("Left voice channel {} in guild {}", self.channel_id, self.guild_id),
            Err(e) => debug!("No songbird call to remove in guild {}: {}", self.guild_id, e),
        }
    }

    async fn play(&self, audio: AudioResource, ticket: PlaybackTicket) -> Result<(), TransportError> {
        if self.state.current() != ConnectionStatus::Ready {
            return Err(TransportError::NotConnected);
        }
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or(TransportError::NotConnected)?;

        // held paused until every notifier is attached
        let track = {
            let mut handler = call.lock().await;
            // one utterance at a time per connection
            handler.stop();
            handler.play(Track::from(audio_input(audio)).pause())
        };

        for (track_event, player_event) in TRACK_EVENTS {
            let attached = track.add_event(
                Event::Track(track_event),
                TrackNotifier {
                    ticket: ticket.clone(),
                    event: player_event,
                },
            );
            if let Err(e) = attached {
                let _ = track.stop();
                release_player(&ticket);
                return Err(TransportError::Other(e.to_string()));
            }
        }

        if let Err(e) = track.play() {
            release_player(&ticket);
            return Err(TransportError::Other(e.to_string()));
        }

        // Playable may have fired before the notifiers were attached
        if let Ok(info) = track.get_info().await {
            if info.ready == ReadyState::Playable {
                let _ = ticket.report(PlayerEvent::Started);
            }
        }

        Ok(())
    }
}

/// End the ticket's playback after the track could not be set up, whether or
/// not a notifier already reported it started.
fn release_player(ticket: &PlaybackTicket) {
    if let Err(e) = ticket.report(PlayerEvent::Finished) {
        debug!("Player already released: {}", e);
    }
}

/// Forwards one kind of track event to the player that submitted the track.
struct TrackNotifier {
    ticket: PlaybackTicket,
    event: PlayerEvent,
}

#[async_trait]
impl songbird::EventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            if let Err(e) = self.ticket.report(self.event) {
                debug!("Ignoring track event: {}", e);
            }
        }
        None
    }
}

/// Marks the link disconnected when songbird's driver drops the connection.
struct DisconnectNotifier {
    guild_id: GuildId,
    state: Arc<ConnectionState>,
}

#[async_trait]
impl songbird::EventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_) = ctx {
            if self.state.set(ConnectionStatus::Disconnected) {
                warn!("Voice driver disconnected in guild {}", self.guild_id);
            }
        }
        None
    }
}
