//! In-memory voice transport and a mocked speech synthesizer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use rusty_tts::tts::{AudioResource, SpeechSynthesizer, SynthesisError, SynthesisRequest};
use rusty_tts::voice::{
    ConnectionState, ConnectionStatus, PlaybackTicket, PlayerEvent, TransportError, VoiceGateway,
    VoiceLink,
};
use serenity::model::id::{ChannelId, GuildId};

mock! {
    pub Synthesizer {}

    #[async_trait]
    impl SpeechSynthesizer for Synthesizer {
        async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResource, SynthesisError>;
    }
}

/// How the handshake of the next joins behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Handshake {
    Ready,
    /// Stays Connecting forever.
    Never,
    Fail,
}

/// Voice gateway whose channel occupancy and handshakes are set by the test.
pub struct FakeGateway {
    handshake: Mutex<Handshake>,
    members: Mutex<HashMap<ChannelId, usize>>,
    member_checks: Mutex<HashMap<ChannelId, usize>>,
    links: Mutex<Vec<Arc<FakeLink>>>,
    auto_start: AtomicBool,
}

impl FakeGateway {
    /// Handshakes succeed and submitted audio starts right away.
    pub fn new() -> Self {
        Self {
            handshake: Mutex::new(Handshake::Ready),
            members: Mutex::new(HashMap::new()),
            member_checks: Mutex::new(HashMap::new()),
            links: Mutex::new(Vec::new()),
            auto_start: AtomicBool::new(true),
        }
    }

    pub fn with_handshake(self, handshake: Handshake) -> Self {
        *self.handshake.lock().unwrap() = handshake;
        self
    }

    /// Submitted audio never reports Started on its own.
    pub fn without_auto_start(self) -> Self {
        self.auto_start.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_handshake(&self, handshake: Handshake) {
        *self.handshake.lock().unwrap() = handshake;
    }

    pub fn set_members(&self, channel_id: ChannelId, count: usize) {
        self.members.lock().unwrap().insert(channel_id, count);
    }

    /// Make the occupancy of `channel_id` unknown.
    pub fn forget_members(&self, channel_id: ChannelId) {
        self.members.lock().unwrap().remove(&channel_id);
    }

    /// How many times the occupancy of `channel_id` was asked for.
    pub fn member_checks(&self, channel_id: ChannelId) -> usize {
        self.member_checks
            .lock()
            .unwrap()
            .get(&channel_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every link handed out so far, oldest first.
    pub fn links(&self) -> Vec<Arc<FakeLink>> {
        self.links.lock().unwrap().clone()
    }

    pub fn last_link(&self) -> Arc<FakeLink> {
        self.links().last().cloned().expect("no link was created")
    }

    /// Links that are not yet closed.
    pub fn live_links(&self) -> usize {
        self.links()
            .iter()
            .filter(|link| !link.status().is_closed())
            .count()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let link = Arc::new(FakeLink::new(
            channel_id,
            self.auto_start.load(Ordering::SeqCst),
        ));
        link.state.set(ConnectionStatus::Connecting);
        match *self.handshake.lock().unwrap() {
            Handshake::Ready => {
                link.state.set(ConnectionStatus::Ready);
            }
            Handshake::Never => {}
            Handshake::Fail => {
                link.state.set(ConnectionStatus::Disconnected);
            }
        }

        self.links.lock().unwrap().push(link.clone());
        Ok(link)
    }

    fn channel_member_count(&self, _guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        *self.member_checks.lock().unwrap().entry(channel_id).or_default() += 1;
        self.members.lock().unwrap().get(&channel_id).copied()
    }
}

pub struct FakeLink {
    channel_id: ChannelId,
    state: ConnectionState,
    auto_start: bool,
    tickets: Mutex<Vec<PlaybackTicket>>,
    destroy_calls: AtomicUsize,
}

impl FakeLink {
    fn new(channel_id: ChannelId, auto_start: bool) -> Self {
        Self {
            channel_id,
            state: ConnectionState::new(),
            auto_start,
            tickets: Mutex::new(Vec::new()),
            destroy_calls: AtomicUsize::new(0),
        }
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    pub fn last_ticket(&self) -> PlaybackTicket {
        self.tickets
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("nothing was played")
    }

    /// Report `event` for the most recently played track.
    pub fn report(&self, event: PlayerEvent) {
        let _ = self.last_ticket().report(event);
    }

    /// Simulate the driver dropping the connection.
    pub fn drop_connection(&self) {
        self.state.set(ConnectionStatus::Disconnected);
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
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
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.state.set(ConnectionStatus::Destroyed);
    }

    async fn play(&self, _audio: AudioResource, ticket: PlaybackTicket) -> Result<(), TransportError> {
        if self.state.current() != ConnectionStatus::Ready {
            return Err(TransportError::NotConnected);
        }
        if self.auto_start {
            let _ = ticket.report(PlayerEvent::Started);
        }
        self.tickets.lock().unwrap().push(ticket);
        Ok(())
    }
}
