//! The `speak` / `leave` flows used by the command layer.

use std::sync::Arc;

use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tracing::{debug, error, info};

use super::connection::{ConnectError, ConnectionManager};
use super::playback::{PlaybackError, PlaybackGuard};
use super::session::SessionRegistry;
use crate::config::{SpeechSettings, VoiceTimings};
use crate::tts::{SpeechSynthesizer, SynthesisError, SynthesisRequest, clean_text};

pub const BUSY_MESSAGE: &str = "Wait for the previous tts to finish first!";

#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("nothing to say")]
    EmptyText,

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SpeakError {
    /// The guild is already speaking; this is an expected condition, not a fault.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SpeakError::Connect(ConnectError::AlreadyBusy) | SpeakError::Playback(PlaybackError::Busy)
        )
    }

    /// Reply shown to the member who issued the command.
    pub fn user_message(&self) -> &'static str {
        match self {
            _ if self.is_busy() => BUSY_MESSAGE,
            SpeakError::EmptyText => "Give me something to say!",
            SpeakError::Connect(_) => "I couldn't connect to your voice channel, try again later.",
            SpeakError::Synthesis(SynthesisError::EmptyText) => "Give me something to say!",
            SpeakError::Synthesis(_) => "Text-to-speech failed, try again later.",
            SpeakError::Playback(_) => "I couldn't play the audio, try again.",
        }
    }
}

/// Sessions, connections, playback admission and synthesis wired together.
///
/// Owned by the application and handed to command handlers; there is no
/// global instance.
pub struct VoiceService {
    sessions: SessionRegistry,
    connections: ConnectionManager,
    playback: PlaybackGuard,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speech: SpeechSettings,
}

impl VoiceService {
    pub fn new(
        connections: ConnectionManager,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        speech: SpeechSettings,
        timings: &VoiceTimings,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            connections,
            playback: PlaybackGuard::new(timings.start_timeout),
            synthesizer,
            speech,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Say `text` in `channel_id`, joining it first if needed.
    pub async fn speak(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        text: &str,
    ) -> Result<(), SpeakError> {
        let text = clean_text(text);
        if text.is_empty() {
            return Err(SpeakError::EmptyText);
        }

        let session = self.sessions.get_or_create(guild_id);
        self.connections.join(&session, channel_id).await?;

        let request = SynthesisRequest {
            text,
            language_code: self.speech.language_code.clone(),
            voice_gender: self.speech.voice_gender,
            audio_encoding: self.speech.audio_encoding,
            speaking_rate: self.speech.speaking_rate,
        };
        let audio = self.synthesizer.synthesize(&request).await.map_err(|e| {
            error!("Synthesis for guild {} failed: {}", guild_id, e);
            e
        })?;

        self.playback.play(&session, audio).await?;
        Ok(())
    }

    /// Leave the guild's voice channel. Returns `false` if not connected.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        match self.sessions.get(guild_id) {
            Some(session) => self.connections.disconnect(&session).await,
            None => false,
        }
    }

    /// Disconnect every guild, e.g. on shutdown.
    pub async fn leave_all(&self) -> usize {
        let sessions = self.sessions.all();
        let results = join_all(
            sessions
                .iter()
                .map(|session| self.connections.disconnect(session)),
        )
        .await;

        let left = results.into_iter().filter(|left| *left).count();
        if left > 0 {
            info!("Left {} voice channel(s)", left);
        } else {
            debug!("No voice channels to leave");
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::SynthesisError;
    use test_case::test_case;

    #[test_case(SpeakError::Connect(ConnectError::AlreadyBusy), true ; "busy connect")]
    #[test_case(SpeakError::Playback(PlaybackError::Busy), true ; "busy playback")]
    #[test_case(SpeakError::EmptyText, false ; "empty text")]
    #[test_case(SpeakError::Playback(PlaybackError::NotConnected), false ; "not connected")]
    fn test_is_busy(error: SpeakError, expected: bool) {
        assert_eq!(error.is_busy(), expected);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            SpeakError::Playback(PlaybackError::Busy).user_message(),
            "Wait for the previous tts to finish first!"
        );
        assert_eq!(
            SpeakError::Synthesis(SynthesisError::Status {
                status: 500,
                message: "boom".to_string()
            })
            .user_message(),
            "Text-to-speech failed, try again later."
        );
        assert_eq!(
            SpeakError::Synthesis(SynthesisError::EmptyText).user_message(),
            SpeakError::EmptyText.user_message()
        );
    }
}
