//! Text-to-speech collaborator: request/response types, the synthesizer seam and
//! text clean-up applied before synthesis.

pub mod google;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serenity::async_trait;
use thiserror::Error;

pub use google::GoogleTts;

/// Gender hint passed to the voice selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceGender {
    Unspecified,
    Male,
    Female,
    Neutral,
}

impl VoiceGender {
    pub fn as_api_str(self) -> &'static str {
        match self {
            VoiceGender::Unspecified => "SSML_VOICE_GENDER_UNSPECIFIED",
            VoiceGender::Male => "MALE",
            VoiceGender::Female => "FEMALE",
            VoiceGender::Neutral => "NEUTRAL",
        }
    }
}

impl FromStr for VoiceGender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNSPECIFIED" | "SSML_VOICE_GENDER_UNSPECIFIED" => Ok(VoiceGender::Unspecified),
            "MALE" => Ok(VoiceGender::Male),
            "FEMALE" => Ok(VoiceGender::Female),
            "NEUTRAL" => Ok(VoiceGender::Neutral),
            other => Err(format!("unknown voice gender {other:?}")),
        }
    }
}

/// Container format of the synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Mp3,
    OggOpus,
    Linear16,
}

impl AudioEncoding {
    pub fn as_api_str(self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Linear16 => "LINEAR16",
        }
    }

    /// File extension used as a probe hint when decoding.
    pub fn extension(self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::OggOpus => "ogg",
            // LINEAR16 responses carry a WAV header
            AudioEncoding::Linear16 => "wav",
        }
    }
}

impl FromStr for AudioEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP3" => Ok(AudioEncoding::Mp3),
            "OGG_OPUS" | "OPUS" => Ok(AudioEncoding::OggOpus),
            "LINEAR16" | "WAV" => Ok(AudioEncoding::Linear16),
            other => Err(format!("unknown audio encoding {other:?}")),
        }
    }
}

/// A single synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language_code: String,
    pub voice_gender: VoiceGender,
    pub audio_encoding: AudioEncoding,
    pub speaking_rate: f32,
}

/// Encoded audio ready to be handed to a voice connection.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioResource {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl AudioResource {
    pub fn new(bytes: Vec<u8>, encoding: AudioEncoding) -> Self {
        Self { bytes, encoding }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("bytes", &self.bytes.len())
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("nothing to say")]
    EmptyText,

    #[error("request to the speech service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("speech service answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("speech service returned unreadable audio: {0}")]
    Decode(String),
}

/// Turns text into audio. No retries are performed by implementors.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioResource, SynthesisError>;
}

static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    // user/role/channel mentions and custom emoji
    Regex::new(r"<(?:@[!&]?|#)\d+>|<a?:(\w+):\d+>").expect("valid markup regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strip Discord markup that should not be read aloud and collapse whitespace.
///
/// Custom emoji are replaced by their name, mentions are dropped.
pub fn clean_text(raw: &str) -> String {
    let without_markup = MARKUP.replace_all(raw, |caps: &regex::Captures<'_>| {
        caps.get(1)
            .map(|name| format!(" {} ", name.as_str()))
            .unwrap_or_else(|| " ".to_string())
    });
    WHITESPACE.replace_all(&without_markup, " ").trim().to_string()
}
