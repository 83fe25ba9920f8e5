//! Runtime configuration read from the process environment (and `.env`).

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::tts::{AudioEncoding, VoiceGender};

/// Default command prefix, kept from the first version of the bot.
pub const DEFAULT_PREFIX: &str = "\"";
/// Public Google Cloud Text-to-Speech endpoint.
pub const DEFAULT_TTS_ENDPOINT: &str = "https://texttospeech.googleapis.com";

/// Errors raised while loading [`BotConfig`].
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Voice and synthesis parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSettings {
    pub language_code: String,
    pub voice_gender: VoiceGender,
    pub audio_encoding: AudioEncoding,
    pub speaking_rate: f32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            language_code: "vi-VN".to_string(),
            voice_gender: VoiceGender::Neutral,
            audio_encoding: AudioEncoding::Mp3,
            speaking_rate: 0.75,
        }
    }
}

/// Timeouts and intervals used by the voice session orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceTimings {
    /// Upper bound for a voice connection to become ready.
    pub ready_timeout: Duration,
    /// Upper bound for the player to confirm that audio started.
    pub start_timeout: Duration,
    /// Period of the empty-channel check.
    pub idle_check_interval: Duration,
}

impl Default for VoiceTimings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            start_timeout: Duration::from_secs(10),
            idle_check_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub tts_api_key: String,
    pub prefix: String,
    pub invite_url: Option<String>,
    pub tts_endpoint: Url,
    pub tts_timeout: Duration,
    pub speech: SpeechSettings,
    pub timings: VoiceTimings,
}

impl BotConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let defaults = SpeechSettings::default();
        let speech = SpeechSettings {
            language_code: get("TTS_LANGUAGE").unwrap_or(defaults.language_code),
            voice_gender: match get("TTS_VOICE_GENDER") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    key: "TTS_VOICE_GENDER",
                    reason,
                })?,
                None => defaults.voice_gender,
            },
            audio_encoding: match get("TTS_ENCODING") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    key: "TTS_ENCODING",
                    reason,
                })?,
                None => defaults.audio_encoding,
            },
            speaking_rate: match get("TTS_SPEAKING_RATE") {
                Some(raw) => parse_speaking_rate(&raw)?,
                None => defaults.speaking_rate,
            },
        };

        let timings = VoiceTimings {
            ready_timeout: seconds(&get, "VOICE_READY_TIMEOUT_SECS", 30)?,
            start_timeout: seconds(&get, "PLAYBACK_START_TIMEOUT_SECS", 10)?,
            idle_check_interval: seconds(&get, "IDLE_CHECK_INTERVAL_SECS", 10)?,
        };

        let endpoint = get("TTS_ENDPOINT").unwrap_or_else(|| DEFAULT_TTS_ENDPOINT.to_string());
        let tts_endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::Invalid {
            key: "TTS_ENDPOINT",
            reason: e.to_string(),
        })?;

        let config = Self {
            discord_token: required("DISCORD_TOKEN")?,
            tts_api_key: required("GOOGLE_TTS_API_KEY")?,
            prefix: get("PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            invite_url: get("INVITE_URL"),
            tts_endpoint,
            tts_timeout: seconds(&get, "TTS_TIMEOUT_SECS", 15)?,
            speech,
            timings,
        };

        debug!(
            "Loaded configuration: prefix={:?}, language={}, endpoint={}",
            config.prefix, config.speech.language_code, config.tts_endpoint
        );

        Ok(config)
    }
}

fn parse_speaking_rate(raw: &str) -> Result<f32, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "TTS_SPEAKING_RATE",
        reason,
    };
    let rate: f32 = raw.trim().parse().map_err(|_| invalid(format!("{raw:?} is not a number")))?;
    if !(0.25..=4.0).contains(&rate) {
        return Err(invalid(format!("{rate} is outside 0.25..=4.0")));
    }
    Ok(rate)
}

fn seconds<F>(get: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(ConfigError::Invalid {
            key,
            reason: format!("{raw:?} is not a whole number of seconds"),
        }),
    }
}
