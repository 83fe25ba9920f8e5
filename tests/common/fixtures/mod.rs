//! Sample ids, audio and settings used across tests.

use std::time::Duration;

use rusty_tts::config::{SpeechSettings, VoiceTimings};
use rusty_tts::tts::{AudioEncoding, AudioResource};
use serenity::model::id::{ChannelId, GuildId};

pub const GUILD_G: GuildId = GuildId::new(111_111_111);
pub const GUILD_H: GuildId = GuildId::new(222_222_222);

pub const CHANNEL_C: ChannelId = ChannelId::new(987_654_321);
pub const CHANNEL_D: ChannelId = ChannelId::new(123_456_789);

/// Not a decodable mp3; the fakes never look inside.
pub fn audio(tag: u8) -> AudioResource {
    AudioResource::new(vec![tag; 32], AudioEncoding::Mp3)
}

pub fn speech() -> SpeechSettings {
    SpeechSettings::default()
}

pub fn timings() -> VoiceTimings {
    VoiceTimings {
        ready_timeout: Duration::from_secs(30),
        start_timeout: Duration::from_secs(10),
        idle_check_interval: Duration::from_secs(10),
    }
}
