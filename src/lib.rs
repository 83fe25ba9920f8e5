//! Text-to-speech Discord bot core.
//!
//! The [`voice`] module owns the per-guild voice sessions (player state, voice
//! connection, idle watchdog). The [`tts`] module turns text into audio. Both are
//! wired together by the binary's command layer.

pub mod config;
pub mod tts;
pub mod voice;

/// Boxed error type shared with the command framework.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
