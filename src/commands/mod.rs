//! This module aggregates all the command modules for the bot.

/// General purpose commands (e.g., ping, invite).
pub(crate) mod general;
/// Text-to-speech and voice channel commands.
pub(crate) mod voice;
