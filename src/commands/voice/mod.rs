//! Commands that speak in, or leave, the invoking member's voice channel.

/// Submodule defining the `disconnect` command.
pub(crate) mod disconnect;
/// Submodule defining the `tts` command.
pub(crate) mod tts;

use poise::serenity_prelude::ChannelId;

use crate::{CommandResult, Context};

pub(crate) const NOT_IN_VOICE_MESSAGE: &str = "Join a voice channel then try again!";

/// The voice channel the command author is currently connected to, if any.
fn author_voice_channel(ctx: Context<'_>) -> Option<ChannelId> {
    let guild = ctx.guild()?;
    guild.voice_states.get(&ctx.author().id)?.channel_id
}
