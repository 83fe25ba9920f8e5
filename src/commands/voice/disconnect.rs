use super::*;

/// Disconnect this bot from the current voice channel
#[poise::command(prefix_command, slash_command, guild_only, category = "Voice")]
pub async fn disconnect(ctx: Context<'_>) -> CommandResult {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    if ctx.data().voice.leave(guild_id).await {
        ctx.say("👋 Disconnected.").await?;
    } else {
        ctx.say("I'm not in a voice channel.").await?;
    }

    Ok(())
}
