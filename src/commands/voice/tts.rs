use poise::CreateReply;
use tracing::{error, info};

use super::*;

/// Read text aloud in your voice channel
#[poise::command(prefix_command, slash_command, guild_only, category = "Voice")]
pub async fn tts(
    ctx: Context<'_>,
    #[description = "Text to read aloud"]
    #[rest]
    text: String,
) -> CommandResult {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };

    let Some(channel_id) = author_voice_channel(ctx) else {
        ctx.say(NOT_IN_VOICE_MESSAGE).await?;
        return Ok(());
    };

    // Joining and synthesis can take a few seconds
    ctx.defer().await?;

    info!(
        "{} requested tts in channel {} of guild {}",
        ctx.author().name,
        channel_id,
        guild_id
    );

    match ctx.data().voice.speak(guild_id, channel_id, &text).await {
        Ok(()) => {
            // slash commands must be answered; prefix invocations just speak
            if let poise::Context::Application(_) = ctx {
                ctx.send(
                    CreateReply::default()
                        .content(format!("🔊 Speaking in <#{}>", channel_id))
                        .ephemeral(true),
                )
                .await?;
            }
        }
        Err(err) if err.is_busy() => {
            ctx.say(err.user_message()).await?;
        }
        Err(err) => {
            error!("tts in guild {} failed: {}", guild_id, err);
            ctx.say(err.user_message()).await?;
        }
    }

    Ok(())
}
