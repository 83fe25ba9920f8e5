use super::*;

/// Get this bot's invitation link
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn invite(ctx: Context<'_>) -> CommandResult {
    let reply = match &ctx.data().config.invite_url {
        Some(url) => url.clone(),
        None => "No invitation link has been configured for this bot.".to_string(),
    };
    ctx.say(reply).await?;

    Ok(())
}
