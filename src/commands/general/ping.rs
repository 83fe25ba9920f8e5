use poise::serenity_prelude as serenity;
use std::time::Duration;

use super::*;

/// Ping the bot to check its latency
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> CommandResult {
    let latency = get_shard_latency(&ctx).await;

    let reply = match latency {
        Some(latency) => format!("Pong! `{} ms`", latency.as_millis()),
        // the first heartbeat has not been acknowledged yet
        None => "Pong!".to_string(),
    };
    ctx.say(reply).await?;

    Ok(())
}

async fn get_shard_latency(ctx: &Context<'_>) -> Option<Duration> {
    let shard_manager = ctx.framework().shard_manager();
    let runners = shard_manager.runners.lock().await;

    // Shards are backed by a "shard runner" responsible for processing events
    // over the shard; the latency is tracked per runner.
    let runner = runners.get(&serenity::ShardId(ctx.serenity_context().shard_id.0))?;

    runner.latency
}
