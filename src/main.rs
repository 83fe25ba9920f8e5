use ::serenity::all::ClientBuilder;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rusty_tts::config::BotConfig;
use rusty_tts::tts::GoogleTts;
use rusty_tts::voice::songbird_gateway::SongbirdGateway;
use rusty_tts::voice::{ConnectionManager, VoiceService};

mod commands;

use commands::{
    general::{invite::*, ping::*},
    voice::{disconnect::*, tts::*},
};

type Error = rusty_tts::Error;
type Context<'a> = poise::Context<'a, Data, Error>;
type CommandResult = Result<(), Error>;

// User data, which is stored and accessible in all command invocations
struct Data {
    voice: Arc<VoiceService>,
    config: BotConfig,
}

/// Show the list of commands, or help about one of them
#[poise::command(prefix_command, slash_command, category = "General")]
async fn help(
    ctx: Context<'_>,
    #[description = "Specific command to show help about"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> CommandResult {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            show_context_menu_commands: true,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| e.into())
}

#[poise::command(prefix_command, hide_in_help)]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx)
        .await
        .map_err(|e| e.into())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize logging with debug level for our crate
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rusty_tts=debug,warn")),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_ansi(true)
        .pretty()
        .init();

    dotenv().ok();

    let config = BotConfig::from_env()?;
    let token = config.discord_token.clone();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let commands = vec![
        // Default commands
        register(),
        help(),
        // General commands
        ping(),
        invite(),
        // Voice commands
        tts(),
        disconnect(),
    ];

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("{} is connected", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                ctx.set_activity(Some(serenity::ActivityData::playing(format!(
                    "{}help",
                    config.prefix
                ))));

                let manager = songbird::get(ctx)
                    .await
                    .ok_or("Songbird was not registered with the client")?;
                let gateway = Arc::new(SongbirdGateway::new(manager, ctx.cache.clone()));
                let connections = ConnectionManager::new(gateway, &config.timings);
                let synthesizer = Arc::new(GoogleTts::new(
                    config.tts_endpoint.clone(),
                    config.tts_api_key.clone(),
                    config.tts_timeout,
                )?);
                let voice = Arc::new(VoiceService::new(
                    connections,
                    synthesizer,
                    config.speech.clone(),
                    &config.timings,
                ));

                spawn_shutdown_handler(voice.clone(), framework.shard_manager().clone());

                Ok(Data { voice, config })
            })
        });

    let mut client = ClientBuilder::new(token, intents)
        .framework(framework.build())
        .register_songbird()
        .await?;

    // Create and run client
    client.start().await.map_err(Into::into)
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command `{}` failed: {}", ctx.command().name, error);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Leave every voice channel and stop the shards on Ctrl-C.
fn spawn_shutdown_handler(voice: Arc<VoiceService>, shard_manager: Arc<serenity::ShardManager>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            return;
        }

        info!("Shutting down");
        voice.leave_all().await;
        shard_manager.shutdown_all().await;
    });
}
