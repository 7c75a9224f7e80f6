use anyhow::Result;
use std::sync::Arc;
use teloxide::{dispatching::{UpdateHandler, dialogue}, prelude::*};
use teloxide::dispatching::dialogue::InMemStorage;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
mod commands;
mod state;
mod services;
mod repositories;

use crate::commands::{
    handle_add_channel, handle_add_template, handle_cancel, handle_channel_post, handle_channels,
    handle_help, handle_invalid, handle_signals, handle_start, handle_stats, handle_test_template,
    receive_channel_chat_id, receive_channel_name, receive_channel_provider, receive_template_channel,
    receive_template_config, receive_template_name, receive_test_config, receive_test_sample, Command,
};
use crate::state::{AppState, BotState};
use shared::Config;

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logs() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stdout))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_ansi(true))
            .init();
    }
}

fn schema() -> UpdateHandler<anyhow::Error> {
    use dptree::case;
    // Start, help and cancel work in any state
    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Cancel].endpoint(handle_cancel))
        .branch(
            case![BotState::Normal]
                .branch(case![Command::Channels].endpoint(handle_channels))
                .branch(case![Command::Signals].endpoint(handle_signals))
                .branch(case![Command::Stats].endpoint(handle_stats))
                .branch(case![Command::AddChannel].endpoint(handle_add_channel))
                .branch(case![Command::AddTemplate].endpoint(handle_add_template))
                .branch(case![Command::TestTemplate].endpoint(handle_test_template)),
        );

    let message_handler = Update::filter_message()
        .branch(command_handler)
        // Group and supergroup posts are signal sources, not conversations
        .branch(dptree::filter(|msg: Message| !msg.chat.is_private()).endpoint(handle_channel_post))
        .branch(case![BotState::AddChannelChatId].endpoint(receive_channel_chat_id))
        .branch(case![BotState::AddChannelName(chat_id)].endpoint(receive_channel_name))
        .branch(case![BotState::AddChannelProvider(chat_id, name)].endpoint(receive_channel_provider))
        .branch(case![BotState::AddTemplateChannel].endpoint(receive_template_channel))
        .branch(case![BotState::AddTemplateName(channel_id)].endpoint(receive_template_name))
        .branch(case![BotState::AddTemplateConfig(channel_id, name)].endpoint(receive_template_config))
        .branch(case![BotState::TestTemplateConfig].endpoint(receive_test_config))
        .branch(case![BotState::TestTemplateSample(config)].endpoint(receive_test_sample))
        .branch(dptree::endpoint(handle_invalid));

    let channel_post_handler = Update::filter_channel_post().endpoint(handle_channel_post);

    dptree::entry()
        .branch(channel_post_handler)
        .branch(dialogue::enter::<Update, InMemStorage<BotState>, BotState, _>().branch(message_handler))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    init_logging(&config);

    tracing::info!("Starting {}...", config.bot_name);

    let app_state = Arc::new(AppState::new(config).await?);
    tracing::info!("AppState initialized");

    app_state.start_workers().await?;
    tracing::info!("Message queue workers started");

    let bot = Bot::new(&app_state.config.bot_token);
    tracing::info!("Bot created");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![
            InMemStorage::<BotState>::new(),
            app_state.clone()
        ])
        .enable_ctrlc_handler()
        .build();

    tracing::info!("Bot is running and waiting for updates...");
    dispatcher.dispatch().await;

    app_state.queue.stop();
    Ok(())
}
