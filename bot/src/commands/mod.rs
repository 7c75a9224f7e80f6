use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode};
use teloxide::utils::command::BotCommands;
use std::sync::Arc;
use std::time::Instant;
use crate::state::{AppState, BotState, MyDialogue};

pub mod channel_post;
pub mod channels;
pub mod signals;
pub mod start;
pub mod templates;

pub use channel_post::handle_channel_post;
pub use channels::{
    handle_add_channel, handle_channels, receive_channel_chat_id, receive_channel_name,
    receive_channel_provider,
};
pub use signals::{handle_signals, handle_stats};
pub use start::handle_start;
pub use templates::{
    handle_add_template, handle_test_template, receive_template_channel, receive_template_config,
    receive_template_name, receive_test_config, receive_test_sample,
};

/// 📡 <b>Signal Extractor</b>: available commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// ❓ Start using the bot
    Start,
    /// ✨ Show this help
    Help,
    /// 📋 List your registered channels
    Channels,
    /// 📈 Latest extracted signals
    Signals,
    /// 📊 Extraction statistics (last 7 days)
    Stats,
    /// ➕ Register a channel to monitor
    AddChannel,
    /// 🧩 Add or update an extraction template
    AddTemplate,
    /// 🧪 Dry-run a template against a sample message
    TestTemplate,
    /// ↩️ Cancel the current dialogue
    Cancel,
}

/// Telegram id of the sender as stored in `user_id` columns.
pub fn sender_id(msg: &Message) -> Option<String> {
    msg.from.as_ref().map(|user| user.id.0.to_string())
}

pub async fn handle_help(bot: Bot, msg: Message) -> Result<()> {
    let start_time = Instant::now();
    tracing::info!("Handling /help command in chat {}", msg.chat.id);

    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .parse_mode(ParseMode::Html)
        .await?;

    tracing::info!("Time taken to handle /help command: {:?}", start_time.elapsed());
    Ok(())
}

pub async fn handle_cancel(bot: Bot, dialogue: MyDialogue, msg: Message) -> Result<()> {
    dialogue.exit().await?;
    bot.send_message(msg.chat.id, "↩️ Cancelled. Back to normal mode.").await?;
    Ok(())
}

pub async fn handle_invalid(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    _state: Arc<AppState>,
) -> Result<()> {
    let hint = match dialogue.get().await? {
        Some(BotState::AddChannelChatId) => "Please send the numeric chat id of the channel, e.g. <code>-1001234567890</code>.",
        Some(BotState::AddChannelName(_)) => "Please send a name for the channel.",
        Some(BotState::AddChannelProvider(..)) => "Please send the provider name, or <code>-</code> to skip.",
        Some(BotState::AddTemplateChannel) => "Please send the chat id of one of your channels.",
        Some(BotState::AddTemplateName(_)) => "Please send a name for the template.",
        Some(BotState::AddTemplateConfig(..)) | Some(BotState::TestTemplateConfig) => {
            "Please send the extraction config as a JSON object."
        }
        Some(BotState::TestTemplateSample(_)) => "Please send a sample signal message.",
        Some(BotState::Normal) | None => "❌ Unknown command. Use /help to see what I can do.",
    };

    bot.send_message(msg.chat.id, hint)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
