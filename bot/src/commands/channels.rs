use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::info;

use crate::commands::sender_id;
use crate::state::{AppState, BotState, HandlerResult, MyDialogue};

/// Handler for /channels
pub async fn handle_channels(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    let channels = state.channels.list_by_user(&user_id).await?;
    if channels.is_empty() {
        bot.send_message(msg.chat.id, "📭 No channels yet. Register one with /addchannel.")
            .await?;
        return Ok(());
    }

    let mut text = String::from("📋 <b>Your channels</b>\n\n");
    for channel in &channels {
        let templates = state.template_manager.list_templates(channel.id, false).await?;
        let status = if channel.is_active { "🟢" } else { "⚪" };
        text.push_str(&format!(
            "{} <b>{}</b> (<code>{}</code>)\n   Provider: {}\n   Templates: {} | Signals: {}\n",
            status,
            html::escape(&channel.name),
            channel.telegram_chat_id,
            html::escape(channel.provider_name.as_deref().unwrap_or("-")),
            templates.len(),
            channel.signal_count,
        ));
        for template in &templates {
            text.push_str(&format!(
                "   • {} v{} ({}% success)\n",
                html::escape(&template.name),
                template.version,
                template.extraction_success_rate
            ));
        }
        text.push('\n');
    }

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Handler for /addchannel: starts the registration dialogue
pub async fn handle_add_channel(bot: Bot, dialogue: MyDialogue, msg: Message) -> HandlerResult {
    dialogue.update(BotState::AddChannelChatId).await?;
    bot.send_message(
        msg.chat.id,
        "➕ Send the chat id of the channel to monitor (e.g. <code>-1001234567890</code>).\n\
         Make sure I am an admin there. /cancel to stop.",
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn receive_channel_chat_id(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(chat_id) = msg.text().and_then(|t| t.trim().parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "That does not look like a chat id. Try again or /cancel.")
            .await?;
        return Ok(());
    };

    if state.channels.find_by_chat_id(chat_id).await?.is_some() {
        bot.send_message(msg.chat.id, "⚠️ This channel is already registered.").await?;
        dialogue.exit().await?;
        return Ok(());
    }

    dialogue.update(BotState::AddChannelName(chat_id)).await?;
    bot.send_message(msg.chat.id, "📝 What should I call this channel?").await?;
    Ok(())
}

pub async fn receive_channel_name(bot: Bot, dialogue: MyDialogue, chat_id: i64, msg: Message) -> HandlerResult {
    let name = msg.text().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "Please send a non-empty name.").await?;
        return Ok(());
    }

    dialogue
        .update(BotState::AddChannelProvider(chat_id, name.to_string()))
        .await?;
    bot.send_message(
        msg.chat.id,
        "👤 Who provides the signals? Send a provider name or <code>-</code> to skip.",
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn receive_channel_provider(
    bot: Bot,
    dialogue: MyDialogue,
    (chat_id, name): (i64, String),
    msg: Message,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let provider = msg
        .text()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "-")
        .map(str::to_string);

    let channel = state.channels.create(&user_id, chat_id, &name, provider).await?;
    dialogue.exit().await?;

    info!("✅ User {} registered channel {} ({})", user_id, channel.name, channel.telegram_chat_id);
    bot.send_message(
        msg.chat.id,
        format!(
            "✅ Channel <b>{}</b> registered.\nNext: describe its message layout with /addtemplate.",
            html::escape(&channel.name)
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}
