use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::info;
use crate::commands::sender_id;
use crate::state::{AppState, MyDialogue};

/// Handler for /start: resets any dialogue and greets the user
pub async fn handle_start(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    state: Arc<AppState>,
) -> Result<(), anyhow::Error> {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    info!("Processing /start command from user {}", user_id);

    dialogue.exit().await?;

    let channels = state.channels.list_by_user(&user_id).await?;
    let name = msg
        .from
        .as_ref()
        .map(|u| u.full_name())
        .unwrap_or_default();

    let mut text = format!(
        "👋 Hi <b>{}</b>, welcome to <b>{}</b>!\n\n\
         I read trading signals posted in your Telegram channels and turn them into structured data \
         (symbol, entry, stop loss, take profits).\n\n",
        html::escape(&name),
        html::escape(&state.config.bot_name)
    );

    if channels.is_empty() {
        text.push_str(
            "1️⃣ Add me as an admin to your signal channel\n\
             2️⃣ Register it with /addchannel\n\
             3️⃣ Describe the message layout with /addtemplate (try it first with /testtemplate)",
        );
    } else {
        text.push_str(&format!(
            "You are monitoring <b>{}</b> channel(s). See /channels and /signals.",
            channels.len()
        ));
    }

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
