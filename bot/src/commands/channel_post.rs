use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::repositories::message_repository::IncomingMessage;
use crate::state::{AppState, HandlerResult};

/// Stores a post from a registered channel or group and queues it for extraction
pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    let Some(channel) = state.channels.find_by_chat_id(msg.chat.id.0).await? else {
        debug!("Ignoring message from unregistered chat {}", msg.chat.id);
        return Ok(());
    };
    if !channel.is_active {
        debug!("Ignoring message from inactive channel {}", channel.name);
        return Ok(());
    }

    let stored = state
        .messages
        .create(IncomingMessage {
            channel_id: channel.id,
            telegram_message_id: i64::from(msg.id.0),
            telegram_chat_id: msg.chat.id.0,
            telegram_sender_id: msg.from.as_ref().map(|u| u.id.0 as i64),
            text: text.to_string(),
        })
        .await?;

    info!("📨 Stored message {} from channel '{}'", stored.id, channel.name);

    if let Err(e) = state.queue.enqueue(stored) {
        warn!("{:#}", e);
    }
    Ok(())
}
