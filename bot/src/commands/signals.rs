use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::info;

use shared::entity::signals;
use shared::normalize_take_profits;
use crate::commands::sender_id;
use crate::state::{AppState, HandlerResult};

const RECENT_SIGNALS: u64 = 10;
const STATS_DAYS: i64 = 7;

fn format_signal(signal: &signals::Model) -> String {
    let side = match signal.signal_type.as_str() {
        "BUY" | "LONG" => "🟢",
        _ => "🔴",
    };
    let mut line = format!(
        "{} <b>{} {}</b> @ <code>{}</code>",
        side,
        html::escape(&signal.signal_type),
        html::escape(&signal.symbol),
        signal.entry_price
    );
    if let Some(tf) = &signal.timeframe {
        line.push_str(&format!(" [{}]", html::escape(tf)));
    }
    line.push('\n');

    let stop = signal
        .stop_loss
        .as_ref()
        .and_then(|sl| sl.get("price"))
        .map(|p| p.to_string().trim_matches('"').to_string());
    if let Some(price) = stop {
        line.push_str(&format!("   SL <code>{}</code>", html::escape(&price)));
    }
    for tp in normalize_take_profits(&signal.take_profits).unwrap_or_default() {
        line.push_str(&format!(" | {} <code>{}</code>", tp.level, tp.price));
    }
    line.push_str(&format!(
        "\n   Confidence {} | R:R {}\n",
        signal.confidence_score,
        signal
            .risk_reward_ratio
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    line
}

/// Handler for /signals
pub async fn handle_signals(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let start_time = Instant::now();
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    let channel_ids: Vec<_> = state
        .channels
        .list_by_user(&user_id)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let recent = state
        .signals
        .recent_for_channels(&channel_ids, RECENT_SIGNALS)
        .await?;

    let text = if recent.is_empty() {
        "📭 No signals extracted yet.".to_string()
    } else {
        let mut text = format!("📈 <b>Latest {} signals</b>\n\n", recent.len());
        for signal in &recent {
            text.push_str(&format_signal(signal));
            text.push('\n');
        }
        text
    };

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    info!("Time taken to handle /signals command: {:?}", start_time.elapsed());
    Ok(())
}

/// Handler for /stats
pub async fn handle_stats(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    let channels = state.channels.list_by_user(&user_id).await?;
    let mut text = format!("📊 <b>Extraction stats (last {} days)</b>\n\n", STATS_DAYS);

    if channels.is_empty() {
        text.push_str("No channels registered.\n");
    }
    for channel in &channels {
        let stats = state.history.stats(Some(channel.id), None, STATS_DAYS).await?;
        text.push_str(&format!(
            "<b>{}</b>\n   Attempts: {} | ✅ {} | ❌ {}\n   Success rate: {:.1}% | Avg confidence: {}\n",
            html::escape(&channel.name),
            stats.total,
            stats.successful,
            stats.failed,
            stats.success_rate,
            stats.average_confidence
        ));

        let errors = state.history.common_errors(Some(channel.id), STATS_DAYS, 3).await?;
        for (error, count) in errors {
            text.push_str(&format!("   ⚠️ {}× {}\n", count, html::escape(&error)));
        }
        text.push('\n');
    }

    let is_admin = msg
        .from
        .as_ref()
        .is_some_and(|u| Some(u.id.0 as i64) == state.config.telegram_admin_id);
    if is_admin {
        let overall = state.history.stats(None, None, STATS_DAYS).await?;
        text.push_str(&format!(
            "🌐 <b>All channels</b>: {} attempts, {:.1}% success\n",
            overall.total, overall.success_rate
        ));
    }

    let queue = state.queue.stats();
    text.push_str(&format!(
        "📥 Queue: {}/{} waiting | processed {} | errors {}",
        queue.queued, queue.capacity, queue.processed, queue.errors
    ));

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
