use serde_json::Value;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::info;
use uuid::Uuid;

use shared::ExtractionReport;
use crate::commands::sender_id;
use crate::services::template_manager::TemplateUpdate;
use crate::state::{AppState, BotState, HandlerResult, MyDialogue};

const CONFIG_EXAMPLE: &str = r#"{
  "priority": 1,
  "fields": {
    "signal_type": {"extraction_method": "regex", "regex_pattern": "^(BUY|SELL)"},
    "symbol": {"extraction_method": "regex", "regex_pattern": "(?:BUY|SELL)\\s+([A-Z]{6})", "required": true},
    "entry_price": {"extraction_method": "regex", "regex_pattern": "Entry:\\s*([\\d.]+)", "required": true},
    "stop_loss": {"extraction_method": "regex", "regex_pattern": "SL:\\s*([\\d.]+)"},
    "take_profit_1": {"extraction_method": "regex", "regex_pattern": "TP1:\\s*([\\d.]+)"}
  }
}"#;

fn parse_config(msg: &Message) -> Result<Value, String> {
    let text = msg.text().ok_or_else(|| "Please send the config as text.".to_string())?;
    let value: Value = serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;
    if !value.is_object() {
        return Err("The config must be a JSON object.".to_string());
    }
    Ok(value)
}

fn format_report(report: &ExtractionReport) -> String {
    let mut text = if report.success {
        String::from("✅ <b>Extraction succeeded</b>\n\n")
    } else {
        String::from("❌ <b>Extraction incomplete</b>\n\n")
    };

    if report.extracted_data.is_empty() {
        text.push_str("No fields extracted.\n");
    }
    for (field, value) in &report.extracted_data {
        text.push_str(&format!("• <b>{}</b>: <code>{}</code>\n", html::escape(field), html::escape(value)));
    }
    if !report.errors.is_empty() {
        text.push_str("\n<b>Errors</b>\n");
        for error in &report.errors {
            text.push_str(&format!("⚠️ {}\n", html::escape(error)));
        }
    }
    text
}

/// Handler for /testtemplate
pub async fn handle_test_template(bot: Bot, dialogue: MyDialogue, msg: Message) -> HandlerResult {
    dialogue.update(BotState::TestTemplateConfig).await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "🧪 Send the extraction config (JSON). Example:\n<pre>{}</pre>",
            html::escape(CONFIG_EXAMPLE)
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn receive_test_config(bot: Bot, dialogue: MyDialogue, msg: Message) -> HandlerResult {
    match parse_config(&msg) {
        Ok(config) => {
            dialogue.update(BotState::TestTemplateSample(config.to_string())).await?;
            bot.send_message(msg.chat.id, "📝 Now send a sample signal message.").await?;
        }
        Err(e) => {
            bot.send_message(msg.chat.id, format!("❌ {} Try again or /cancel.", e)).await?;
        }
    }
    Ok(())
}

pub async fn receive_test_sample(
    bot: Bot,
    dialogue: MyDialogue,
    config: String,
    msg: Message,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(sample) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send the sample as text.").await?;
        return Ok(());
    };

    let config: Value = serde_json::from_str(&config)?;
    let report = state.template_manager.test_template(&config, sample);
    dialogue.exit().await?;

    bot.send_message(msg.chat.id, format_report(&report))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Handler for /addtemplate
pub async fn handle_add_template(bot: Bot, dialogue: MyDialogue, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };

    let channels = state.channels.list_by_user(&user_id).await?;
    if channels.is_empty() {
        bot.send_message(msg.chat.id, "📭 Register a channel first with /addchannel.").await?;
        return Ok(());
    }

    let mut text = String::from("🧩 Which channel is this template for? Send its chat id:\n\n");
    for channel in &channels {
        text.push_str(&format!(
            "• {} <code>{}</code>\n",
            html::escape(&channel.name),
            channel.telegram_chat_id
        ));
    }

    dialogue.update(BotState::AddTemplateChannel).await?;
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn receive_template_channel(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let channel = match msg.text().and_then(|t| t.trim().parse::<i64>().ok()) {
        Some(chat_id) => state.channels.find_by_chat_id(chat_id).await?,
        None => None,
    };

    match channel {
        Some(channel) if channel.user_id == user_id => {
            dialogue.update(BotState::AddTemplateName(channel.id)).await?;
            bot.send_message(
                msg.chat.id,
                "📝 Name the template. Sending an existing name updates that template.",
            )
            .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "❌ Not one of your channels. Try again or /cancel.")
                .await?;
        }
    }
    Ok(())
}

pub async fn receive_template_name(bot: Bot, dialogue: MyDialogue, channel_id: Uuid, msg: Message) -> HandlerResult {
    let name = msg.text().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "Please send a non-empty name.").await?;
        return Ok(());
    }

    dialogue
        .update(BotState::AddTemplateConfig(channel_id, name.to_string()))
        .await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "⚙️ Send the extraction config (JSON). Example:\n<pre>{}</pre>",
            html::escape(CONFIG_EXAMPLE)
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn receive_template_config(
    bot: Bot,
    dialogue: MyDialogue,
    (channel_id, name): (Uuid, String),
    msg: Message,
    state: Arc<AppState>,
) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let config = match parse_config(&msg) {
        Ok(config) => config,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("❌ {} Try again or /cancel.", e)).await?;
            return Ok(());
        }
    };

    let outcome = match state.template_manager.find_by_name(channel_id, &name).await? {
        Some(existing) => {
            state
                .template_manager
                .update_template(
                    existing.id,
                    TemplateUpdate {
                        extraction_config: Some(config),
                        is_active: Some(true),
                        ..Default::default()
                    },
                )
                .await
        }
        None => {
            state
                .template_manager
                .create_template(channel_id, &name, None, config, None, &user_id)
                .await
        }
    };

    match outcome {
        Ok(template) => {
            dialogue.exit().await?;
            info!("User {} saved template {} v{}", user_id, template.id, template.version);
            bot.send_message(
                msg.chat.id,
                format!(
                    "✅ Template <b>{}</b> saved (version {}).",
                    html::escape(&template.name),
                    template.version
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
        Err(e) => {
            bot.send_message(
                msg.chat.id,
                format!("❌ {}\nFix the config and send it again, or /cancel.", html::escape(&e.to_string())),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ExtractionEngine;

    #[test]
    fn test_config_example_is_valid() {
        let config: Value = serde_json::from_str(CONFIG_EXAMPLE).unwrap();
        assert!(shared::extraction::validate_template_config(&config).is_ok());

        let report = ExtractionEngine::new()
            .test_extraction("BUY EURUSD Entry: 1.0850 SL: 1.0800 TP1: 1.0900", &config);
        assert!(report.success);
        assert_eq!(report.extracted_data.len(), 5);
    }

    #[test]
    fn test_format_report_escapes() {
        let report = ExtractionReport {
            success: false,
            extracted_data: Default::default(),
            errors: vec!["Required field '<symbol>' could not be extracted".to_string()],
        };
        let text = format_report(&report);
        assert!(text.contains("&lt;symbol&gt;"));
        assert!(text.contains("No fields extracted"));
    }
}
