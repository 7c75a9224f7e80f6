use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::{NotSet, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity::signals;
use crate::error::{Result, SignalError};

/// Trade direction announced by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Long,
    Short,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Long => "LONG",
            SignalType::Short => "SHORT",
        }
    }

    /// BUY and LONG profit when price rises; SELL and SHORT when it falls.
    pub fn is_long_side(&self) -> bool {
        matches!(self, SignalType::Buy | SignalType::Long)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(SignalType::Buy),
            "SELL" => Ok(SignalType::Sell),
            "LONG" => Ok(SignalType::Long),
            "SHORT" => Ok(SignalType::Short),
            _ => Err(SignalError::validation(
                "signal_type",
                format!("Invalid signal type: '{}'. Must be one of: BUY, SELL, LONG, SHORT", s),
            )),
        }
    }
}

/// Lifecycle of a stored signal. The parser only ever produces `Pending`;
/// the other states are set by price tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    #[default]
    Pending,
    Filled,
    Cancelled,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "PENDING",
            SignalStatus::Filled => "FILLED",
            SignalStatus::Cancelled => "CANCELLED",
            SignalStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meaning of the `1M` timeframe code for a template. The code set uses `1M`
/// for both one minute and one month, so a template has to say which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OneMUnit {
    Minute,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfit {
    pub level: String,
    pub price: Decimal,
    pub hit: bool,
    pub hit_at: Option<DateTime<Utc>>,
}

impl TakeProfit {
    pub fn new(level: impl Into<String>, price: Decimal) -> Self {
        Self {
            level: level.into(),
            price,
            hit: false,
            hit_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLoss {
    pub price: Decimal,
    pub hit: bool,
    pub hit_at: Option<DateTime<Utc>>,
}

impl StopLoss {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            hit: false,
            hit_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub template_id: Uuid,
    pub template_name: String,
    pub template_version: i32,
    pub extraction_method: String,
    pub extracted_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe_unit: Option<OneMUnit>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timeframe_ambiguous: bool,
}

/// Signal built in memory by the parser, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSignal {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub template_id: Uuid,
    pub user_id: String,
    pub original_message_id: Option<i64>,
    pub original_message_text: String,
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Option<StopLoss>,
    pub take_profits: Vec<TakeProfit>,
    pub signal_type: SignalType,
    pub timeframe: Option<String>,
    pub status: SignalStatus,
    /// Completeness heuristic in [0, 1], not a probability.
    pub confidence_score: Decimal,
    pub risk_reward_ratio: Option<Decimal>,
    pub extraction_metadata: ExtractionMetadata,
    pub created_at: DateTime<Utc>,
}

impl ParsedSignal {
    pub fn into_active_model(self) -> Result<signals::ActiveModel> {
        let take_profits = serde_json::to_value(&self.take_profits)?;
        let stop_loss = self
            .stop_loss
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let metadata = serde_json::to_value(&self.extraction_metadata)?;

        Ok(signals::ActiveModel {
            id: Set(self.id),
            channel_id: Set(self.channel_id),
            template_id: Set(self.template_id),
            user_id: Set(self.user_id),
            original_message_id: Set(self.original_message_id),
            original_message_text: Set(self.original_message_text),
            symbol: Set(self.symbol),
            entry_price: Set(self.entry_price),
            take_profits: Set(take_profits),
            stop_loss: Set(stop_loss),
            signal_type: Set(self.signal_type.to_string()),
            timeframe: Set(self.timeframe),
            status: Set(self.status.to_string()),
            confidence_score: Set(self.confidence_score),
            extraction_metadata: Set(Some(metadata)),
            risk_reward_ratio: Set(self.risk_reward_ratio),
            user_notes: NotSet,
            performance_outcome: Set(None),
            close_price: Set(None),
            pnl: Set(None),
            pnl_percent: Set(None),
            closed_at: Set(None),
            created_at: Set(self.created_at),
            updated_at: Set(self.created_at),
        })
    }
}

/// Aggregate counts for a batch parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_messages: usize,
    pub successful_extractions: usize,
    pub failed_extractions: usize,
    pub errors: Vec<String>,
}
