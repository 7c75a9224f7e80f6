//! Error types for the signal extraction core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Extraction error: {message}")]
    Extraction {
        message: String,
        reason: Option<String>,
    },

    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate signal: {0}")]
    Duplicate(String),

    #[error("Rate limited: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SignalError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Operator-facing bugs (bad pattern, malformed template) that must never be
    /// downgraded to a per-message failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Template(_) | Self::Extraction { .. }
        )
    }

    /// Field tag of a validation error, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(SignalError::Template("bad".into()).is_configuration());
        assert!(SignalError::Extraction {
            message: "Invalid regex pattern: (".into(),
            reason: None,
        }
        .is_configuration());
        assert!(!SignalError::validation("symbol", "Symbol is required").is_configuration());
        assert!(!SignalError::Duplicate("seen".into()).is_configuration());
    }

    #[test]
    fn test_validation_display_carries_field() {
        let err = SignalError::validation("entry_price", "Entry price is required");
        assert_eq!(err.field(), Some("entry_price"));
        assert_eq!(
            err.to_string(),
            "Validation error on 'entry_price': Entry price is required"
        );
    }
}
