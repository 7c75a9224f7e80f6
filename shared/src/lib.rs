pub mod config;
pub mod database;
pub mod duplicate;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod models;
pub mod parser;
pub mod validator;

pub use config::Config;
pub use database::get_db_connection;
pub use duplicate::{DuplicateDetectionService, DuplicateKind, MessageHistory};
pub use error::{Result, SignalError};
pub use extraction::{ExtractedData, ExtractionConfig, ExtractionEngine, ExtractionReport, ExtractionResult};
pub use models::*;
pub use parser::{normalize_take_profits, InMemoryTemplateStore, ParseOutcome, ParserEngine, TemplateStore};
pub use validator::SignalValidator;
