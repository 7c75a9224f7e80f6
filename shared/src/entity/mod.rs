//! `SeaORM` entities for the signal extraction schema

pub mod channels;
pub mod extraction_history;
pub mod messages;
pub mod signals;
pub mod templates;

pub mod prelude {
    pub use super::channels::Entity as Channels;
    pub use super::extraction_history::Entity as ExtractionHistory;
    pub use super::messages::Entity as Messages;
    pub use super::signals::Entity as Signals;
    pub use super::templates::Entity as Templates;
}
