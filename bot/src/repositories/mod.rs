pub mod channel_repository;
pub mod message_repository;
pub mod signal_repository;
pub mod template_repository;

pub use channel_repository::ChannelRepository;
pub use message_repository::MessageRepository;
pub use signal_repository::SignalRepository;
pub use template_repository::TemplateRepository;
