pub mod extraction_history;
pub mod message_queue;
pub mod pipeline;
pub mod rate_limiter;
pub mod template_manager;
