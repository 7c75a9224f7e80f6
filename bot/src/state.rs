use shared::{get_db_connection, Config, DuplicateDetectionService, ParserEngine};
use std::sync::Arc;
use teloxide::{dispatching::dialogue::InMemStorage, prelude::Dialogue};
use uuid::Uuid;

use crate::repositories::{ChannelRepository, MessageRepository, SignalRepository};
use crate::services::extraction_history::ExtractionHistoryService;
use crate::services::message_queue::MessageQueue;
use crate::services::pipeline::SignalProcessingPipeline;
use crate::services::rate_limiter::RateLimiter;
use crate::services::template_manager::TemplateManager;

pub type MyDialogue = Dialogue<BotState, InMemStorage<BotState>>;
pub type HandlerResult = Result<(), anyhow::Error>;

pub struct AppState {
    pub config: Config,
    pub channels: ChannelRepository,
    pub messages: Arc<MessageRepository>,
    pub signals: SignalRepository,
    pub template_manager: Arc<TemplateManager>,
    pub history: ExtractionHistoryService,
    pub pipeline: Arc<SignalProcessingPipeline>,
    pub queue: Arc<MessageQueue>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let db = Arc::new(get_db_connection(&config.database_url).await?);
        tracing::info!("Connected to database successfully");

        let channels = ChannelRepository::new(db.clone());
        let messages = Arc::new(MessageRepository::new(db.clone()));
        let signals = SignalRepository::new(db.clone());
        let history = ExtractionHistoryService::new(db.clone());
        let template_manager = Arc::new(TemplateManager::new(db.clone(), history.clone()));

        let parser = ParserEngine::new(Arc::new(template_manager.store()));
        let duplicates = DuplicateDetectionService::new(
            messages.clone(),
            config.duplicate_similarity_threshold,
            config.duplicate_lookback_hours,
        );
        let rate_limiter = config.rate_limit_enabled.then(|| {
            Arc::new(RateLimiter::new(
                config.rate_limit_global,
                config.rate_limit_channel,
                config.rate_limit_user,
                config.rate_limit_window(),
            ))
        });

        let pipeline = Arc::new(SignalProcessingPipeline::new(
            parser,
            duplicates,
            rate_limiter,
            channels.clone(),
            messages.clone(),
            signals.clone(),
            template_manager.clone(),
            history.clone(),
        ));

        let queue = Arc::new(MessageQueue::new(
            config.message_queue_max_size,
            config.max_concurrent_workers,
            config.message_queue_timeout(),
        ));

        Ok(AppState {
            config,
            channels,
            messages,
            signals,
            template_manager,
            history,
            pipeline,
            queue,
        })
    }

    /// Starts the queue workers, each running the processing pipeline.
    pub async fn start_workers(&self) -> Result<(), anyhow::Error> {
        let pipeline = self.pipeline.clone();
        self.queue
            .start(move |message| {
                let pipeline = pipeline.clone();
                async move {
                    pipeline.process_stored_message(message).await?;
                    Ok(())
                }
            })
            .await
    }
}

#[derive(Clone, Default, Debug)]
pub enum BotState {
    #[default]
    Normal,
    AddChannelChatId,
    AddChannelName(i64),
    AddChannelProvider(i64, String),
    AddTemplateChannel,
    AddTemplateName(Uuid),
    AddTemplateConfig(Uuid, String),
    TestTemplateConfig,
    TestTemplateSample(String),
}
