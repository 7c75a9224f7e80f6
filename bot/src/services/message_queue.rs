//! Bounded queue feeding stored messages to a pool of tokio workers

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use shared::entity::messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub capacity: usize,
    pub processed: u64,
    pub errors: u64,
    pub running: bool,
}

pub struct MessageQueue {
    sender: mpsc::Sender<messages::Model>,
    receiver: Mutex<Option<mpsc::Receiver<messages::Model>>>,
    capacity: usize,
    max_workers: usize,
    worker_timeout: Duration,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl MessageQueue {
    pub fn new(capacity: usize, max_workers: usize, worker_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            capacity,
            max_workers: max_workers.max(1),
            worker_timeout,
            processed: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues a message without waiting. Fails when the queue is full or stopped.
    pub fn enqueue(&self, message: messages::Model) -> Result<()> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => {
                anyhow!("Message queue is full ({} pending), dropping message {}", self.capacity, m.id)
            }
            mpsc::error::TrySendError::Closed(m) => anyhow!("Message queue is closed, dropping message {}", m.id),
        })
    }

    /// Spawns the dispatcher. Each message runs `handler` on its own task,
    /// with at most `max_workers` in flight and a per-message timeout.
    pub async fn start<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(messages::Model) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Message queue already started"))?;

        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let processed = self.processed.clone();
        let errors = self.errors.clone();
        let running = self.running.clone();
        let timeout = self.worker_timeout;

        running.store(true, Ordering::SeqCst);
        info!("🚀 Message queue started with {} workers", self.max_workers);

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if !running.load(Ordering::SeqCst) {
                    debug!("Queue stopped, discarding message {}", message.id);
                    continue;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let handler = handler.clone();
                let processed = processed.clone();
                let errors = errors.clone();

                tokio::spawn(async move {
                    let message_id = message.id;
                    match tokio::time::timeout(timeout, handler(message)).await {
                        Ok(Ok(())) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            error!("❌ Failed to process message {}: {:#}", message_id, e);
                        }
                        Err(_) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            warn!("⏱️ Processing message {} timed out after {:?}", message_id, timeout);
                        }
                    }
                    drop(permit);
                });
            }
            info!("Message queue dispatcher exited");
        });

        Ok(())
    }

    /// Stops handing out work; queued messages are discarded.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Message queue stopped");
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.capacity - self.sender.capacity(),
            capacity: self.capacity,
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            running: self.running.load(Ordering::SeqCst),
        }
    }
}
