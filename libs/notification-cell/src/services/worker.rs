use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::error::NotificationError;
use crate::models::{NotificationIntent, OutboxStatus, WorkerConfig};
use crate::services::channel::NotificationChannel;
use crate::services::outbox::NotificationOutbox;

/// Wakes the outbox worker after new intents were committed.
#[derive(Clone, Default)]
pub struct DispatchHandle {
    wake: Arc<Notify>,
}

impl DispatchHandle {
    pub fn nudge(&self) {
        self.wake.notify_one();
    }
}

pub struct OutboxWorker {
    config: WorkerConfig,
    outbox: Arc<dyn NotificationOutbox>,
    channel: Arc<dyn NotificationChannel>,
    wake: Arc<Notify>,
    is_shutdown: RwLock<bool>,
}

impl OutboxWorker {
    pub fn new(
        config: WorkerConfig,
        outbox: Arc<dyn NotificationOutbox>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            config,
            outbox,
            channel,
            wake: Arc::new(Notify::new()),
            is_shutdown: RwLock::new(false),
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle { wake: self.wake.clone() }
    }

    /// Runs until `shutdown` is called. Drains on every wake-up and on each poll tick.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn run(&self) {
        info!("Starting outbox worker {}", self.config.worker_id);
        let poll = Duration::from_secs(self.config.poll_interval_seconds.max(1));

        loop {
            if *self.is_shutdown.read().await {
                debug!("Outbox worker {} received shutdown signal", self.config.worker_id);
                break;
            }

            match self.drain_once().await {
                Ok(0) => {}
                Ok(n) => debug!("Outbox worker processed {} intents", n),
                Err(e) => error!("Outbox worker failed to read pending intents: {}", e),
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }

        info!("Outbox worker {} stopped", self.config.worker_id);
    }

    pub async fn shutdown(&self) {
        info!("Initiating shutdown for outbox worker {}", self.config.worker_id);
        *self.is_shutdown.write().await = true;
        self.wake.notify_one();
    }

    /// One pass over the pending intents. Returns how many were attempted.
    pub async fn drain_once(&self) -> Result<usize, NotificationError> {
        let batch = self.outbox.pending(self.config.batch_size).await?;
        let count = batch.len();

        for mut intent in batch {
            if intent.status != OutboxStatus::Pending {
                continue;
            }

            match self.deliver_with_timeout(&intent).await {
                Ok(()) => intent.record_delivery(),
                Err(e) => {
                    intent.record_failure(&e.to_string());
                    if intent.status == OutboxStatus::Failed {
                        error!(
                            intent_id = %intent.id,
                            appointment_id = %intent.appointment_id,
                            "Giving up on notification after {} attempts: {}", intent.attempts, e
                        );
                    } else {
                        warn!(intent_id = %intent.id, "Notification delivery failed, will retry: {}", e);
                    }
                }
            }

            if let Err(e) = self.outbox.update(&intent).await {
                error!(intent_id = %intent.id, "Failed to record notification outcome: {}", e);
            }
        }

        Ok(count)
    }

    async fn deliver_with_timeout(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let limit = self.config.delivery_timeout_seconds;
        match timeout(Duration::from_secs(limit), self.channel.deliver(intent)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::DeliveryTimeout { timeout_seconds: limit }),
        }
    }
}
