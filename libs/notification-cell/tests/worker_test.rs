use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use notification_cell::{
    NotificationChannel, NotificationError, NotificationIntent, NotificationKind,
    NotificationOutbox, OutboxStatus, OutboxWorker, WorkerConfig,
};

#[derive(Default)]
struct VecOutbox {
    items: Mutex<Vec<NotificationIntent>>,
}

#[async_trait]
impl NotificationOutbox for VecOutbox {
    async fn enqueue(&self, intents: Vec<NotificationIntent>) -> Result<(), NotificationError> {
        self.items.lock().await.extend(intents);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<NotificationIntent>, NotificationError> {
        Ok(self.items.lock().await
            .iter()
            .filter(|i| i.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        let mut items = self.items.lock().await;
        match items.iter_mut().find(|i| i.id == intent.id) {
            Some(existing) => {
                *existing = intent.clone();
                Ok(())
            }
            None => Err(NotificationError::Outbox(format!("unknown intent {}", intent.id))),
        }
    }
}

#[derive(Default)]
struct RecordingChannel {
    delivered: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn deliver(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        self.delivered.lock().await.push(intent.id);
        Ok(())
    }
}

#[derive(Default)]
struct FailingChannel {
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn deliver(&self, _intent: &NotificationIntent) -> Result<(), NotificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotificationError::Delivery("channel unavailable".to_string()))
    }
}

struct SlowChannel;

#[async_trait]
impl NotificationChannel for SlowChannel {
    async fn deliver(&self, _intent: &NotificationIntent) -> Result<(), NotificationError> {
        sleep(Duration::from_secs(3)).await;
        Ok(())
    }
}

fn intent(kind: NotificationKind) -> NotificationIntent {
    NotificationIntent::new(Uuid::new_v4(), Uuid::new_v4(), kind, "Appointment Confirmed", "Your token is 1")
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        worker_id: "outbox-test".to_string(),
        batch_size: 10,
        poll_interval_seconds: 60,
        delivery_timeout_seconds: 1,
    }
}

#[tokio::test]
async fn delivers_pending_intents_and_marks_them() {
    let outbox = Arc::new(VecOutbox::default());
    let channel = Arc::new(RecordingChannel::default());
    outbox.enqueue(vec![
        intent(NotificationKind::AppointmentConfirmation),
        intent(NotificationKind::NewAppointment),
    ]).await.unwrap();

    let worker = OutboxWorker::new(worker_config(), outbox.clone(), channel.clone());
    assert_eq!(worker.drain_once().await.unwrap(), 2);

    assert_eq!(channel.delivered.lock().await.len(), 2);
    assert!(outbox.items.lock().await.iter().all(|i| i.status == OutboxStatus::Delivered));
    assert_eq!(worker.drain_once().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_delivery_is_retried_until_budget_spent() {
    let outbox = Arc::new(VecOutbox::default());
    let channel = Arc::new(FailingChannel::default());
    outbox.enqueue(vec![intent(NotificationKind::AppointmentCancelled).with_max_attempts(3)]).await.unwrap();

    let worker = OutboxWorker::new(worker_config(), outbox.clone(), channel.clone());
    for _ in 0..5 {
        worker.drain_once().await.unwrap();
    }

    assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
    let items = outbox.items.lock().await;
    assert_eq!(items[0].status, OutboxStatus::Failed);
    assert_eq!(items[0].attempts, 3);
    assert!(items[0].last_error.as_deref().unwrap().contains("channel unavailable"));
}

#[tokio::test]
async fn slow_channel_hits_delivery_timeout() {
    let outbox = Arc::new(VecOutbox::default());
    outbox.enqueue(vec![intent(NotificationKind::NewAppointment)]).await.unwrap();

    let worker = OutboxWorker::new(worker_config(), outbox.clone(), Arc::new(SlowChannel));
    worker.drain_once().await.unwrap();

    let items = outbox.items.lock().await;
    assert_eq!(items[0].status, OutboxStatus::Pending);
    assert!(items[0].last_error.as_deref().unwrap().contains("timeout"));
}

#[tokio::test]
async fn nudge_wakes_running_worker() {
    let outbox = Arc::new(VecOutbox::default());
    let channel = Arc::new(RecordingChannel::default());
    let worker = Arc::new(OutboxWorker::new(worker_config(), outbox.clone(), channel.clone()));
    let handle = worker.handle();

    let running = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    outbox.enqueue(vec![intent(NotificationKind::AppointmentConfirmation)]).await.unwrap();
    handle.nudge();

    let mut delivered = false;
    for _ in 0..50 {
        if !channel.delivered.lock().await.is_empty() {
            delivered = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "worker did not wake up on nudge");

    worker.shutdown().await;
    tokio::time::timeout(Duration::from_secs(2), running).await.unwrap().unwrap();
}
