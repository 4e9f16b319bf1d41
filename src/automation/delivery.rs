use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::automation::scheduler::AutomationScheduler;
use crate::db::now_ts;
use crate::db::scheduled_message::{MessageStatus, ScheduledMessage};
use crate::store::{LocalStore, StoreError};

#[derive(Debug, Error)]
#[error("send failed: {0}")]
pub struct SendError(pub String);

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Provider-side message id, when the transport hands one back.
    pub provider_id: Option<String>,
    pub delivered_at: f64,
}

/// The external SMS transport. The queue treats every error as transient
/// and charges it against the retry budget; it never inspects subtypes.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> Result<DeliveryReceipt, SendError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Scans due `pending` messages and pushes them through the delivery
/// state machine with bounded retries.
pub struct DeliveryQueue {
    store: Arc<LocalStore>,
    sender: Arc<dyn MessageSender>,
    max_attempts: i64,
    cycle: tokio::sync::Mutex<()>,
}

impl DeliveryQueue {
    pub fn new(store: Arc<LocalStore>, sender: Arc<dyn MessageSender>, max_attempts: i64) -> Self {
        Self {
            store,
            sender,
            max_attempts,
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn process_queue(&self) -> Result<DeliveryReport, StoreError> {
        self.process_queue_at(now_ts()).await
    }

    /// One delivery cycle over every `pending` message due at `now`. Each
    /// message commits independently: the claim is persisted before the
    /// send so a crash mid-send costs one attempt, not a duplicate, and
    /// one failed send never aborts the rest of the batch.
    pub async fn process_queue_at(&self, now: f64) -> Result<DeliveryReport, StoreError> {
        let Ok(_guard) = self.cycle.try_lock() else {
            debug!("delivery cycle already in progress");
            return Ok(DeliveryReport::default());
        };

        let mut due: Vec<ScheduledMessage> = self
            .store
            .get_all::<ScheduledMessage>()
            .await?
            .into_iter()
            .filter(|m| m.status == MessageStatus::Pending && m.scheduled_for <= now)
            .collect();
        due.sort_by(|a, b| a.scheduled_for.total_cmp(&b.scheduled_for));

        let mut report = DeliveryReport::default();
        for mut message in due {
            if !message.claim() {
                continue;
            }
            let message = self.store.save(message).await?;

            match self.sender.send(&message.phone, &message.message_body).await {
                Ok(receipt) => {
                    let mut message = message;
                    message.mark_sent(receipt.delivered_at);
                    self.store.save(message).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    let mut message = message;
                    message.record_failure(e.to_string(), self.max_attempts);
                    if message.status == MessageStatus::Failed {
                        warn!(
                            "message {} failed permanently after {} attempts: {e}",
                            message.id, message.attempts
                        );
                        report.failed += 1;
                    } else {
                        debug!(
                            "message {} send failed (attempt {}), will retry: {e}",
                            message.id, message.attempts
                        );
                        report.retried += 1;
                    }
                    self.store.save(message).await?;
                }
            }
        }

        if report != DeliveryReport::default() {
            info!(
                "delivery cycle: {} sent, {} retried, {} failed",
                report.sent, report.retried, report.failed
            );
        }
        Ok(report)
    }

    /// Background automation loop: each tick evaluates rules, then runs a
    /// delivery cycle. Errors are logged and the loop keeps ticking.
    pub fn spawn(
        self: Arc<Self>,
        scheduler: Arc<AutomationScheduler>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let queue = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.process_all_rules_at(Utc::now()).await {
                            warn!("rule evaluation failed: {e}");
                        }
                        if let Err(e) = queue.process_queue().await {
                            warn!("delivery cycle failed: {e}");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("automation loop stopped");
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted transport fake: pops one outcome per send, succeeding
    /// once the script runs dry. Records every (phone, body) pair.
    #[derive(Default)]
    pub struct ScriptedSender {
        outcomes: Mutex<VecDeque<Result<(), String>>>,
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedSender {
        pub fn fail_next(&self, times: usize, error: &str) {
            let mut outcomes = self.outcomes.lock().expect("sender lock");
            for _ in 0..times {
                outcomes.push_back(Err(error.to_string()));
            }
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().expect("sender lock").len()
        }
    }

    #[async_trait]
    impl MessageSender for ScriptedSender {
        async fn send(&self, phone: &str, body: &str) -> Result<DeliveryReceipt, SendError> {
            let outcome = self
                .outcomes
                .lock()
                .expect("sender lock")
                .pop_front()
                .unwrap_or(Ok(()));
            match outcome {
                Ok(()) => {
                    self.sent
                        .lock()
                        .expect("sender lock")
                        .push((phone.to_string(), body.to_string()));
                    Ok(DeliveryReceipt {
                        provider_id: Some(format!("receipt-{}", self.sent_count())),
                        delivered_at: now_ts(),
                    })
                }
                Err(e) => Err(SendError(e)),
            }
        }
    }
}
