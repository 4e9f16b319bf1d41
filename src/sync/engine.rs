use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::automation_rule::AutomationRule;
use crate::db::campaign::Campaign;
use crate::db::contact::Contact;
use crate::db::now_ts;
use crate::db::pending_mutation::MutationOp;
use crate::store::{LocalStore, Record, StoreError};
use crate::sync::connectivity::Connectivity;
use crate::sync::queue::MutationQueue;
use crate::sync::remote::{RemoteError, RemoteStore};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("undecodable remote row: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// Connectivity reported offline; nothing was attempted.
    Offline,
    /// Another cycle holds the lock; this invocation was suppressed.
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub pulled: usize,
    pub pushed: usize,
}

impl SyncReport {
    fn skipped(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            pulled: 0,
            pushed: 0,
        }
    }
}

/// Pull-then-push reconciliation against the remote store.
///
/// Conflict policy is last-write-wins by timestamp with the remote
/// authoritative: pulled rows are applied verbatim (the remote resolved
/// any write races before exposing them) and local edits flow back as
/// idempotent upserts from the mutation queue.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    cycle: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        queue: MutationQueue,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            store,
            queue,
            remote,
            connectivity,
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs one full cycle across every synced table. Fails soft: an
    /// offline signal or an in-flight cycle returns a skipped report, and
    /// per-table errors are logged without aborting the remaining tables,
    /// so periodic callers never die on one bad cycle.
    pub async fn sync_all(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            info!("sync skipped: offline");
            return SyncReport::skipped(SyncOutcome::Offline);
        }
        let Ok(_guard) = self.cycle.try_lock() else {
            debug!("sync skipped: cycle already in progress");
            return SyncReport::skipped(SyncOutcome::AlreadyRunning);
        };

        let mut pulled = 0;
        pulled += self.pull_table_logged::<Contact>().await;
        pulled += self.pull_table_logged::<Campaign>().await;
        pulled += self.pull_table_logged::<AutomationRule>().await;

        let pushed = match self.process_pending_mutations().await {
            Ok(n) => n,
            Err(e) => {
                warn!("mutation push pass failed: {e}");
                0
            }
        };

        info!("sync cycle complete: pulled {pulled}, pushed {pushed}");
        SyncReport {
            outcome: SyncOutcome::Completed,
            pulled,
            pushed,
        }
    }

    async fn pull_table_logged<T: Record>(&self) -> usize {
        match self.pull_table::<T>().await {
            Ok(n) => n,
            Err(e) => {
                warn!("pull failed for table {}: {e}", T::TABLE);
                0
            }
        }
    }

    /// Pulls rows newer than the table watermark and applies them
    /// verbatim. The watermark only advances after every pulled row is
    /// applied, to `max(cycle start, newest pulled updated_at)`.
    async fn pull_table<T: Record>(&self) -> Result<usize, SyncError> {
        let watermark = self.store.watermark(T::TABLE).await?;
        let cutoff = now_ts();

        let rows = self.remote.pull_since(T::TABLE, watermark).await?;
        let count = rows.len();

        let mut newest = cutoff;
        for row in rows {
            let entity: T = serde_json::from_value(row)?;
            if entity.updated_at() > newest {
                newest = entity.updated_at();
            }
            self.store.save_replica(entity).await?;
        }

        self.store.set_watermark(T::TABLE, newest).await?;
        if count > 0 {
            debug!("pulled {count} rows into {}", T::TABLE);
        }
        Ok(count)
    }

    /// Drains the offline queue to the remote side. An entry is acked iff
    /// its push succeeded; a transport outage stops the drain (everything
    /// behind it would fail the same way), while a per-row rejection is
    /// logged and left queued for the next cycle.
    pub async fn process_pending_mutations(&self) -> Result<usize, SyncError> {
        let mut pushed = 0;
        for mutation in self.queue.drain().await? {
            let result = match mutation.operation {
                MutationOp::Insert | MutationOp::Update => {
                    self.remote
                        .upsert(&mutation.table_name, mutation.data.clone())
                        .await
                }
                MutationOp::Delete => match mutation.target_id() {
                    Some(id) => self.remote.delete(&mutation.table_name, id).await,
                    None => Err(RemoteError::Rejected(
                        "delete snapshot without an id".into(),
                    )),
                },
            };

            match result {
                Ok(()) => {
                    self.queue.ack(mutation.id).await?;
                    pushed += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "remote push failed, mutation {} stays queued: {e}",
                        mutation.id
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        "remote rejected mutation {} ({} {:?}): {e}",
                        mutation.id, mutation.table_name, mutation.operation
                    );
                }
            }
        }
        Ok(pushed)
    }

    /// Background loop: fixed-interval cycles plus an immediate cycle on
    /// every offline-to-online transition. Stops when `shutdown` flips.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let mut online_rx = engine.connectivity.subscribe();
            let mut was_online = *online_rx.borrow();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.sync_all().await;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            info!("connectivity restored, starting sync");
                            engine.sync_all().await;
                        }
                        was_online = online;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("sync loop stopped");
        })
    }
}
