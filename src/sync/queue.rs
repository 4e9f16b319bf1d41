use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::db::pending_mutation::{MutationOp, PendingMutation};
use crate::store::{LocalStore, Record, StoreError};

/// Append-only log of local writes awaiting remote propagation, persisted
/// through [`LocalStore`] so it survives restarts on either backend.
///
/// The queue is not compacted: writing the same entity twice before a
/// sync cycle leaves two entries, which is harmless because remote
/// application is upsert-by-id.
#[derive(Clone)]
pub struct MutationQueue {
    store: Arc<LocalStore>,
}

impl MutationQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue(
        &self,
        table: &str,
        operation: MutationOp,
        data: serde_json::Value,
    ) -> Result<PendingMutation, StoreError> {
        let entry = PendingMutation::new(table, operation, data);
        // save_replica: queue rows keep their created_at, nothing stamps them.
        self.store.save_replica(entry.clone()).await?;
        Ok(entry)
    }

    /// Enqueues the full JSON snapshot of a saved entity.
    pub async fn enqueue_record<T: Record>(
        &self,
        operation: MutationOp,
        entity: &T,
    ) -> Result<PendingMutation, StoreError> {
        let data = serde_json::to_value(entity)?;
        self.enqueue(T::TABLE, operation, data).await
    }

    /// Enqueues a delete; the snapshot only needs the target id.
    pub async fn enqueue_delete(
        &self,
        table: &str,
        id: Uuid,
    ) -> Result<PendingMutation, StoreError> {
        self.enqueue(table, MutationOp::Delete, json!({ "id": id.to_string() }))
            .await
    }

    /// All queued entries, FIFO by `(created_at, id)`.
    pub async fn drain(&self) -> Result<Vec<PendingMutation>, StoreError> {
        let mut entries = self.store.get_all::<PendingMutation>().await?;
        entries.sort_by(|a, b| {
            a.created_at
                .total_cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Removes an entry after its remote application was confirmed.
    pub async fn ack(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete::<PendingMutation>(id).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.get_all::<PendingMutation>().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order_and_ack() {
        let store = Arc::new(
            LocalStore::open_sqlite_in_memory()
                .await
                .expect("open store"),
        );
        let queue = MutationQueue::new(store);

        let first = queue
            .enqueue("contact", MutationOp::Insert, json!({ "id": "a" }))
            .await
            .expect("enqueue first");
        let second = queue
            .enqueue("contact", MutationOp::Update, json!({ "id": "a" }))
            .await
            .expect("enqueue second");
        let third = queue
            .enqueue("campaign", MutationOp::Insert, json!({ "id": "b" }))
            .await
            .expect("enqueue third");

        let drained = queue.drain().await.expect("drain");
        assert_eq!(
            drained.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![first.id, second.id, third.id]
        );

        queue.ack(second.id).await.expect("ack");
        let drained = queue.drain().await.expect("drain after ack");
        assert_eq!(
            drained.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![first.id, third.id]
        );
        assert_eq!(queue.len().await.expect("len"), 2);
    }

    #[tokio::test]
    async fn test_duplicate_writes_keep_both_entries() {
        let store = Arc::new(
            LocalStore::open_sqlite_in_memory()
                .await
                .expect("open store"),
        );
        let queue = MutationQueue::new(store);

        let snapshot = json!({ "id": Uuid::now_v7().to_string(), "name": "N" });
        queue
            .enqueue("contact", MutationOp::Update, snapshot.clone())
            .await
            .expect("first");
        queue
            .enqueue("contact", MutationOp::Update, snapshot)
            .await
            .expect("second");

        assert_eq!(queue.len().await.expect("len"), 2);
    }
}
