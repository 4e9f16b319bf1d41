use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure; nothing reached the remote side. The
    /// whole push drain stops and retries next cycle.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote accepted the connection but refused this row.
    #[error("remote rejected row: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// The remote authoritative store, REST/RPC-shaped. Rows travel as the
/// entity's JSON document, the same representation both local backends
/// use, so the engine stays entity-agnostic. `upsert` must be
/// idempotent by id: the offline queue relies on at-least-once pushes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Rows of `table` with `updated_at` strictly greater than `watermark`.
    async fn pull_since(
        &self,
        table: &str,
        watermark: f64,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;

    async fn upsert(&self, table: &str, row: serde_json::Value) -> Result<(), RemoteError>;

    async fn delete(&self, table: &str, id: Uuid) -> Result<(), RemoteError>;
}
