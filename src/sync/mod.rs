//! Bidirectional synchronization with the remote authoritative store:
//! per-table pull with timestamp watermarks (last-write-wins, remote
//! authoritative once visible) followed by a drain of the offline
//! mutation queue.

pub mod connectivity;
pub mod engine;
pub mod queue;
pub mod remote;

pub use connectivity::Connectivity;
pub use engine::{SyncEngine, SyncError, SyncOutcome, SyncReport};
pub use queue::MutationQueue;
pub use remote::{RemoteError, RemoteStore};
