use thiserror::Error;
use upqueue_contract::{EntryId, EntryStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue entry not found: {0}")]
    NotFound(EntryId),
    #[error("queue entry {id} cannot be retried while {status:?}")]
    NotRetryable { id: EntryId, status: EntryStatus },
}
