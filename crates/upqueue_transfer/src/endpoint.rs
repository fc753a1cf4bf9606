use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use upqueue_contract::{BatchOutcome, EntryId, QueueEntry, TransferTarget};

use crate::progress::ProgressReporter;

/// Multipart field every file payload is packed under.
pub const FILE_FIELD: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("upload cancelled")]
    Cancelled,
    #[error("upload timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(String),
    #[error("upload rejected with status {status}: {message}")]
    Remote { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct FilePayload {
    pub entry_id: EntryId,
    pub name: String,
    pub media_type: String,
    pub data: Arc<Vec<u8>>,
}

impl From<&QueueEntry> for FilePayload {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            name: entry.name.clone(),
            media_type: entry.media_type.clone(),
            data: Arc::clone(&entry.data),
        }
    }
}

/// One outgoing request: a single file or a batch packed together.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Sent as the `batchId` field and the idempotency key.
    pub token: String,
    pub target: TransferTarget,
    pub files: Vec<FilePayload>,
}

impl TransferRequest {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.data.len() as u64).sum()
    }
}

#[async_trait]
pub trait TransferEndpoint: Send + Sync {
    async fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<BatchOutcome, TransferError>;
}
