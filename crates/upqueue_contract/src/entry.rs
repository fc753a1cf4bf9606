use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EntryId = String;
pub type UnitId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Uploading,
    Success,
    Error,
    Cancelled,
}

/// A file offered for admission, before any validation has run.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    pub data: Arc<Vec<u8>>,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            media_type: media_type.into(),
            data: Arc::new(data),
        }
    }
}

/// One staged file and its transfer state.
///
/// `claim` names the transfer unit currently carrying the entry; it is only
/// ever set while the entry is `Uploading`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub name: String,
    pub size: u64,
    pub media_type: String,
    #[serde(skip)]
    pub data: Arc<Vec<u8>>,
    pub status: EntryStatus,
    pub progress: u8,
    pub eta: u64,
    pub error: Option<String>,
    pub result_location: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claim: Option<UnitId>,
}

impl QueueEntry {
    pub fn from_candidate(candidate: FileCandidate) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: candidate.name,
            size: candidate.size,
            media_type: candidate.media_type,
            data: candidate.data,
            status: EntryStatus::Pending,
            progress: 0,
            eta: 0,
            error: None,
            result_location: None,
            started_at: None,
            completed_at: None,
            claim: None,
        }
    }

    pub fn is_claimed_by(&self, unit_id: &str) -> bool {
        self.status == EntryStatus::Uploading && self.claim.as_deref() == Some(unit_id)
    }

    pub fn begin(&mut self, unit_id: &str, now: DateTime<Utc>) {
        self.status = EntryStatus::Uploading;
        self.progress = 0;
        self.eta = 0;
        self.error = None;
        self.result_location = None;
        self.started_at = Some(now);
        self.completed_at = None;
        self.claim = Some(unit_id.to_string());
    }

    /// Applies a progress sample. Samples below the current value are ignored.
    pub fn record_progress(&mut self, percent: u8, now: DateTime<Utc>) -> bool {
        if self.status != EntryStatus::Uploading {
            return false;
        }
        let percent = percent.min(100);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.eta = match self.started_at {
            Some(started_at) => {
                let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
                estimate_eta(percent, elapsed)
            }
            None => 0,
        };
        true
    }

    pub fn succeed(&mut self, location: String, now: DateTime<Utc>) {
        self.status = EntryStatus::Success;
        self.progress = 100;
        self.eta = 0;
        self.error = None;
        self.result_location = Some(location);
        self.completed_at = Some(now);
        self.claim = None;
    }

    pub fn fail(&mut self, message: String) {
        self.status = EntryStatus::Error;
        self.eta = 0;
        self.error = Some(message);
        self.result_location = None;
        self.claim = None;
    }

    pub fn cancel(&mut self) {
        self.status = EntryStatus::Cancelled;
        self.eta = 0;
        self.result_location = None;
        self.claim = None;
    }

    /// Puts a settled entry back in line for another attempt.
    pub fn reset(&mut self) {
        self.status = EntryStatus::Pending;
        self.progress = 0;
        self.eta = 0;
        self.error = None;
        self.result_location = None;
        self.started_at = None;
        self.completed_at = None;
        self.claim = None;
    }

    pub fn transfer_result(&self) -> Option<TransferResult> {
        if self.status != EntryStatus::Success {
            return None;
        }
        let location = self.result_location.clone()?;
        Some(TransferResult {
            entry_id: self.id.clone(),
            size: self.size,
            media_type: self.media_type.clone(),
            location,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Seconds remaining at the observed average rate. Zero means "unknown"
/// until the first non-zero sample arrives.
pub fn estimate_eta(progress: u8, elapsed_secs: f64) -> u64 {
    if progress == 0 || progress >= 100 || elapsed_secs <= 0.0 {
        return 0;
    }
    let rate = f64::from(progress) / elapsed_secs;
    let remaining = f64::from(100 - progress) / rate;
    remaining.round().max(0.0) as u64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResult {
    pub entry_id: EntryId,
    pub size: u64,
    pub media_type: String,
    pub location: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub progress: u8,
    pub is_transferring: bool,
}
