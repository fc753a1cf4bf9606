use upqueue_contract::{EntryStatus, ProgressSummary, QueueEntry};

/// Queue-wide figures derived from entry state alone.
pub fn summarize(entries: &[QueueEntry]) -> ProgressSummary {
    let total_files = entries.len();
    if total_files == 0 {
        return ProgressSummary::default();
    }

    let mut completed_files = 0;
    let mut failed_files = 0;
    let mut is_transferring = false;
    let mut progress_sum: u64 = 0;

    for entry in entries {
        match entry.status {
            EntryStatus::Success => {
                completed_files += 1;
                progress_sum += 100;
            }
            EntryStatus::Error => failed_files += 1,
            EntryStatus::Uploading => {
                is_transferring = true;
                progress_sum += u64::from(entry.progress);
            }
            EntryStatus::Pending | EntryStatus::Cancelled => {}
        }
    }

    let progress = (progress_sum as f64 / total_files as f64).round() as u8;
    ProgressSummary {
        total_files,
        completed_files,
        failed_files,
        progress,
        is_transferring,
    }
}
