use tracing::{info, warn};
use upqueue_contract::{EntryId, FileCandidate, QueueConfiguration, QueueEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionReport {
    pub accepted: usize,
    pub accepted_ids: Vec<EntryId>,
    pub rejections: Vec<String>,
}

/// Validates candidates in order and appends the accepted ones as pending
/// entries. Nothing here starts a transfer.
pub fn admit(
    candidates: Vec<FileCandidate>,
    queue: &mut Vec<QueueEntry>,
    config: &QueueConfiguration,
) -> AdmissionReport {
    let mut report = AdmissionReport::default();

    for candidate in candidates {
        if let Some(reason) = rejection_reason(&candidate, queue.len(), config) {
            warn!(file = %candidate.name, reason = %reason, "file rejected");
            report.rejections.push(reason);
            continue;
        }

        let entry = QueueEntry::from_candidate(candidate);
        info!(entry_id = %entry.id, file = %entry.name, size = entry.size, "file staged");
        report.accepted += 1;
        report.accepted_ids.push(entry.id.clone());
        queue.push(entry);
    }

    report
}

fn rejection_reason(
    candidate: &FileCandidate,
    queued: usize,
    config: &QueueConfiguration,
) -> Option<String> {
    if queued >= config.max_entries {
        return Some(format!(
            "{}: maximum files ({}) exceeded",
            candidate.name, config.max_entries
        ));
    }
    if !config.allows_media_type(&candidate.media_type) {
        return Some(format!(
            "{}: file type {} is not allowed (allowed types: {})",
            candidate.name,
            candidate.media_type,
            config.allowed_media_types_label()
        ));
    }
    if candidate.size > config.max_entry_size_bytes {
        return Some(format!(
            "{}: file exceeds the maximum size of {} MB ({} bytes)",
            candidate.name,
            format_megabytes(config.max_entry_size_bytes),
            config.max_entry_size_bytes
        ));
    }
    None
}

fn format_megabytes(bytes: u64) -> String {
    let megabytes = bytes as f64 / (1024.0 * 1024.0);
    if megabytes.fract() == 0.0 {
        format!("{megabytes:.0}")
    } else {
        format!("{megabytes:.1}")
    }
}
