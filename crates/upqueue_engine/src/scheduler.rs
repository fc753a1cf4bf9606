use upqueue_contract::{EntryId, EntryStatus, QueueEntry};

pub fn active_count(entries: &[QueueEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| entry.status == EntryStatus::Uploading)
        .count()
}

pub fn available_slots(max_concurrent: usize, active: usize) -> usize {
    max_concurrent.saturating_sub(active)
}

/// Earliest-admitted pending entries that no unit has claimed, up to the
/// number of free slots.
pub fn select_eligible(entries: &[QueueEntry], max_concurrent: usize) -> Vec<EntryId> {
    let slots = available_slots(max_concurrent, active_count(entries));
    if slots == 0 {
        return Vec::new();
    }

    entries
        .iter()
        .filter(|entry| entry.status == EntryStatus::Pending && entry.claim.is_none())
        .take(slots)
        .map(|entry| entry.id.clone())
        .collect()
}
