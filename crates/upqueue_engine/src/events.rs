use serde::Serialize;
use upqueue_contract::{EntryId, EntryStatus, UnitId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Admitted {
        entry_ids: Vec<EntryId>,
    },
    Started {
        entry_id: EntryId,
        unit_id: UnitId,
    },
    Progress {
        entry_id: EntryId,
        progress: u8,
        eta: u64,
    },
    Settled {
        entry_id: EntryId,
        status: EntryStatus,
    },
    Removed {
        entry_id: EntryId,
    },
    Cleared,
    /// Nothing is pending or uploading any more; the drain started by
    /// `start()` is over.
    Drained,
}
