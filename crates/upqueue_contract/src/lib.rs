pub mod config;
pub mod entry;
pub mod outcome;

pub use config::{
    InvalidConfiguration, LooseNumber, MediaTypeList, QueueConfiguration, RemoteConfig,
    TransferTarget,
};
pub use entry::{
    estimate_eta, EntryId, EntryStatus, FileCandidate, ProgressSummary, QueueEntry,
    TransferResult, UnitId,
};
pub use outcome::{BatchOutcome, FileOutcome};
