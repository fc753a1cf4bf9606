use upqueue_contract::{BatchOutcome, EntryId, QueueConfiguration};
use upqueue_transfer::{FilePayload, TransferError};

const MISSING_RESULT: &str = "no result returned for file";
const GENERIC_FAILURE: &str = "upload failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResolution {
    Success(String),
    Failure(String),
    Cancelled,
}

/// Splits selected entries into transfer units: one unit per entry, or
/// chunks of `max_batch_size` when batching is on.
pub fn compose(selected: Vec<EntryId>, config: &QueueConfiguration) -> Vec<Vec<EntryId>> {
    if !config.batching_enabled {
        return selected.into_iter().map(|id| vec![id]).collect();
    }
    selected
        .chunks(config.max_batch_size.max(1))
        .map(<[EntryId]>::to_vec)
        .collect()
}

pub fn fallback_token(batch_token: &str, entry_id: &str) -> String {
    format!("{batch_token}-{entry_id}")
}

pub fn placeholder_location(token: &str, file_name: &str) -> String {
    format!("local://{token}/{file_name}")
}

/// Maps a normalized response onto the packed files, position by position.
pub fn resolve_outcome(
    outcome: &BatchOutcome,
    packed: &[FilePayload],
    token: &str,
) -> Vec<EntryResolution> {
    match outcome {
        BatchOutcome::StructuredResults { outcomes } => packed
            .iter()
            .enumerate()
            .map(|(index, file)| match outcomes.get(index) {
                Some(result) if result.success => EntryResolution::Success(
                    result
                        .location
                        .clone()
                        .unwrap_or_else(|| placeholder_location(token, &file.name)),
                ),
                Some(result) => EntryResolution::Failure(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
                ),
                None => EntryResolution::Failure(MISSING_RESULT.to_string()),
            })
            .collect(),
        BatchOutcome::UniformOutcome { outcome } if outcome.success => packed
            .iter()
            .map(|file| {
                EntryResolution::Success(
                    outcome
                        .location
                        .clone()
                        .unwrap_or_else(|| placeholder_location(token, &file.name)),
                )
            })
            .collect(),
        BatchOutcome::UniformOutcome { outcome } => {
            let message = outcome
                .error
                .clone()
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            packed
                .iter()
                .map(|_| EntryResolution::Failure(message.clone()))
                .collect()
        }
    }
}

pub fn resolve_failure(error: &TransferError, packed: &[FilePayload]) -> Vec<EntryResolution> {
    let resolution = match error {
        TransferError::Cancelled => EntryResolution::Cancelled,
        other => EntryResolution::Failure(other.to_string()),
    };
    vec![resolution; packed.len()]
}
