use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use upqueue_contract::{
    BatchOutcome, EntryId, EntryStatus, FileCandidate, InvalidConfiguration, ProgressSummary,
    QueueConfiguration, QueueEntry, TransferResult, UnitId,
};
use upqueue_transfer::{
    progress_channel, FilePayload, TransferEndpoint, TransferError, TransferRequest, TransferUnit,
};
use uuid::Uuid;

use crate::admission::{self, AdmissionReport};
use crate::batch::{self, EntryResolution};
use crate::error::QueueError;
use crate::events::QueueEvent;
use crate::progress;
use crate::scheduler;

const EVENT_CAPACITY: usize = 1024;

struct LiveUnit {
    entry_ids: Vec<EntryId>,
    abort: AbortHandle,
}

#[derive(Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    units: HashMap<UnitId, LiveUnit>,
    draining: bool,
}

impl QueueState {
    fn entry_mut(&mut self, id: &str) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }
}

struct Shared {
    config: QueueConfiguration,
    unit: TransferUnit,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    idle: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct UploadQueue {
    shared: Arc<Shared>,
}

impl UploadQueue {
    pub fn new(
        config: QueueConfiguration,
        endpoint: Arc<dyn TransferEndpoint>,
    ) -> Result<Self, InvalidConfiguration> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (idle, _) = watch::channel(true);
        let unit = TransferUnit::new(endpoint, config.transfer_timeout());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                unit,
                state: Mutex::new(QueueState::default()),
                events,
                idle,
            }),
        })
    }

    pub fn config(&self) -> &QueueConfiguration {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    pub fn events(&self) -> BroadcastStream<QueueEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Stages candidates. Accepted files wait as pending until a drain picks
    /// them up.
    pub async fn admit(&self, candidates: Vec<FileCandidate>) -> AdmissionReport {
        let mut state = self.shared.state.lock().await;
        let report = admission::admit(candidates, &mut state.entries, &self.shared.config);
        if !report.accepted_ids.is_empty() {
            self.emit(QueueEvent::Admitted {
                entry_ids: report.accepted_ids.clone(),
            });
            self.pump(&mut state);
        }
        report
    }

    pub async fn start(&self) {
        let mut state = self.shared.state.lock().await;
        info!(
            pending = state
                .entries
                .iter()
                .filter(|entry| entry.status == EntryStatus::Pending)
                .count(),
            "upload drain requested"
        );
        state.draining = true;
        self.shared.idle.send_replace(false);
        self.pump(&mut state);
    }

    /// Cancels an entry. An in-flight entry takes its whole transfer unit
    /// down with it; a pending one is simply marked cancelled.
    pub async fn cancel(&self, entry_id: &str) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock().await;
        let entry = state
            .entry_mut(entry_id)
            .ok_or_else(|| QueueError::NotFound(entry_id.to_string()))?;

        match (entry.status, entry.claim.clone()) {
            (EntryStatus::Uploading, Some(unit_id)) => self.abort_unit(&mut state, &unit_id),
            (EntryStatus::Pending, _) => {
                entry.cancel();
                self.emit(QueueEvent::Settled {
                    entry_id: entry_id.to_string(),
                    status: EntryStatus::Cancelled,
                });
            }
            _ => return Ok(()),
        }
        self.pump(&mut state);
        Ok(())
    }

    /// Resets a failed or cancelled entry to pending and resumes draining.
    pub async fn retry(&self, entry_id: &str) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock().await;
        let entry = state
            .entry_mut(entry_id)
            .ok_or_else(|| QueueError::NotFound(entry_id.to_string()))?;

        match entry.status {
            EntryStatus::Error | EntryStatus::Cancelled => entry.reset(),
            status => {
                return Err(QueueError::NotRetryable {
                    id: entry_id.to_string(),
                    status,
                })
            }
        }
        info!(entry_id = %entry_id, "entry queued for retry");

        state.draining = true;
        self.shared.idle.send_replace(false);
        self.pump(&mut state);
        Ok(())
    }

    pub async fn remove(&self, entry_id: &str) -> Result<QueueEntry, QueueError> {
        let mut state = self.shared.state.lock().await;
        let index = state
            .position(entry_id)
            .ok_or_else(|| QueueError::NotFound(entry_id.to_string()))?;

        if let Some(unit_id) = state.entries[index].claim.clone() {
            self.abort_unit(&mut state, &unit_id);
        }
        let removed = state.entries.remove(index);
        info!(entry_id = %entry_id, "entry removed");
        self.emit(QueueEvent::Removed {
            entry_id: entry_id.to_string(),
        });
        self.pump(&mut state);
        Ok(removed)
    }

    pub async fn clear(&self) {
        let mut state = self.shared.state.lock().await;
        self.abort_all(&mut state);
        state.entries.clear();
        info!("upload queue cleared");
        self.emit(QueueEvent::Cleared);
        self.pump(&mut state);
    }

    /// Session teardown: aborts every live transfer and stops draining.
    /// Pending entries stay staged.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        self.abort_all(&mut state);
        state.draining = false;
        self.shared.idle.send_replace(true);
        info!("upload queue shut down");
    }

    pub async fn wait_until_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.shared.state.lock().await.entries.clone()
    }

    pub async fn entry(&self, entry_id: &str) -> Option<QueueEntry> {
        let state = self.shared.state.lock().await;
        state.entries.iter().find(|entry| entry.id == entry_id).cloned()
    }

    pub async fn summary(&self) -> ProgressSummary {
        progress::summarize(&self.shared.state.lock().await.entries)
    }

    pub async fn results(&self) -> Vec<TransferResult> {
        let state = self.shared.state.lock().await;
        state
            .entries
            .iter()
            .filter_map(QueueEntry::transfer_result)
            .collect()
    }

    pub async fn active_transfers(&self) -> usize {
        scheduler::active_count(&self.shared.state.lock().await.entries)
    }

    pub async fn live_units(&self) -> usize {
        self.shared.state.lock().await.units.len()
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.shared.events.send(event);
    }

    /// Fills free slots while a drain is active and ends the drain once
    /// nothing is pending or uploading.
    fn pump(&self, state: &mut QueueState) {
        if !state.draining {
            return;
        }

        let selected =
            scheduler::select_eligible(&state.entries, self.shared.config.max_concurrent_transfers);
        for group in batch::compose(selected, &self.shared.config) {
            self.dispatch(state, group);
        }

        if scheduler::active_count(&state.entries) == 0 {
            state.draining = false;
            self.shared.idle.send_replace(true);
            info!(summary = ?progress::summarize(&state.entries), "upload queue drained");
            self.emit(QueueEvent::Drained);
        }
    }

    fn dispatch(&self, state: &mut QueueState, group: Vec<EntryId>) {
        let unit_id = Uuid::now_v7().to_string();
        let now = Utc::now();

        let mut files = Vec::with_capacity(group.len());
        for id in &group {
            if let Some(entry) = state.entry_mut(id) {
                entry.begin(&unit_id, now);
                files.push(FilePayload::from(&*entry));
            }
        }
        let Some(first) = files.first() else {
            return;
        };

        let token = if self.shared.config.batching_enabled {
            unit_id.clone()
        } else {
            first.entry_id.clone()
        };
        let entry_ids: Vec<EntryId> = files.iter().map(|file| file.entry_id.clone()).collect();
        for entry_id in &entry_ids {
            self.emit(QueueEvent::Started {
                entry_id: entry_id.clone(),
                unit_id: unit_id.clone(),
            });
        }

        let request = TransferRequest {
            token,
            target: self.shared.config.transfer_target.clone(),
            files,
        };
        let allow_fallback = self.shared.config.batching_enabled && request.file_count() > 1;
        info!(
            unit_id = %unit_id,
            token = %request.token,
            file_count = request.file_count(),
            "transfer unit started"
        );

        let queue = self.clone();
        let task_unit_id = unit_id.clone();
        let handle = tokio::spawn(async move {
            queue.run_unit(task_unit_id, request, allow_fallback).await;
        });
        state.units.insert(
            unit_id,
            LiveUnit {
                entry_ids,
                abort: handle.abort_handle(),
            },
        );
    }

    fn abort_unit(&self, state: &mut QueueState, unit_id: &str) {
        let Some(unit) = state.units.remove(unit_id) else {
            return;
        };
        unit.abort.abort();
        warn!(unit_id = %unit_id, "transfer unit aborted");

        for entry_id in &unit.entry_ids {
            if let Some(entry) = state.entry_mut(entry_id) {
                if entry.is_claimed_by(unit_id) {
                    entry.cancel();
                    self.emit(QueueEvent::Settled {
                        entry_id: entry_id.clone(),
                        status: EntryStatus::Cancelled,
                    });
                }
            }
        }
    }

    fn abort_all(&self, state: &mut QueueState) {
        let unit_ids: Vec<UnitId> = state.units.keys().cloned().collect();
        for unit_id in unit_ids {
            self.abort_unit(state, &unit_id);
        }
    }

    async fn run_unit(self, unit_id: UnitId, request: TransferRequest, allow_fallback: bool) {
        match self.transfer(&unit_id, request.clone()).await {
            Err(TransferError::Transport(reason)) if allow_fallback => {
                warn!(
                    unit_id = %unit_id,
                    reason = %reason,
                    "batch transfer failed, resubmitting files individually"
                );
                self.run_fallback(&unit_id, &request).await;
            }
            result => {
                let settled = resolutions(&result, &request);
                self.settle(&unit_id, settled, true).await;
            }
        }
    }

    /// Each packed file goes out on its own, inside the slots the batch
    /// already holds.
    async fn run_fallback(&self, unit_id: &str, request: &TransferRequest) {
        let attempts = request.files.iter().map(|file| {
            let single = TransferRequest {
                token: batch::fallback_token(&request.token, &file.entry_id),
                target: request.target.clone(),
                files: vec![file.clone()],
            };
            async move {
                let result = self.transfer(unit_id, single.clone()).await;
                let settled = resolutions(&result, &single);
                self.settle(unit_id, settled, false).await;
            }
        });
        join_all(attempts).await;

        let mut state = self.shared.state.lock().await;
        if state.units.remove(unit_id).is_some() {
            self.pump(&mut state);
        }
    }

    async fn transfer(
        &self,
        unit_id: &str,
        request: TransferRequest,
    ) -> Result<BatchOutcome, TransferError> {
        let entry_ids: Vec<EntryId> = request.files.iter().map(|f| f.entry_id.clone()).collect();
        let (reporter, mut progress_rx) = progress_channel();
        let transfer = self.shared.unit.execute(request, reporter);
        tokio::pin!(transfer);

        loop {
            tokio::select! {
                biased;
                Some(percent) = progress_rx.recv() => {
                    self.apply_progress(unit_id, &entry_ids, percent).await;
                }
                result = &mut transfer => return result,
            }
        }
    }

    async fn apply_progress(&self, unit_id: &str, entry_ids: &[EntryId], percent: u8) {
        let mut state = self.shared.state.lock().await;
        if !state.units.contains_key(unit_id) {
            return;
        }

        let now = Utc::now();
        for entry_id in entry_ids {
            let Some(entry) = state.entry_mut(entry_id) else {
                continue;
            };
            if entry.is_claimed_by(unit_id) && entry.record_progress(percent, now) {
                self.emit(QueueEvent::Progress {
                    entry_id: entry_id.clone(),
                    progress: entry.progress,
                    eta: entry.eta,
                });
            }
        }
    }

    /// Applies terminal outcomes. Outcomes from a unit that was aborted in
    /// the meantime are dropped.
    async fn settle(
        &self,
        unit_id: &str,
        settled: Vec<(EntryId, EntryResolution)>,
        unit_finished: bool,
    ) {
        let mut state = self.shared.state.lock().await;
        if !state.units.contains_key(unit_id) {
            debug!(unit_id = %unit_id, "ignoring outcome of aborted unit");
            return;
        }
        if unit_finished {
            state.units.remove(unit_id);
        }

        let now = Utc::now();
        for (entry_id, resolution) in settled {
            let Some(entry) = state.entry_mut(&entry_id) else {
                continue;
            };
            if !entry.is_claimed_by(unit_id) {
                continue;
            }
            match resolution {
                EntryResolution::Success(location) => {
                    info!(entry_id = %entry_id, location = %location, "upload succeeded");
                    entry.succeed(location, now);
                }
                EntryResolution::Failure(message) => {
                    warn!(entry_id = %entry_id, error = %message, "upload failed");
                    entry.fail(message);
                }
                EntryResolution::Cancelled => {
                    info!(entry_id = %entry_id, "upload cancelled");
                    entry.cancel();
                }
            }
            let status = entry.status;
            self.emit(QueueEvent::Settled { entry_id, status });
        }

        self.pump(&mut state);
    }
}

fn resolutions(
    result: &Result<BatchOutcome, TransferError>,
    request: &TransferRequest,
) -> Vec<(EntryId, EntryResolution)> {
    let resolved = match result {
        Ok(outcome) => batch::resolve_outcome(outcome, &request.files, &request.token),
        Err(error) => batch::resolve_failure(error, &request.files),
    };
    request
        .files
        .iter()
        .map(|file| file.entry_id.clone())
        .zip(resolved)
        .collect()
}
