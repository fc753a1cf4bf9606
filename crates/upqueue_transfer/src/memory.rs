use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, Semaphore};
use tracing::info;
use upqueue_contract::BatchOutcome;

use crate::endpoint::{TransferEndpoint, TransferError, TransferRequest};
use crate::progress::ProgressReporter;

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Response body run through the same normalization as a real endpoint.
    Body(Value),
    Fail(TransferError),
    /// Never resolves; only a deadline or cancellation ends it.
    Stall,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub token: String,
    pub entry_ids: Vec<String>,
    pub file_names: Vec<String>,
    pub routing_path: Option<String>,
}

/// Endpoint that never touches the network. Responses are taken from a
/// script in order; once it runs dry every file succeeds with a
/// `memory://<token>/<name>` location.
#[derive(Debug, Default)]
pub struct InMemoryTransferEndpoint {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryTransferEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every upload after its first progress sample until the gate
    /// hands out a permit.
    pub fn with_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub async fn push(&self, response: ScriptedResponse) {
        self.script.lock().await.push_back(response);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn invocation_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    fn default_body(request: &TransferRequest) -> Value {
        let results: Vec<Value> = request
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                json!({
                    "success": true,
                    "url": format!("memory://{}/{}", request.token, file.name),
                    "index": index
                })
            })
            .collect();
        json!({ "results": results })
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl TransferEndpoint for InMemoryTransferEndpoint {
    async fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<BatchOutcome, TransferError> {
        self.requests.lock().await.push(RecordedRequest {
            token: request.token.clone(),
            entry_ids: request.files.iter().map(|f| f.entry_id.clone()).collect(),
            file_names: request.files.iter().map(|f| f.name.clone()).collect(),
            routing_path: request.target.routing_path.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::AcqRel);
        let _guard = InFlightGuard(&self.in_flight);

        info!(token = %request.token, file_count = request.file_count(), "in-memory upload accepted");

        progress.report_percent(25);
        tokio::task::yield_now().await;

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| TransferError::Transport("endpoint gate closed".to_string()))?;
            permit.forget();
        }

        progress.report_percent(60);
        tokio::task::yield_now().await;

        let scripted = self.script.lock().await.pop_front();
        match scripted {
            Some(ScriptedResponse::Fail(error)) => Err(error),
            Some(ScriptedResponse::Stall) => {
                futures::future::pending::<()>().await;
                Err(TransferError::Cancelled)
            }
            Some(ScriptedResponse::Body(body)) => {
                progress.report_percent(100);
                Ok(BatchOutcome::from_value(&body))
            }
            None => {
                progress.report_percent(100);
                Ok(BatchOutcome::from_value(&Self::default_body(&request)))
            }
        }
    }
}
