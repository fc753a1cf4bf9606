use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use upqueue_contract::BatchOutcome;

use crate::endpoint::{TransferEndpoint, TransferError, TransferRequest};
use crate::progress::ProgressReporter;

/// Runs a single request against an endpoint under a client-side deadline.
#[derive(Clone)]
pub struct TransferUnit {
    endpoint: Arc<dyn TransferEndpoint>,
    timeout: Duration,
}

impl TransferUnit {
    pub fn new(endpoint: Arc<dyn TransferEndpoint>, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    /// Resolves exactly once. Exceeding the deadline is a failure even if the
    /// endpoint had already consumed every byte.
    pub async fn execute(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<BatchOutcome, TransferError> {
        let token = request.token.clone();
        let file_count = request.file_count();
        debug!(token = %token, file_count, bytes = request.total_bytes(), "transfer unit dispatched");

        match tokio::time::timeout(self.timeout, self.endpoint.upload(request, progress)).await {
            Ok(result) => {
                if let Err(error) = &result {
                    warn!(token = %token, error = %error, "transfer unit failed");
                }
                result
            }
            Err(_) => {
                warn!(token = %token, timeout_secs = self.timeout.as_secs(), "transfer unit timed out");
                Err(TransferError::Timeout(self.timeout))
            }
        }
    }
}
