use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ::http::header::HeaderName;
use ::http::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info};
use upqueue_contract::BatchOutcome;

use crate::endpoint::{FilePayload, TransferEndpoint, TransferError, TransferRequest, FILE_FIELD};
use crate::progress::ProgressReporter;

pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

const CHUNK_SIZE: usize = 64 * 1024;

/// Multipart POST endpoint; progress follows the bytes pulled from the
/// request body.
#[derive(Debug, Clone, Default)]
pub struct HttpTransferEndpoint {
    client: reqwest::Client,
}

impl HttpTransferEndpoint {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_form(
        request: &TransferRequest,
        progress: &ProgressReporter,
    ) -> Result<Form, TransferError> {
        let total = request.total_bytes();
        let sent = Arc::new(AtomicU64::new(0));

        let mut form = Form::new()
            .text("batchId", request.token.clone())
            .text("fileCount", request.file_count().to_string());
        if let Some(path) = &request.target.routing_path {
            form = form.text("path", path.clone());
        }

        for file in &request.files {
            let body = counting_body(file, Arc::clone(&sent), total, progress.clone());
            let part = Part::stream_with_length(body, file.data.len() as u64)
                .file_name(file.name.clone())
                .mime_str(&file.media_type)
                .map_err(|e| {
                    TransferError::Transport(format!(
                        "invalid media type {} for {}: {e}",
                        file.media_type, file.name
                    ))
                })?;
            form = form.part(FILE_FIELD, part);
        }
        Ok(form)
    }
}

fn counting_body(
    file: &FilePayload,
    sent: Arc<AtomicU64>,
    total: u64,
    progress: ProgressReporter,
) -> reqwest::Body {
    let data = Arc::clone(&file.data);
    let len = data.len();
    let chunks = stream::iter((0..len).step_by(CHUNK_SIZE)).map(move |start| {
        let end = (start + CHUNK_SIZE).min(len);
        let chunk = data[start..end].to_vec();
        let done = sent.fetch_add(chunk.len() as u64, Ordering::AcqRel) + chunk.len() as u64;
        progress.report_bytes(done, total);
        Ok::<Vec<u8>, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(chunks)
}

fn remote_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("remote endpoint rejected the upload")
                .to_string()
        })
}

fn transport_error(error: reqwest::Error) -> TransferError {
    TransferError::Transport(error.to_string())
}

#[async_trait]
impl TransferEndpoint for HttpTransferEndpoint {
    async fn upload(
        &self,
        request: TransferRequest,
        progress: ProgressReporter,
    ) -> Result<BatchOutcome, TransferError> {
        let form = Self::build_form(&request, &progress)?;

        info!(
            url = %request.target.url,
            token = %request.token,
            file_count = request.file_count(),
            "posting upload"
        );

        let response = self
            .client
            .post(&request.target.url)
            .header(IDEMPOTENCY_KEY, request.token.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(token = %request.token, status = status.as_u16(), "upload response received");

        if !status.is_success() {
            return Err(TransferError::Remote {
                status: status.as_u16(),
                message: remote_message(&body, status),
            });
        }

        progress.report_percent(100);
        Ok(BatchOutcome::from_body(&body))
    }
}
