use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use upqueue_contract::{BatchOutcome, QueueConfiguration, TransferTarget};
use upqueue_transfer::{
    fetch_remote_config, load_configuration, progress_channel, ConfigError, FilePayload,
    HttpTransferEndpoint, TransferEndpoint, TransferError, TransferRequest,
};

#[derive(Debug, Default, Clone)]
struct Observed {
    idempotency_key: Option<String>,
    batch_id: Option<String>,
    file_count: Option<String>,
    path: Option<String>,
    files: Vec<(String, usize)>,
}

type Shared = Arc<Mutex<Vec<Observed>>>;

async fn ingest(
    State(seen): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut observed = Observed {
        idempotency_key: headers
            .get("idempotency-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ..Observed::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        match name.as_str() {
            "files" => {
                let bytes = field.bytes().await.expect("file bytes");
                observed
                    .files
                    .push((file_name.unwrap_or_default(), bytes.len()));
            }
            "batchId" => observed.batch_id = field.text().await.ok(),
            "fileCount" => observed.file_count = field.text().await.ok(),
            "path" => observed.path = field.text().await.ok(),
            _ => {}
        }
    }

    let results: Vec<Value> = observed
        .files
        .iter()
        .enumerate()
        .map(|(index, (name, _))| {
            json!({ "success": true, "url": format!("https://cdn.test/{name}"), "index": index })
        })
        .collect();
    seen.lock().await.push(observed);
    Json(json!({ "results": results }))
}

async fn reject() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INSUFFICIENT_STORAGE,
        Json(json!({ "error": "disk full" })),
    )
}

async fn remote_config() -> Json<Value> {
    Json(json!({
        "maxFiles": "4",
        "maxFileSize": 2048,
        "allowedTypes": "image/png, application/pdf",
        "webhookUrl": "http://127.0.0.1:9/ingest",
        "webhookPath": "inbox",
        "enableBatching": true,
        "batchSize": 2
    }))
}

async fn config_unavailable() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "maintenance" })),
    )
}

async fn config_garbled() -> &'static str {
    "maxFiles=4"
}

async fn serve() -> (String, Shared) {
    let seen: Shared = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/upload", post(ingest))
        .route("/full", post(reject))
        .route("/config", get(remote_config))
        .route("/config-down", get(config_unavailable))
        .route("/config-garbled", get(config_garbled))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    (format!("http://{addr}"), seen)
}

fn payload(id: &str, name: &str, size: usize) -> FilePayload {
    FilePayload {
        entry_id: id.to_string(),
        name: name.to_string(),
        media_type: "image/png".to_string(),
        data: Arc::new(vec![7; size]),
    }
}

#[tokio::test]
async fn batch_is_packed_under_one_field() {
    let (base, seen) = serve().await;
    let endpoint = HttpTransferEndpoint::default();
    let request = TransferRequest {
        token: "batch-42".to_string(),
        target: TransferTarget {
            url: format!("{base}/upload"),
            routing_path: Some("inbox".to_string()),
        },
        files: vec![
            payload("a", "a.png", 200_000),
            payload("b", "b.png", 10),
            payload("c", "c.png", 0),
        ],
    };

    let (reporter, mut rx) = progress_channel();
    let outcome = endpoint
        .upload(request, reporter)
        .await
        .expect("upload succeeds");

    let BatchOutcome::StructuredResults { outcomes } = outcome else {
        panic!("expected structured results");
    };
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[1].location.as_deref(), Some("https://cdn.test/b.png"));

    let observed = seen.lock().await.clone();
    assert_eq!(observed.len(), 1);
    let observed = &observed[0];
    assert_eq!(observed.idempotency_key.as_deref(), Some("batch-42"));
    assert_eq!(observed.batch_id.as_deref(), Some("batch-42"));
    assert_eq!(observed.file_count.as_deref(), Some("3"));
    assert_eq!(observed.path.as_deref(), Some("inbox"));
    assert_eq!(
        observed.files,
        vec![
            ("a.png".to_string(), 200_000),
            ("b.png".to_string(), 10),
            ("c.png".to_string(), 0)
        ]
    );

    let mut last = 0;
    while let Ok(percent) = rx.try_recv() {
        assert!(percent > last);
        last = percent;
    }
    assert_eq!(last, 100);
}

#[tokio::test]
async fn non_success_status_is_a_remote_error() {
    let (base, _seen) = serve().await;
    let endpoint = HttpTransferEndpoint::default();
    let request = TransferRequest {
        token: "entry-1".to_string(),
        target: TransferTarget {
            url: format!("{base}/full"),
            routing_path: None,
        },
        files: vec![payload("entry-1", "a.png", 16)],
    };

    let (reporter, _rx) = progress_channel();
    let error = endpoint
        .upload(request, reporter)
        .await
        .expect_err("upload rejected");

    assert_eq!(
        error,
        TransferError::Remote {
            status: 507,
            message: "disk full".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_target_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let endpoint = HttpTransferEndpoint::default();
    let request = TransferRequest {
        token: "entry-1".to_string(),
        target: TransferTarget {
            url: format!("http://{addr}/upload"),
            routing_path: None,
        },
        files: vec![payload("entry-1", "a.png", 16)],
    };

    let (reporter, _rx) = progress_channel();
    let error = endpoint
        .upload(request, reporter)
        .await
        .expect_err("nothing listening");
    assert!(matches!(error, TransferError::Transport(_)));
}

#[tokio::test]
async fn remote_config_overlays_local_values() {
    let (base, _seen) = serve().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/config");

    let config = load_configuration(&client, Some(&url), QueueConfiguration::default()).await;

    assert_eq!(config.max_entries, 4);
    assert_eq!(config.max_entry_size_bytes, 2048);
    assert!(config.allows_media_type("application/pdf"));
    assert!(!config.allows_media_type("image/jpeg"));
    assert_eq!(config.transfer_target.url, "http://127.0.0.1:9/ingest");
    assert_eq!(config.transfer_target.routing_path.as_deref(), Some("inbox"));
    assert!(config.batching_enabled);
    assert_eq!(config.max_batch_size, 2);
    assert_eq!(
        config.max_concurrent_transfers,
        QueueConfiguration::default().max_concurrent_transfers
    );
}

#[tokio::test]
async fn failed_status_keeps_local_config() {
    let (base, _seen) = serve().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/config-down");

    let error = fetch_remote_config(&client, &url)
        .await
        .expect_err("status 503");
    assert!(matches!(error, ConfigError::Status(503)));

    let local = QueueConfiguration {
        max_entries: 7,
        ..QueueConfiguration::default()
    };
    let config = load_configuration(&client, Some(&url), local.clone()).await;
    assert_eq!(config, local);
}

#[tokio::test]
async fn undecodable_document_keeps_local_config() {
    let (base, _seen) = serve().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/config-garbled");

    let error = fetch_remote_config(&client, &url)
        .await
        .expect_err("not json");
    assert!(matches!(error, ConfigError::Decode(_)));

    let config = load_configuration(&client, Some(&url), QueueConfiguration::default()).await;
    assert_eq!(config, QueueConfiguration::default());
}

#[tokio::test]
async fn unreachable_config_endpoint_keeps_local_config() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/config");
    let error = fetch_remote_config(&client, &url)
        .await
        .expect_err("nothing listening");
    assert!(matches!(error, ConfigError::Fetch(_)));

    let config = load_configuration(&client, Some(&url), QueueConfiguration::default()).await;
    assert_eq!(config, QueueConfiguration::default());
}

#[tokio::test]
async fn merged_config_that_fails_validation_is_discarded() {
    let (base, _seen) = serve().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/config");

    // The document never sets the concurrency limit, so the merge stays invalid.
    let local = QueueConfiguration {
        max_concurrent_transfers: 0,
        ..QueueConfiguration::default()
    };
    let config = load_configuration(&client, Some(&url), local.clone()).await;
    assert_eq!(config, local);
    assert_eq!(config.max_entries, QueueConfiguration::default().max_entries);
}

#[tokio::test]
async fn no_config_url_returns_local_config() {
    let client = reqwest::Client::new();
    let local = QueueConfiguration {
        batching_enabled: true,
        ..QueueConfiguration::default()
    };
    assert_eq!(load_configuration(&client, None, local.clone()).await, local);
}
