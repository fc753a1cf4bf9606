pub mod endpoint;
pub mod http_endpoint;
pub mod memory;
pub mod progress;
pub mod remote_config;
pub mod unit;

pub use endpoint::{FilePayload, TransferEndpoint, TransferError, TransferRequest, FILE_FIELD};
pub use http_endpoint::{HttpTransferEndpoint, IDEMPOTENCY_KEY};
pub use memory::{InMemoryTransferEndpoint, RecordedRequest, ScriptedResponse};
pub use progress::{progress_channel, ProgressReporter};
pub use remote_config::{fetch_remote_config, load_configuration, ConfigError};
pub use unit::TransferUnit;
