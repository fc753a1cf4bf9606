use std::collections::BTreeSet;
use std::time::Duration;

use mime::Mime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_ENTRIES: usize = 10;
pub const DEFAULT_MAX_ENTRY_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 3;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TRANSFER_URL: &str = "http://127.0.0.1:8080/api/upload";
pub const DEFAULT_ALLOWED_MEDIA_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid queue configuration: {0}")]
pub struct InvalidConfiguration(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferTarget {
    pub url: String,
    #[serde(default)]
    pub routing_path: Option<String>,
}

impl Default for TransferTarget {
    fn default() -> Self {
        Self {
            url: DEFAULT_TRANSFER_URL.to_string(),
            routing_path: None,
        }
    }
}

/// Session-wide admission and transfer policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfiguration {
    pub max_entries: usize,
    pub max_entry_size_bytes: u64,
    pub allowed_media_types: BTreeSet<String>,
    pub max_concurrent_transfers: usize,
    pub batching_enabled: bool,
    pub max_batch_size: usize,
    pub transfer_timeout_secs: u64,
    pub transfer_target: TransferTarget,
}

impl Default for QueueConfiguration {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_size_bytes: DEFAULT_MAX_ENTRY_SIZE_BYTES,
            allowed_media_types: DEFAULT_ALLOWED_MEDIA_TYPES
                .iter()
                .map(|media_type| media_type.to_string())
                .collect(),
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
            batching_enabled: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT_SECS,
            transfer_target: TransferTarget::default(),
        }
    }
}

impl QueueConfiguration {
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), InvalidConfiguration> {
        if self.max_concurrent_transfers == 0 {
            return Err(InvalidConfiguration(
                "max_concurrent_transfers must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(InvalidConfiguration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.transfer_timeout_secs == 0 {
            return Err(InvalidConfiguration(
                "transfer_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.transfer_target.url.trim().is_empty() {
            return Err(InvalidConfiguration(
                "transfer_target.url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Matches a declared media type against the allow-list. Entries of the
    /// form `type/*` accept any subtype.
    pub fn allows_media_type(&self, media_type: &str) -> bool {
        let Ok(candidate) = media_type.trim().parse::<Mime>() else {
            return false;
        };

        self.allowed_media_types.iter().any(|allowed| {
            match allowed.trim().parse::<Mime>() {
                Ok(pattern) if pattern.subtype() == mime::STAR => {
                    pattern.type_() == candidate.type_()
                }
                Ok(pattern) => pattern.essence_str() == candidate.essence_str(),
                Err(_) => allowed.trim().eq_ignore_ascii_case(candidate.essence_str()),
            }
        })
    }

    pub fn allowed_media_types_label(&self) -> String {
        self.allowed_media_types
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Overlays the fields a remote configuration actually supplied. Unusable
    /// values (zero, negative, unparsable) leave the current value in place.
    pub fn apply_remote(&mut self, remote: &RemoteConfig) {
        if let Some(max_files) = remote.max_files.as_ref().and_then(LooseNumber::positive) {
            self.max_entries = max_files as usize;
        }
        if let Some(max_size) = remote
            .max_file_size
            .as_ref()
            .and_then(LooseNumber::positive)
        {
            self.max_entry_size_bytes = max_size;
        }
        if let Some(types) = remote.allowed_types.as_ref() {
            let types = types.to_set();
            if !types.is_empty() {
                self.allowed_media_types = types;
            }
        }
        if let Some(url) = remote.webhook_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                self.transfer_target.url = url.to_string();
            }
        }
        if let Some(path) = remote.webhook_path.as_deref().map(str::trim) {
            if !path.is_empty() {
                self.transfer_target.routing_path = Some(path.to_string());
            }
        }
        if let Some(enabled) = remote.enable_batching {
            self.batching_enabled = enabled;
        }
        if let Some(batch_size) = remote.batch_size.as_ref().and_then(LooseNumber::positive) {
            self.max_batch_size = batch_size as usize;
        }
    }
}

/// Configuration document served by the remote configuration endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub max_files: Option<LooseNumber>,
    #[serde(default)]
    pub max_file_size: Option<LooseNumber>,
    #[serde(default)]
    pub allowed_types: Option<MediaTypeList>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_path: Option<String>,
    #[serde(default)]
    pub enable_batching: Option<bool>,
    #[serde(default)]
    pub batch_size: Option<LooseNumber>,
}

/// A number that may arrive as JSON number or as numeric text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LooseNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LooseNumber {
    pub fn positive(&self) -> Option<u64> {
        let value = match self {
            Self::Integer(value) => *value as f64,
            Self::Float(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        if value.is_finite() && value >= 1.0 {
            Some(value.trunc() as u64)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MediaTypeList {
    List(Vec<String>),
    Joined(String),
}

impl MediaTypeList {
    pub fn to_set(&self) -> BTreeSet<String> {
        let items: Vec<&str> = match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Joined(joined) => joined.split(',').collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    }
}
