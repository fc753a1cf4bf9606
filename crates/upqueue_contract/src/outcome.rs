use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-file result as reported by the ingestion endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileOutcome {
    pub success: bool,
    pub location: Option<String>,
    pub error: Option<String>,
}

impl FileOutcome {
    fn from_value(value: &Value, default_success: bool) -> Self {
        let success = match value.get("success") {
            Some(flag) => truthy(flag),
            None => default_success,
        };
        Self {
            success,
            location: first_text(value, &["url", "file_url"]),
            error: first_text(value, &["error", "message"]),
        }
    }
}

/// Normalized response body of a transfer request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// One outcome per packed file, aligned by packing order.
    StructuredResults { outcomes: Vec<FileOutcome> },
    /// A single-file shaped body that applies to every packed file.
    UniformOutcome { outcome: FileOutcome },
}

impl BatchOutcome {
    /// Resolves the body shape once. A `results` array selects the structured
    /// form, where a missing `success` flag counts as failure; anything else
    /// is treated as a uniform success unless it says `success: false`.
    pub fn from_value(body: &Value) -> Self {
        match body.get("results").and_then(Value::as_array) {
            Some(results) => Self::StructuredResults {
                outcomes: results
                    .iter()
                    .map(|item| FileOutcome::from_value(item, false))
                    .collect(),
            },
            None => Self::UniformOutcome {
                outcome: FileOutcome::from_value(body, true),
            },
        }
    }

    pub fn from_body(body: &str) -> Self {
        let value = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        Self::from_value(&value)
    }
}

fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
