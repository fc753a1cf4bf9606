use thiserror::Error;
use tracing::{info, warn};
use upqueue_contract::{QueueConfiguration, RemoteConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to reach configuration endpoint: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("configuration endpoint answered with status {0}")]
    Status(u16),
    #[error("configuration document is not valid: {0}")]
    Decode(#[source] reqwest::Error),
}

pub async fn fetch_remote_config(
    client: &reqwest::Client,
    url: &str,
) -> Result<RemoteConfig, ConfigError> {
    let response = client.get(url).send().await.map_err(ConfigError::Fetch)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ConfigError::Status(status.as_u16()));
    }
    response.json::<RemoteConfig>().await.map_err(ConfigError::Decode)
}

/// Overlays the remote document on `base`. Any failure keeps `base` as-is,
/// and so does a merged result that would not validate.
pub async fn load_configuration(
    client: &reqwest::Client,
    url: Option<&str>,
    base: QueueConfiguration,
) -> QueueConfiguration {
    let Some(url) = url else {
        return base;
    };

    match fetch_remote_config(client, url).await {
        Ok(remote) => {
            let mut merged = base.clone();
            merged.apply_remote(&remote);
            match merged.validate() {
                Ok(()) => {
                    info!(url = %url, "remote queue configuration applied");
                    merged
                }
                Err(error) => {
                    warn!(url = %url, error = %error, "remote configuration rejected, using local defaults");
                    base
                }
            }
        }
        Err(error) => {
            warn!(url = %url, error = %error, "remote configuration unavailable, using local defaults");
            base
        }
    }
}
