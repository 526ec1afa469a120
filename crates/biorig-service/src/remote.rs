//! Remote store client and connectivity probe.
//!
//! The remote store exposes a REST batch-insert endpoint per table
//! (`POST {base}/rest/v1/{table}` with a JSON array body). A batch counts
//! as accepted if and only if the response status is 2xx; there is no
//! partial-success interpretation. Both the probe and the upload carry
//! explicit timeouts so a dead uplink can never hold a sync cycle open.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::RemoteConfig;

/// HTTP client for the remote store.
pub struct RemoteClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RemoteClient {
    /// Create a client with the given per-request upload timeout.
    pub fn new(config: &RemoteConfig, upload_timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(upload_timeout)
            .build()
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// The batch-insert URL for a table.
    pub fn insert_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Upload one ordered batch of rows to a table.
    ///
    /// Success means the remote confirmed insertion of every submitted
    /// row; any non-2xx status or transport failure leaves the batch
    /// unconfirmed.
    pub async fn insert_batch(
        &self,
        table: &str,
        rows: &[serde_json::Value],
    ) -> Result<(), RemoteError> {
        let response = self
            .http
            .post(self.insert_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Response { status, body });
        }

        debug!("Remote accepted {} row(s) into {}", rows.len(), table);
        Ok(())
    }

    /// Lightweight reachability check against a known endpoint.
    ///
    /// Fails closed: any transport error or timeout counts as offline. An
    /// HTTP error status still proves the uplink works.
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.http.get(url).timeout(timeout).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Errors from the remote store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote request failed: {0}")]
    Request(String),
    #[error("Remote store returned error {status}: {body}")]
    Response { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> RemoteClient {
        let config = RemoteConfig {
            base_url: base_url.to_string(),
            api_key: "key".to_string(),
            ..RemoteConfig::default()
        };
        RemoteClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_insert_url() {
        let remote = client("https://example.supabase.co");
        assert_eq!(
            remote.insert_url("sensor_data"),
            "https://example.supabase.co/rest/v1/sensor_data"
        );
    }

    #[test]
    fn test_insert_url_trims_trailing_slash() {
        let remote = client("https://example.supabase.co/");
        assert_eq!(
            remote.insert_url("temp_setting"),
            "https://example.supabase.co/rest/v1/temp_setting"
        );
    }
}
