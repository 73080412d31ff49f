//! HTTP client for the Indico export API.

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, trace, warn};

use super::config::IndicoConfig;
use crate::error::{ProviderError, ProviderResult};

/// Thin wrapper over `reqwest` that maps HTTP outcomes onto
/// [`ProviderError`] codes.
pub struct IndicoClient {
    client: Client,
    config: IndicoConfig,
}

impl IndicoClient {
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn new(config: IndicoConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &IndicoConfig {
        &self.config
    }

    /// Downloads the export body of `event_id` without decoding it.
    pub async fn fetch_raw(&self, event_id: u64) -> ProviderResult<String> {
        let url = self.config.timetable_url(event_id);
        debug!(%url, event_id, "fetching timetable export");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("request failed: {e}")).with_source(e))?;

        Self::handle_response(response, event_id).await
    }

    async fn handle_response(response: Response, event_id: u64) -> ProviderResult<String> {
        let status = response.status();
        trace!(status = %status, "received response");

        match status {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|e| ProviderError::network(format!("failed to read response: {e}"))),
            StatusCode::NOT_FOUND => Err(ProviderError::not_found(format!(
                "no event with id={event_id}"
            ))),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(ProviderError::rate_limited("too many requests to server"))
            }
            s if s.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::server(format!("server error ({s}): {body}")))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %s, body = %body, "unexpected response status");
                Err(ProviderError::invalid_response(format!(
                    "unexpected status {s}: {body}"
                )))
            }
        }
    }
}
