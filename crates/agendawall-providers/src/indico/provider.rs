//! [`TimetableProvider`] backed by the Indico export API.

use agendawall_core::TimeTable;
use tracing::info;

use super::client::IndicoClient;
use super::config::IndicoConfig;
use super::decode::parse_timetable;
use crate::error::ProviderResult;
use crate::provider::{BoxFuture, TimetableProvider};

pub struct IndicoProvider {
    client: IndicoClient,
}

impl IndicoProvider {
    pub fn new(config: IndicoConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: IndicoClient::new(config)?,
        })
    }

    /// The export body as served, for archiving or offline use.
    pub async fn fetch_raw(&self, event_id: u64) -> ProviderResult<String> {
        self.client
            .fetch_raw(event_id)
            .await
            .map_err(|e| e.with_provider("indico"))
    }
}

impl TimetableProvider for IndicoProvider {
    fn name(&self) -> &str {
        "indico"
    }

    fn fetch(&self, event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>> {
        Box::pin(async move {
            let body = self.fetch_raw(event_id).await?;
            let table = parse_timetable(event_id, &body).map_err(|e| e.with_provider("indico"))?;
            info!(
                event_id,
                host = self.client.config().base_url.host_str().unwrap_or_default(),
                days = table.days().len(),
                "fetched timetable"
            );
            Ok(table)
        })
    }
}
