//! `agendawall fetch`: download a timetable export for offline use.
//!
//! The export is written exactly as Indico returned it: plain JSON, not the
//! base64-wrapped dumps older kiosk tooling produced. Such a file is what
//! `serve --timetable-file` reads. Old base64 dumps must be decoded first
//! (`base64 -d old.dump > timetable.json`).

use std::path::Path;
use std::time::Duration;

use tracing::info;

use agendawall_providers::{IndicoConfig, IndicoProvider, parse_timetable};

use crate::cli::FetchArgs;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Downloads the export of the configured (or given) event, checks that it
/// decodes, then saves the raw JSON to `--output` or prints it to stdout.
pub async fn run(args: &FetchArgs, config: &ClientConfig) -> ClientResult<()> {
    let event_id = args.event_id.unwrap_or(config.event.id);
    let host = args.host.as_deref().unwrap_or(&config.event.host);

    let indico = indico_config(host, config)?;
    info!(event_id, url = %indico.timetable_url(event_id), "fetching timetable export");
    let provider = IndicoProvider::new(indico)?;
    let body = provider.fetch_raw(event_id).await?;

    // Refuse to save something `serve` could not load.
    let table = parse_timetable(event_id, &body)?;
    info!(
        event_id,
        days = table.days().len(),
        sessions = table.session_count(),
        "export decoded"
    );

    match args.output {
        Some(ref path) => {
            save_export(path, &body).await?;
            eprintln!("saved timetable-{} to {}", event_id, path.display());
        }
        None => println!("{}", body),
    }
    Ok(())
}

/// Stores `body` verbatim; no re-encoding.
async fn save_export(path: &Path, body: &str) -> ClientResult<()> {
    tokio::fs::write(path, body).await?;
    Ok(())
}

pub(crate) fn indico_config(host: &str, config: &ClientConfig) -> ClientResult<IndicoConfig> {
    IndicoConfig::new(host)
        .map(|indico| indico.with_timeout(Duration::from_secs(config.event.fetch_timeout.max(1))))
        .map_err(|e| ClientError::Config(format!("invalid Indico host '{}': {}", host, e)))
}
