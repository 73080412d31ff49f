//! [`TimetableProvider`] reading a saved Indico export from disk.
//!
//! Lets a kiosk run without network access, from a body previously saved
//! with `agendawall fetch`.

use std::path::{Path, PathBuf};

use agendawall_core::TimeTable;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::indico::parse_timetable;
use crate::provider::{BoxFuture, TimetableProvider};

#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TimetableProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self, event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>> {
        Box::pin(async move {
            debug!(path = %self.path.display(), event_id, "reading timetable export");
            let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                ProviderError::configuration(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                ))
                .with_provider("file")
                .with_source(e)
            })?;
            parse_timetable(event_id, &body).map_err(|e| e.with_provider("file"))
        })
    }
}
