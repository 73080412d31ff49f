//! Versioned timetable store and the fetch-then-swap refresh path.
//!
//! The store holds exactly one [`TimeTable`] at a time. Readers take a
//! [`TimetableView`] for the length of one projection; a refresh fetches
//! outside the lock and only takes the write lock for the swap, so readers
//! see either the old tree or the new one, never a mix.

use std::ops::Deref;
use std::sync::Arc;

use agendawall_core::TimeTable;
use agendawall_providers::{ProviderError, TimetableProvider};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Slot {
    /// 0 until the first successful swap.
    version: u64,
    table: TimeTable,
    last_refresh: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_retryable: bool,
}

/// Holds the timetable currently being served.
#[derive(Debug)]
pub struct TimetableStore {
    slot: RwLock<Slot>,
}

/// Read-locked view of the served timetable.
///
/// Holding a view blocks the next swap; drop it once the projection is done.
pub struct TimetableView<'a> {
    guard: RwLockReadGuard<'a, Slot>,
}

impl TimetableView<'_> {
    pub fn version(&self) -> u64 {
        self.guard.version
    }
}

impl Deref for TimetableView<'_> {
    type Target = TimeTable;

    fn deref(&self) -> &TimeTable {
        &self.guard.table
    }
}

/// Bookkeeping reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub version: u64,
    pub event_id: u64,
    pub day_count: usize,
    pub session_count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// The last failure was transient; asking again may succeed.
    pub last_error_retryable: bool,
}

impl TimetableStore {
    /// Creates a store serving `initial` at version 0.
    pub fn new(initial: TimeTable) -> Self {
        Self {
            slot: RwLock::new(Slot {
                version: 0,
                table: initial,
                last_refresh: None,
                last_error: None,
                last_error_retryable: false,
            }),
        }
    }

    pub async fn snapshot(&self) -> TimetableView<'_> {
        TimetableView {
            guard: self.slot.read().await,
        }
    }

    /// Swaps in `table` and returns the new version.
    pub async fn replace(&self, table: TimeTable) -> u64 {
        let mut slot = self.slot.write().await;
        slot.version += 1;
        slot.table = table;
        slot.last_refresh = Some(Utc::now());
        slot.last_error = None;
        slot.last_error_retryable = false;
        slot.version
    }

    /// Remembers a failed refresh; the served table is left alone.
    pub async fn record_failure(&self, error: &ProviderError) {
        let mut slot = self.slot.write().await;
        slot.last_error = Some(error.to_string());
        slot.last_error_retryable = error.is_retryable();
    }

    pub async fn stats(&self) -> StoreStats {
        let slot = self.slot.read().await;
        StoreStats {
            version: slot.version,
            event_id: slot.table.event_id(),
            day_count: slot.table.days().len(),
            session_count: slot.table.session_count(),
            last_refresh: slot.last_refresh,
            last_error: slot.last_error.clone(),
            last_error_retryable: slot.last_error_retryable,
        }
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub event_id: u64,
    pub version: u64,
    pub day_count: usize,
    pub session_count: usize,
}

/// Fetches the configured event and swaps it into the store.
pub struct Refresher {
    store: Arc<TimetableStore>,
    provider: Arc<dyn TimetableProvider>,
    event_id: u64,
    /// Serializes refreshes so two triggers never race their swaps.
    in_flight: Mutex<()>,
}

impl Refresher {
    pub fn new(
        store: Arc<TimetableStore>,
        provider: Arc<dyn TimetableProvider>,
        event_id: u64,
    ) -> Self {
        Self {
            store,
            provider,
            event_id,
            in_flight: Mutex::new(()),
        }
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn store(&self) -> &Arc<TimetableStore> {
        &self.store
    }

    /// Fetches the timetable and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns the provider error; the previous timetable keeps serving.
    pub async fn refresh(&self) -> Result<RefreshReport, ProviderError> {
        let _guard = self.in_flight.lock().await;
        debug!(
            provider = self.provider.name(),
            event_id = self.event_id,
            "refreshing timetable"
        );

        let table = match self.provider.fetch(self.event_id).await {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    error = %e,
                    event_id = self.event_id,
                    retryable = e.is_retryable(),
                    "timetable refresh failed"
                );
                self.store.record_failure(&e).await;
                return Err(e);
            }
        };

        let day_count = table.days().len();
        let session_count = table.session_count();
        let version = self.store.replace(table).await;
        info!(
            event_id = self.event_id,
            version, day_count, session_count, "timetable refreshed"
        );

        Ok(RefreshReport {
            event_id: self.event_id,
            version,
            day_count,
            session_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agendawall_core::{Day, Session, TimeSpan};
    use agendawall_providers::{ErrorProvider, ProviderErrorCode, StaticProvider};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Paris;

    /// One day whose session ids all carry `tag`.
    fn tagged_table(tag: &str, sessions: u32) -> TimeTable {
        let sessions = (0..sessions)
            .map(|i| {
                let start = Paris.with_ymd_and_hms(2016, 9, 27, 8 + i, 0, 0).unwrap();
                let end = Paris.with_ymd_and_hms(2016, 9, 27, 9 + i, 0, 0).unwrap();
                Session::new(
                    TimeSpan::new(format!("{tag}-{i}"), "Session", start, end),
                    "Amphi",
                    Vec::new(),
                )
            })
            .collect();
        let date = NaiveDate::from_ymd_opt(2016, 9, 27).unwrap();
        TimeTable::new(12779, "", Paris, vec![Day::new(date, sessions)])
    }

    #[tokio::test]
    async fn replace_bumps_version() {
        let store = TimetableStore::new(TimeTable::empty(12779, Paris));
        assert_eq!(store.snapshot().await.version(), 0);

        assert_eq!(store.replace(tagged_table("a", 2)).await, 1);
        assert_eq!(store.replace(tagged_table("b", 3)).await, 2);

        let view = store.snapshot().await;
        assert_eq!(view.version(), 2);
        assert_eq!(view.session_count(), 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_table() {
        let store = Arc::new(TimetableStore::new(TimeTable::empty(12779, Paris)));
        store.replace(tagged_table("good", 2)).await;

        let refresher = Refresher::new(
            store.clone(),
            Arc::new(ErrorProvider::new("indico", ProviderError::network("timeout"))),
            12779,
        );
        let err = refresher.refresh().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::NetworkError);

        let stats = store.stats().await;
        assert_eq!(stats.version, 1);
        assert_eq!(stats.session_count, 2);
        assert!(stats.last_error.unwrap().contains("timeout"));
        assert!(stats.last_error_retryable);
        assert_eq!(store.snapshot().await.days()[0].sessions()[0].span().id, "good-0");
    }

    #[tokio::test]
    async fn successful_refresh_reports_and_clears_error() {
        let store = Arc::new(TimetableStore::new(TimeTable::empty(12779, Paris)));
        store
            .record_failure(&ProviderError::network("earlier failure"))
            .await;
        assert!(store.stats().await.last_error_retryable);

        let provider = Arc::new(StaticProvider::new(tagged_table("v1", 4)));
        let refresher = Refresher::new(store.clone(), provider, 12779);
        let report = refresher.refresh().await.unwrap();
        assert_eq!(
            report,
            RefreshReport {
                event_id: 12779,
                version: 1,
                day_count: 1,
                session_count: 4,
            }
        );

        let stats = store.stats().await;
        assert!(stats.last_error.is_none());
        assert!(!stats.last_error_retryable);
        assert!(stats.last_refresh.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_mixed_versions() {
        let store = Arc::new(TimetableStore::new(tagged_table("v0", 6)));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for v in 1..=50 {
                    store.replace(tagged_table(&format!("v{v}"), 6)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let view = store.snapshot().await;
                        let ids: Vec<_> = view.days()[0]
                            .sessions()
                            .iter()
                            .map(|s| s.span().id.clone())
                            .collect();
                        let tag = format!("v{}-", view.version());
                        assert!(ids.iter().all(|id| id.starts_with(&tag)), "{ids:?}");
                        drop(view);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
