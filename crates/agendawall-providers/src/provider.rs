//! The [`TimetableProvider`] trait and in-memory implementations.
//!
//! A provider turns an event id into a normalized [`TimeTable`] or fails.
//! It never touches the timetable store: the caller decides whether and
//! when to swap the result in.

use std::future::Future;
use std::pin::Pin;

use agendawall_core::TimeTable;

use crate::error::{ProviderError, ProviderResult};

/// A boxed future, so the trait stays object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of timetables.
///
/// ```ignore
/// impl TimetableProvider for MyProvider {
///     fn name(&self) -> &str { "mine" }
///
///     fn fetch(&self, event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>> {
///         Box::pin(async move { self.load(event_id).await })
///     }
/// }
/// ```
pub trait TimetableProvider: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Fetches and normalizes the timetable of `event_id`.
    ///
    /// # Errors
    ///
    /// Network, decoding and not-found failures; see
    /// [`ProviderErrorCode`](crate::ProviderErrorCode).
    fn fetch(&self, event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>>;
}

/// Serves a timetable held in memory.
#[derive(Debug)]
pub struct StaticProvider {
    table: TimeTable,
}

impl StaticProvider {
    pub fn new(table: TimeTable) -> Self {
        Self { table }
    }
}

impl TimetableProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>> {
        let table = self.table.clone();
        Box::pin(async move {
            if table.event_id() == event_id {
                Ok(table)
            } else {
                Err(ProviderError::not_found(format!("no event with id={event_id}"))
                    .with_provider("static"))
            }
        })
    }
}

/// A provider that always fails with the same error.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    error: ProviderError,
}

impl ErrorProvider {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

impl TimetableProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _event_id: u64) -> BoxFuture<'_, ProviderResult<TimeTable>> {
        let error = self.error.duplicate().with_provider(&self.name);
        Box::pin(async move { Err(error) })
    }
}
