//! Fixtures shared by the daemon's tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agendawall_core::{Day, HtmlRenderer, Session, TimeSpan, TimeTable};
use agendawall_providers::TimetableProvider;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Europe::Paris;

use crate::clock::{ClockConfig, ClockDriver, ClockMode};
use crate::handler::ServiceContext;
use crate::hub::{BroadcastHub, HubConfig};
use crate::signals::SignalHandler;
use crate::store::{Refresher, TimetableStore};

pub(crate) const EVENT_ID: u64 = 12779;

/// One day, one morning session.
pub(crate) fn sample_table() -> TimeTable {
    let start = Paris.with_ymd_and_hms(2016, 9, 27, 9, 0, 0).unwrap();
    let end = Paris.with_ymd_and_hms(2016, 9, 27, 12, 0, 0).unwrap();
    let session = Session::new(TimeSpan::new("s1", "Plénière", start, end), "Amphi", Vec::new());
    let date = NaiveDate::from_ymd_opt(2016, 9, 27).unwrap();
    TimeTable::new(EVENT_ID, "", Paris, vec![Day::new(date, vec![session])])
}

/// Spawns a hub and a clock around an empty store fed by `provider`.
///
/// The clock ticks hourly so tests drive it by hand.
pub(crate) fn service_context(
    provider: Arc<dyn TimetableProvider>,
    signals: &SignalHandler,
) -> ServiceContext {
    let store = Arc::new(TimetableStore::new(TimeTable::empty(EVENT_ID, Paris)));
    let refresher = Arc::new(Refresher::new(store.clone(), provider, EVENT_ID));

    let hub = BroadcastHub::new(HubConfig::default());
    let hub_handle = hub.handle();
    tokio::spawn(hub.run());

    let config = ClockConfig::new(Paris)
        .with_mode(ClockMode::Simulated {
            start: None,
            end: None,
        })
        .with_tick(Duration::from_secs(3600));
    let driver = ClockDriver::new(
        config,
        store,
        Arc::new(HtmlRenderer::new()),
        hub_handle.clone(),
    );
    let clock = driver.handle();
    tokio::spawn(driver.run());

    ServiceContext {
        started: Instant::now(),
        timezone: Paris,
        refresher,
        clock,
        hub: hub_handle,
        shutdown: signals.shutdown_handle(),
    }
}
