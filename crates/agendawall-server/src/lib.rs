//! Daemon: timetable store, clock driver, broadcast hub, viewer transport.
//!
//! ```text
//! provider ──fetch──► TimetableStore ◄──snapshot── ClockDriver ──publish──► BroadcastHub
//!                         ▲                                                   │ try_send
//!              Refresher ─┘                                                   ▼
//!       (control socket, HTTP, SIGHUP)                           SubscriberSession × N ──► WebSocket
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agendawall_core::{HtmlRenderer, TimeTable};
//! use agendawall_server::{BroadcastHub, ClockConfig, ClockDriver, HubConfig, TimetableStore};
//!
//! # async fn run() {
//! let tz = chrono_tz::Europe::Paris;
//! let store = Arc::new(TimetableStore::new(TimeTable::empty(12779, tz)));
//!
//! let hub = BroadcastHub::new(HubConfig::default());
//! let hub_handle = hub.handle();
//! tokio::spawn(hub.run());
//!
//! let driver = ClockDriver::new(ClockConfig::new(tz), store, Arc::new(HtmlRenderer::new()), hub_handle);
//! tokio::spawn(driver.run());
//! # }
//! ```

mod clock;
mod config;
mod error;
mod handler;
mod http;
mod hub;
mod signals;
mod socket;
mod store;
mod subscriber;

#[cfg(test)]
mod testing;

pub use clock::{
    ClockCommand, ClockConfig, ClockDriver, ClockHandle, ClockMode, ClockState, SharedClockState,
    VirtualClock, simulated_step,
};
pub use config::{
    ControlConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_TIMEOUT, HttpConfig, default_socket_path,
};
pub use error::{ServerError, ServerResult};
pub use handler::{ControlHandler, ServiceContext, make_connection_handler};
pub use http::{render_page, router, serve};
pub use hub::{BroadcastHub, HubConfig, HubError, HubHandle, Payload, SubscriberId, Subscription};
pub use signals::{RefreshRequests, ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, ControlServer};
pub use store::{RefreshReport, Refresher, StoreStats, TimetableStore, TimetableView};
pub use subscriber::{SessionEnd, SinkError, SnapshotSink, SubscriberSession};
