//! Indico timetable export.
//!
//! [`parse_timetable`] decodes an export body and is always available;
//! the HTTP side ([`IndicoProvider`]) requires the `indico` feature.

#[cfg(feature = "indico")]
mod client;
mod config;
mod decode;
#[cfg(feature = "indico")]
mod provider;
mod raw;

#[cfg(feature = "indico")]
pub use client::IndicoClient;
pub use config::IndicoConfig;
pub use decode::parse_timetable;
#[cfg(feature = "indico")]
pub use provider::IndicoProvider;
