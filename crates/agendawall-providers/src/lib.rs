//! TimetableProvider trait and implementations.
//!
//! - [`TimetableProvider`]: fetch a normalized timetable for an event id
//! - [`IndicoProvider`]: the Indico export API (feature `indico`)
//! - [`FileProvider`]: a saved export on disk
//! - [`StaticProvider`], [`ErrorProvider`]: in-memory sources
//!
//! ```text
//! Indico export JSON ──► parse_timetable() ──► TimeTable ──► store swap
//! ```

pub mod error;
pub mod file;
pub mod indico;
pub mod provider;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use file::FileProvider;
#[cfg(feature = "indico")]
pub use indico::IndicoProvider;
pub use indico::{IndicoConfig, parse_timetable};
pub use provider::{BoxFuture, ErrorProvider, StaticProvider, TimetableProvider};
