//! Core types: timetable model, agenda projection, rendering, tracing

pub mod agenda;
pub mod render;
pub mod time;
pub mod timetable;
pub mod tracing;

pub use agenda::{AgendaSnapshot, ContributionView, PresenterView, SessionView, project};
pub use render::{HtmlRenderer, JsonRenderer, RenderError, Renderer, html_escape};
pub use time::{TimeParseError, TimeSpan, Timestamp, parse_local, parse_zone};
pub use timetable::{Contribution, Day, Presenter, Session, TimeTable};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
