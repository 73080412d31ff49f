//! Request and response types of the control protocol.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Wraps every message with a version and a correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub protocol_version: String,
    pub request_id: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Operator requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check.
    Ping,

    /// Daemon, timetable, hub and clock state.
    Status,

    /// Fetch the timetable again and swap it in; answered once the swap
    /// happened or the fetch failed.
    RefreshTimetable,

    /// Put the virtual clock back on wall-clock time.
    ResyncClock,

    /// Override the virtual clock.
    SetNow { now: DateTime<FixedOffset> },

    /// Stop the daemon.
    Shutdown,
}

impl Request {
    pub fn set_now(now: DateTime<FixedOffset>) -> Self {
        Self::SetNow { now }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Status => "status",
            Self::RefreshTimetable => "refresh_timetable",
            Self::ResyncClock => "resync_clock",
            Self::SetNow { .. } => "set_now",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Daemon answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    Status(StatusInfo),

    /// A refresh succeeded; `version` is the store version now serving.
    Refreshed {
        event_id: u64,
        version: u64,
        day_count: usize,
        session_count: usize,
    },

    /// The request was accepted.
    Ok,

    Error(ErrorResponse),
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse::new(code, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// How the daemon's virtual clock advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockModeInfo {
    RealTime,
    Simulated,
}

impl ClockModeInfo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealTime => "real_time",
            Self::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub uptime_seconds: u64,

    pub event_id: u64,

    /// Incremented on every successful swap; 0 means "nothing loaded yet".
    pub timetable_version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_error: Option<String>,

    /// The last refresh failed transiently; retrying may succeed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub last_refresh_retryable: bool,

    pub subscribers: usize,

    /// Virtual "now" as of the last tick, in the event zone.
    pub virtual_now: DateTime<FixedOffset>,

    pub clock_mode: ClockModeInfo,

    pub ticks: u64,

    pub skipped_ticks: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    /// Fetching the timetable failed; the previous one keeps serving.
    ProviderError,
    NotFound,
    /// A component (clock, hub) has stopped.
    Unavailable,
    ShuttingDown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalError => "internal_error",
            Self::InvalidRequest => "invalid_request",
            Self::ProviderError => "provider_error",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::ShuttingDown => "shutting_down",
        }
    }
}
