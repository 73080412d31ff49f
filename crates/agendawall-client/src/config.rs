//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/agendawall/config.toml` by default. Every section is optional:
//!
//! ```toml
//! [event]
//! id = 12779
//! host = "indico.in2p3.fr"
//! timezone = "Europe/Paris"
//!
//! [http]
//! addr = ":8080"
//!
//! [clock]
//! mode = "simulated"
//! now = "2016-09-27 08:50:00"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use agendawall_core::{Timestamp, parse_local, parse_zone};
use agendawall_server::{
    ClockConfig, ClockMode, ControlConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_TIMEOUT,
    HttpConfig, default_socket_path,
};

use crate::error::{ClientError, ClientResult};

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the agendawall CLI and daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Which event to show and where to get it.
    pub event: EventSettings,

    /// Display settings.
    pub display: DisplaySettings,

    /// Viewer HTTP settings.
    pub http: HttpSettings,

    /// Virtual clock settings.
    pub clock: ClockSettings,

    /// Viewer session settings.
    pub subscribers: SubscriberSettings,

    /// Control socket settings.
    pub server: ServerSettings,
}

/// Event selection and timetable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Indico event id.
    pub id: u64,

    /// Indico host or base URL.
    pub host: String,

    /// IANA zone the agenda is shown in.
    pub timezone: String,

    /// Serve a saved export instead of fetching from `host`.
    pub timetable_file: Option<PathBuf>,

    /// HTTP timeout for timetable fetches, in seconds.
    pub fetch_timeout: u64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            id: 12779,
            host: "indico.in2p3.fr".to_string(),
            timezone: "Europe/Paris".to_string(),
            timetable_file: None,
            fetch_timeout: 30,
        }
    }
}

/// Display settings for the viewer page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Page title.
    pub title: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            title: "Agenda".to_string(),
        }
    }
}

/// Viewer HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// `host:port`; a bare `:port` listens on every interface.
    pub addr: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How the virtual clock moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockModeSetting {
    #[default]
    Realtime,
    Simulated,
}

/// Virtual clock settings.
///
/// Times are `"YYYY-MM-DD HH:MM:SS"` in the event zone, or RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub mode: ClockModeSetting,

    /// Initial virtual time; the wall clock when unset.
    pub now: Option<String>,

    /// Milliseconds between ticks.
    pub tick_ms: u64,

    /// Simulation lower bound; defaults to the first session start.
    pub sim_start: Option<String>,

    /// Simulation upper bound; defaults to the last session end.
    pub sim_end: Option<String>,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            mode: ClockModeSetting::Realtime,
            now: None,
            tick_ms: 1000,
            sim_start: None,
            sim_end: None,
        }
    }
}

/// Viewer session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSettings {
    /// Snapshots a viewer may fall behind before it is dropped.
    pub queue_capacity: usize,

    /// Seconds a single snapshot write may take before the viewer is dropped.
    pub write_timeout: u64,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT.as_secs(),
        }
    }
}

/// Server/connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Path to the control socket.
    pub socket_path: Option<PathBuf>,

    /// Connection timeout in seconds.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout: 5,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agendawall")
    }

    /// Zone the agenda is shown in.
    pub fn timezone(&self) -> ClientResult<Tz> {
        parse_zone(&self.event.timezone).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Parses a clock setting in the event zone.
    pub fn parse_time(&self, input: &str) -> ClientResult<Timestamp> {
        let tz = self.timezone()?;
        parse_local(input, tz).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn clock_config(&self) -> ClientResult<ClockConfig> {
        let clock = &self.clock;
        if clock.tick_ms == 0 {
            return Err(ClientError::Config("clock.tick_ms must be positive".into()));
        }

        let mode = match clock.mode {
            ClockModeSetting::Realtime => ClockMode::RealTime,
            ClockModeSetting::Simulated => {
                let start = self.optional_time(clock.sim_start.as_deref())?;
                let end = self.optional_time(clock.sim_end.as_deref())?;
                if let (Some(start), Some(end)) = (start, end)
                    && start >= end
                {
                    return Err(ClientError::Config(format!(
                        "clock.sim_start ({start}) must be before clock.sim_end ({end})"
                    )));
                }
                ClockMode::Simulated { start, end }
            }
        };

        let mut config = ClockConfig::new(self.timezone()?)
            .with_mode(mode)
            .with_tick(Duration::from_millis(clock.tick_ms));
        if let Some(now) = self.optional_time(clock.now.as_deref())? {
            config = config.with_start_at(now);
        }
        Ok(config)
    }

    pub fn http_config(&self) -> ClientResult<HttpConfig> {
        Ok(HttpConfig::new(parse_addr(&self.http.addr)?)
            .with_page_title(&self.display.title)
            .with_queue_capacity(self.subscribers.queue_capacity)
            .with_write_timeout(Duration::from_secs(self.subscribers.write_timeout.max(1))))
    }

    /// Control socket path, falling back to the per-user default.
    pub fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path
            .clone()
            .unwrap_or_else(default_socket_path)
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig::new(self.socket_path())
    }

    /// Client-side request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout.max(1))
    }

    /// Checks every setting that is parsed lazily.
    pub fn validate(&self) -> ClientResult<()> {
        self.timezone()?;
        self.clock_config()?;
        self.http_config()?;
        if self.subscribers.queue_capacity == 0 {
            return Err(ClientError::Config(
                "subscribers.queue_capacity must be positive".into(),
            ));
        }
        if let Some(ref path) = self.event.timetable_file
            && !path.exists()
        {
            return Err(ClientError::Config(format!(
                "event.timetable_file {} does not exist",
                path.display()
            )));
        }
        Ok(())
    }

    fn optional_time(&self, input: Option<&str>) -> ClientResult<Option<Timestamp>> {
        input.map(|value| self.parse_time(value)).transpose()
    }
}

/// Parses a listen address; `:8080` means every interface.
pub fn parse_addr(input: &str) -> ClientResult<SocketAddr> {
    let input = input.trim();
    let full = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else {
        input.to_string()
    };
    full.parse()
        .map_err(|e| ClientError::Config(format!("invalid listen address '{input}': {e}")))
}
