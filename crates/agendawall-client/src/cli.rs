//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ClientConfig, ClockModeSetting};

/// agendawall - live agenda wall for conference kiosks
#[derive(Debug, Parser)]
#[command(name = "agendawall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "AGENDAWALL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Path to the control socket
    #[arg(long, env = "AGENDAWALL_SOCKET", global = true)]
    pub socket_path: Option<PathBuf>,

    /// Control request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Folds global overrides into `config`.
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.debug {
            config.debug = true;
        }
        if let Some(ref path) = self.socket_path {
            config.server.socket_path = Some(path.clone());
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout = timeout;
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the kiosk daemon in the foreground
    Serve(ServeArgs),

    /// Refetch the timetable on a running daemon
    Refresh,

    /// Snap the virtual clock back to the wall clock
    Resync,

    /// Move the virtual clock
    SetNow {
        /// "YYYY-MM-DD HH:MM:SS" in the event zone, or RFC 3339
        time: String,
    },

    /// Show daemon status
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the daemon answers
    Ping,

    /// Stop the daemon
    Shutdown,

    /// Download a timetable export
    #[cfg(feature = "indico")]
    Fetch(FetchArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `agendawall serve`; each one overrides config.toml.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// [host]:port for the viewer page
    #[arg(long, env = "AGENDAWALL_ADDR")]
    pub addr: Option<String>,

    /// Indico event id
    #[arg(long, visible_alias = "evtid")]
    pub event_id: Option<u64>,

    /// Indico host or base URL
    #[arg(long)]
    pub host: Option<String>,

    /// Initial agenda time, "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    pub now: Option<String>,

    /// Agenda time zone
    #[arg(long)]
    pub loc: Option<String>,

    /// Replay the event in accelerated time
    #[arg(long)]
    pub simulate: bool,

    /// Milliseconds between clock ticks
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Serve a saved export instead of fetching
    #[arg(long)]
    pub timetable_file: Option<PathBuf>,

    /// Viewer page title
    #[arg(long)]
    pub title: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,
}

impl ServeArgs {
    /// Folds the flags into `config`.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(ref addr) = self.addr {
            config.http.addr = addr.clone();
        }
        if let Some(id) = self.event_id {
            config.event.id = id;
        }
        if let Some(ref host) = self.host {
            config.event.host = host.clone();
        }
        if let Some(ref now) = self.now {
            config.clock.now = Some(now.clone());
        }
        if let Some(ref loc) = self.loc {
            config.event.timezone = loc.clone();
        }
        if self.simulate {
            config.clock.mode = ClockModeSetting::Simulated;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.clock.tick_ms = tick_ms;
        }
        if let Some(ref path) = self.timetable_file {
            config.event.timetable_file = Some(path.clone());
        }
        if let Some(ref title) = self.title {
            config.display.title = title.clone();
        }
    }
}

/// Flags for `agendawall fetch`.
#[cfg(feature = "indico")]
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Indico event id
    #[arg(long, visible_alias = "id")]
    pub event_id: Option<u64>,

    /// Indico host or base URL
    #[arg(long)]
    pub host: Option<String>,

    /// Write the raw JSON export here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_override_config() {
        let cli = Cli::try_parse_from([
            "agendawall",
            "serve",
            "--addr",
            ":80",
            "--evtid",
            "42",
            "--now",
            "2016-09-27 10:00:00",
            "--loc",
            "UTC",
            "--simulate",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut config = ClientConfig::default();
        args.apply(&mut config);
        assert_eq!(config.http.addr, ":80");
        assert_eq!(config.event.id, 42);
        assert_eq!(config.event.timezone, "UTC");
        assert_eq!(config.clock.now.as_deref(), Some("2016-09-27 10:00:00"));
        assert_eq!(config.clock.mode, ClockModeSetting::Simulated);
    }

    #[test]
    fn unset_flags_keep_config() {
        let mut config = ClientConfig::default();
        config.event.id = 7;
        ServeArgs::default().apply(&mut config);
        assert_eq!(config.event.id, 7);
        assert_eq!(config.clock.mode, ClockModeSetting::Realtime);
    }

    #[test]
    fn global_socket_path_after_subcommand() {
        let cli = Cli::try_parse_from(["agendawall", "status", "--json", "--socket-path", "/tmp/k.sock"])
            .unwrap();
        assert!(matches!(cli.command, Command::Status { json: true }));

        let mut config = ClientConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.socket_path, Some(PathBuf::from("/tmp/k.sock")));
    }

    #[test]
    fn set_now_takes_a_positional_time() {
        let cli = Cli::try_parse_from(["agendawall", "set-now", "2016-09-27 10:00:00"]).unwrap();
        let Command::SetNow { time } = cli.command else {
            panic!("expected set-now");
        };
        assert_eq!(time, "2016-09-27 10:00:00");
    }
}
