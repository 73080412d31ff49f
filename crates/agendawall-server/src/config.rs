//! Daemon configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of a viewer's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Per-write deadline for viewer sockets.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Control socket configuration.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub socket_path: PathBuf,

    /// Per-read and per-write timeout on a control connection.
    pub connection_timeout: Duration,

    /// Maximum concurrent control connections.
    pub max_connections: usize,

    /// Whether to remove a socket file nobody answers on before binding.
    pub cleanup_stale_socket: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connection_timeout: Duration::from_secs(30),
            max_connections: 16,
            cleanup_stale_socket: true,
        }
    }
}

impl ControlConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Viewer-facing HTTP configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub addr: SocketAddr,

    /// Title embedded in the viewer page.
    pub page_title: String,

    /// Outbound queue capacity of every viewer session.
    pub queue_capacity: usize,

    /// Longest a single snapshot write to a viewer may take.
    pub write_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            page_title: "Agenda".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl HttpConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    pub fn with_page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = title.into();
        self
    }

    /// Zero is raised to one; a queue must hold at least one snapshot.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }
}

/// Returns the default control socket path.
///
/// Uses `$XDG_RUNTIME_DIR/agendawall.sock` if available,
/// otherwise `/tmp/agendawall-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) if !runtime_dir.is_empty() => {
            PathBuf::from(runtime_dir).join("agendawall.sock")
        }
        _ => {
            #[cfg(unix)]
            let uid = unsafe { libc::getuid() };
            #[cfg(not(unix))]
            let uid = 0;
            PathBuf::from(format!("/tmp/agendawall-{uid}.sock"))
        }
    }
}
