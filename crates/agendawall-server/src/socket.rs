//! Unix control socket.
//!
//! Operators talk to a running daemon through length-prefixed JSON
//! envelopes (see `agendawall-protocol`). One task serves each connection.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use agendawall_protocol::{Envelope, PROTOCOL_VERSION, Request, Response, read_frame, write_frame};

use crate::config::ControlConfig;
use crate::error::{ServerError, ServerResult};

/// Listener for operator connections.
pub struct ControlServer {
    config: ControlConfig,
    listener: UnixListener,
    connection_slots: Arc<Semaphore>,
}

impl ControlServer {
    /// Binds the control socket.
    ///
    /// A socket file nobody answers on is removed first when
    /// `cleanup_stale_socket` is set; a live one means another daemon runs.
    pub async fn bind(config: ControlConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if socket_path.exists() {
            if !config.cleanup_stale_socket {
                return Err(ServerError::socket_in_use(
                    socket_path.to_string_lossy().to_string(),
                ));
            }
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ServerError::socket_in_use(
                    socket_path.to_string_lossy().to_string(),
                ));
            }
            info!(path = %socket_path.display(), "removing stale control socket");
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "control socket listening");

        let connection_slots = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Ok(Self {
            config,
            listener,
            connection_slots,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accepts one connection, waiting for a free slot first.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::unavailable("control socket"))?;

        let (stream, _addr) = self.listener.accept().await?;
        debug!("accepted control connection");

        Ok(Connection {
            stream,
            timeout: self.config.connection_timeout,
            _permit: permit,
        })
    }

    /// Accepts connections forever, spawning `handler` for each.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(ServerError::Unavailable { .. }) => {
                    return Err(ServerError::unavailable("control socket"));
                }
                Err(e) => error!(error = %e, "failed to accept control connection"),
            }
        }
    }

    /// Like [`run`](Self::run), until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            () = shutdown => {
                debug!("control socket shutting down");
                Ok(())
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let path = &self.config.socket_path;
        if path.exists() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed control socket"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove control socket"),
            }
        }
    }
}

/// One operator connection.
pub struct Connection {
    stream: UnixStream,
    timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Reads the next request; `Ok(None)` when the peer hung up.
    pub async fn read_request(&mut self) -> ServerResult<Option<Envelope<Request>>> {
        let envelope: Option<Envelope<Request>> = read_frame(&mut self.stream, self.timeout).await?;
        if let Some(envelope) = &envelope
            && !envelope.is_compatible()
        {
            warn!(
                version = %envelope.protocol_version,
                expected = PROTOCOL_VERSION,
                "incompatible protocol version"
            );
        }
        Ok(envelope)
    }

    pub async fn write_response(&mut self, envelope: &Envelope<Response>) -> ServerResult<()> {
        write_frame(&mut self.stream, envelope, self.timeout).await?;
        Ok(())
    }

    /// Answers `request_id` with `response`.
    pub async fn respond(
        &mut self,
        request_id: impl Into<String>,
        response: Response,
    ) -> ServerResult<()> {
        self.write_response(&Envelope::new(request_id, response))
            .await
    }
}
