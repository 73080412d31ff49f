//! Unix socket client for the agendawall control plane.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, warn};
use uuid::Uuid;

use agendawall_protocol::{Envelope, Request, Response, read_frame, write_frame};

use crate::error::{ClientError, ClientResult};

/// Client for a running `agendawall serve`.
pub struct ControlClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// Creates a client for the default socket path.
    pub fn with_defaults() -> Self {
        Self::new(
            agendawall_server::default_socket_path(),
            Duration::from_secs(5),
        )
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Checks if the daemon socket exists.
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Sends a request and waits for its response, error responses included.
    pub async fn send(&self, request: Request) -> ClientResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        let envelope = Envelope::new(&request_id, request);

        debug!(
            socket = %self.socket_path.display(),
            request_id = %request_id,
            request = envelope.payload.kind(),
            "connecting to daemon"
        );

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!(
                    "failed to connect to {}: {} (is `agendawall serve` running?)",
                    self.socket_path.display(),
                    e
                ))
            })?;

        write_frame(&mut stream, &envelope, self.timeout).await?;
        debug!("request sent, waiting for response");

        let response: Envelope<Response> = read_frame(&mut stream, self.timeout)
            .await?
            .ok_or_else(|| ClientError::Connection("daemon closed the connection".into()))?;

        if response.request_id != request_id {
            warn!(
                expected = %request_id,
                received = %response.request_id,
                "response request_id mismatch"
            );
        }

        Ok(response.payload)
    }

    /// Like [`send`](Self::send), turning error responses into
    /// [`ClientError::Rejected`].
    pub async fn call(&self, request: Request) -> ClientResult<Response> {
        match self.send(request).await? {
            Response::Error(error) => Err(ClientError::Rejected(error)),
            response => Ok(response),
        }
    }

    /// Pings the daemon to check if it's alive.
    pub async fn ping(&self) -> bool {
        matches!(self.send(Request::Ping).await, Ok(Response::Pong))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agendawall_protocol::ErrorCode;
    use agendawall_server::{ControlConfig, ControlServer};
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Answers one request on `server` with `response`.
    async fn answer_once(server: ControlServer, response: Response) -> Request {
        let mut conn = server.accept().await.unwrap();
        let request = conn.read_request().await.unwrap().unwrap();
        conn.respond(&request.request_id, response).await.unwrap();
        request.payload
    }

    #[test]
    fn client_creation() {
        let client = ControlClient::new("/tmp/test.sock", Duration::from_secs(10));
        assert_eq!(client.socket_path(), Path::new("/tmp/test.sock"));
        assert!(!client.socket_exists());
    }

    #[test]
    fn default_client() {
        let client = ControlClient::with_defaults();
        assert!(client.socket_path().to_string_lossy().contains("agendawall"));
    }

    #[tokio::test]
    async fn ping_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.sock");
        let server = ControlServer::bind(ControlConfig::new(&path)).await.unwrap();
        let daemon = tokio::spawn(answer_once(server, Response::Pong));

        let client = ControlClient::new(&path, TIMEOUT);
        assert!(client.ping().await);
        assert_eq!(daemon.await.unwrap(), Request::Ping);
    }

    #[tokio::test]
    async fn error_response_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.sock");
        let server = ControlServer::bind(ControlConfig::new(&path)).await.unwrap();
        let response = Response::error(ErrorCode::ProviderError, "HTTP 502");
        let daemon = tokio::spawn(answer_once(server, response));

        let client = ControlClient::new(&path, TIMEOUT);
        let err = client.call(Request::RefreshTimetable).await.unwrap_err();
        let ClientError::Rejected(error) = err else {
            panic!("expected rejection, got {err:?}");
        };
        assert_eq!(error.code, ErrorCode::ProviderError);
        assert_eq!(daemon.await.unwrap(), Request::RefreshTimetable);
    }

    #[tokio::test]
    async fn missing_socket_is_connection_error() {
        let dir = tempdir().unwrap();
        let client = ControlClient::new(dir.path().join("absent.sock"), TIMEOUT);
        assert!(!client.ping().await);
        let err = client.send(Request::Status).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
