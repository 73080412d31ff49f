//! Control request dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono_tz::Tz;
use tracing::{debug, info, warn};

use agendawall_protocol::{ErrorCode, Request, Response, StatusInfo};

use crate::clock::ClockHandle;
use crate::error::{ServerError, ServerResult};
use crate::hub::HubHandle;
use crate::signals::ShutdownHandle;
use crate::socket::Connection;
use crate::store::Refresher;

/// Handles to every running component, shared by the control socket and
/// the HTTP transport.
#[derive(Clone)]
pub struct ServiceContext {
    pub started: Instant,
    pub timezone: Tz,
    pub refresher: Arc<Refresher>,
    pub clock: ClockHandle,
    pub hub: HubHandle,
    pub shutdown: ShutdownHandle,
}

impl ServiceContext {
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub async fn status_info(&self) -> StatusInfo {
        let store = self.refresher.store().stats().await;
        let clock = self.clock.state().await;
        let subscribers = self.hub.subscriber_count().await.unwrap_or(0);

        StatusInfo {
            uptime_seconds: self.uptime_seconds(),
            event_id: store.event_id,
            timetable_version: store.version,
            last_refresh: store.last_refresh,
            last_refresh_error: store.last_error,
            last_refresh_retryable: store.last_error_retryable,
            subscribers,
            virtual_now: clock.now.fixed_offset(),
            clock_mode: clock.mode,
            ticks: clock.ticks,
            skipped_ticks: clock.skipped_ticks,
            last_tick_error: clock.last_error,
        }
    }
}

/// Turns control requests into responses.
#[derive(Clone)]
pub struct ControlHandler {
    ctx: ServiceContext,
}

impl ControlHandler {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip_all, fields(request = request.kind()))]
    pub async fn handle(&self, request: &Request) -> Response {
        let response = match request {
            Request::Ping => Response::Pong,
            Request::Status => Response::Status(self.ctx.status_info().await),
            Request::RefreshTimetable => match self.ctx.refresher.refresh().await {
                Ok(report) => Response::Refreshed {
                    event_id: report.event_id,
                    version: report.version,
                    day_count: report.day_count,
                    session_count: report.session_count,
                },
                Err(e) => Response::error(ErrorCode::ProviderError, e.to_string()),
            },
            Request::ResyncClock => unavailable_or_ok(self.ctx.clock.resync().await),
            Request::SetNow { now } => {
                let now = now.with_timezone(&self.ctx.timezone);
                unavailable_or_ok(self.ctx.clock.set_now(now).await)
            }
            Request::Shutdown => {
                info!("shutdown requested over control socket");
                self.ctx.shutdown.trigger();
                Response::Ok
            }
        };

        if let Response::Error(error) = &response {
            warn!(error = %error, "control request failed");
        } else {
            debug!("control request handled");
        }
        response
    }

    /// Serves requests on `conn` until the peer hangs up or asks for
    /// shutdown.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        while let Some(envelope) = conn.read_request().await? {
            if !envelope.is_compatible() {
                let response = Response::error(
                    ErrorCode::InvalidRequest,
                    format!(
                        "unsupported protocol version {}",
                        envelope.protocol_version
                    ),
                );
                conn.respond(&envelope.request_id, response).await?;
                continue;
            }

            let response = self.handle(&envelope.payload).await;
            conn.respond(&envelope.request_id, response).await?;

            if matches!(envelope.payload, Request::Shutdown) {
                break;
            }
        }
        debug!("control connection closed");
        Ok(())
    }
}

fn unavailable_or_ok(result: ServerResult<()>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e @ ServerError::Unavailable { .. }) => {
            Response::error(ErrorCode::Unavailable, e.to_string())
        }
        Err(e) => Response::error(ErrorCode::InternalError, e.to_string()),
    }
}

/// Connection callback for [`ControlServer::run`](crate::ControlServer::run).
pub fn make_connection_handler(
    handler: ControlHandler,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    move |conn| {
        let handler = handler.clone();
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await {
                warn!(error = %e, "control connection error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agendawall_protocol::{ClockModeInfo, Envelope, read_frame, write_frame};
    use agendawall_providers::{ErrorProvider, ProviderError, StaticProvider};
    use chrono::{DateTime, TimeZone};
    use chrono_tz::Europe::Paris;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::UnixStream;

    use crate::config::ControlConfig;
    use crate::signals::SignalHandler;
    use crate::socket::ControlServer;
    use crate::testing::{EVENT_ID, sample_table, service_context};

    fn static_context(signals: &SignalHandler) -> ServiceContext {
        service_context(Arc::new(StaticProvider::new(sample_table())), signals)
    }

    fn static_handler(signals: &SignalHandler) -> ControlHandler {
        ControlHandler::new(static_context(signals))
    }

    #[tokio::test]
    async fn ping_and_status() {
        let signals = SignalHandler::new();
        let handler = static_handler(&signals);

        assert_eq!(handler.handle(&Request::Ping).await, Response::Pong);

        let Response::Status(info) = handler.handle(&Request::Status).await else {
            panic!("expected status");
        };
        assert_eq!(info.event_id, EVENT_ID);
        assert_eq!(info.timetable_version, 0);
        assert_eq!(info.clock_mode, ClockModeInfo::Simulated);
        assert_eq!(info.subscribers, 0);
        assert!(info.uptime_seconds < 5);
    }

    #[tokio::test]
    async fn refresh_reports_new_version() {
        let signals = SignalHandler::new();
        let handler = static_handler(&signals);

        let response = handler.handle(&Request::RefreshTimetable).await;
        assert_eq!(
            response,
            Response::Refreshed {
                event_id: EVENT_ID,
                version: 1,
                day_count: 1,
                session_count: 1,
            }
        );
    }

    #[tokio::test]
    async fn refresh_failure_is_provider_error() {
        let signals = SignalHandler::new();
        let provider = ErrorProvider::new("indico", ProviderError::server("HTTP 502"));
        let handler = ControlHandler::new(service_context(Arc::new(provider), &signals));

        let Response::Error(error) = handler.handle(&Request::RefreshTimetable).await else {
            panic!("expected error");
        };
        assert_eq!(error.code, ErrorCode::ProviderError);
        assert!(error.message.contains("HTTP 502"));

        let Response::Status(info) = handler.handle(&Request::Status).await else {
            panic!("expected status");
        };
        assert!(info.last_refresh_error.unwrap().contains("HTTP 502"));
        assert!(info.last_refresh_retryable);
    }

    #[tokio::test]
    async fn set_now_moves_the_clock() {
        let signals = SignalHandler::new();
        let ctx = static_context(&signals);
        let handler = ControlHandler::new(ctx.clone());

        // Let the first tick land so it cannot overwrite the override.
        while ctx.clock.state().await.ticks == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let now = DateTime::parse_from_rfc3339("2016-09-27T08:04:50Z").unwrap();
        assert_eq!(handler.handle(&Request::set_now(now)).await, Response::Ok);

        // The override is applied by the clock loop; give it a moment.
        let expected = Paris.with_ymd_and_hms(2016, 9, 27, 10, 4, 50).unwrap();
        for _ in 0..100 {
            if ctx.clock.state().await.now == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let state = ctx.clock.state().await;
        assert_eq!(state.now, expected);
        assert_eq!(state.now.timezone(), Paris);

        assert_eq!(handler.handle(&Request::ResyncClock).await, Response::Ok);
    }

    #[tokio::test]
    async fn stopped_clock_is_unavailable() {
        let signals = SignalHandler::new();
        let ctx = static_context(&signals);
        ctx.clock.stop().await.unwrap();
        let handler = ControlHandler::new(ctx);

        let mut response = Response::Ok;
        for _ in 0..100 {
            response = handler.handle(&Request::ResyncClock).await;
            if response.is_error() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let Response::Error(error) = response else {
            panic!("expected error");
        };
        assert_eq!(error.code, ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn shutdown_over_socket() {
        let signals = SignalHandler::new();
        let handler = static_handler(&signals);

        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.sock");
        let server = ControlServer::bind(ControlConfig::new(&path)).await.unwrap();
        let shutdown = signals.shutdown();
        let serve = tokio::spawn(async move {
            server
                .run_until_shutdown(make_connection_handler(handler), shutdown.wait())
                .await
        });

        let timeout = Duration::from_secs(5);
        let mut stream = UnixStream::connect(&path).await.unwrap();

        let mut old = Envelope::new("v0", Request::Ping);
        old.protocol_version = "0".to_string();
        write_frame(&mut stream, &old, timeout).await.unwrap();
        let reply: Envelope<Response> = read_frame(&mut stream, timeout).await.unwrap().unwrap();
        assert!(reply.payload.is_error());

        write_frame(&mut stream, &Envelope::new("bye", Request::Shutdown), timeout)
            .await
            .unwrap();
        let reply: Envelope<Response> = read_frame(&mut stream, timeout).await.unwrap().unwrap();
        assert_eq!(reply.request_id, "bye");
        assert_eq!(reply.payload, Response::Ok);

        serve.await.unwrap().unwrap();
        assert!(signals.is_shutdown());
    }
}
