//! Serve command: runs the kiosk daemon in the foreground.
//!
//! This module wires every daemon component together:
//! - Timetable provider (Indico or a saved export) and the initial fetch
//! - Signal handler (SIGTERM/SIGINT for shutdown, SIGHUP for refresh)
//! - Broadcast hub and clock driver
//! - Control socket (operator commands)
//! - Viewer HTTP/WebSocket transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use agendawall_core::{HtmlRenderer, Renderer, TimeTable};
use agendawall_providers::{FileProvider, TimetableProvider};
use agendawall_server::{
    BroadcastHub, ClockDriver, ControlHandler, ControlServer, HubConfig, RefreshRequests,
    Refresher, ServerResult, ServiceContext, ShutdownSignal, SignalHandler, TimetableStore,
    make_connection_handler, router, serve,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// How long each component gets to wind down after shutdown.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Starts the daemon and blocks until SIGTERM/SIGINT or a `shutdown`
/// request.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let signals = SignalHandler::new();
    signals.spawn_listener()?;
    run_with_signals(config, signals).await
}

/// Like [`run`], driven by an existing signal handler.
pub async fn run_with_signals(config: &ClientConfig, signals: SignalHandler) -> ClientResult<()> {
    let timezone = config.timezone()?;
    let clock_config = config.clock_config()?;
    let http_config = config.http_config()?;
    let event_id = config.event.id;

    // 1. Provider and the initial timetable
    let provider = build_provider(config)?;
    info!(provider = provider.name(), event_id, "timetable provider ready");

    let store = Arc::new(TimetableStore::new(TimeTable::empty(event_id, timezone)));
    let refresher = Arc::new(Refresher::new(store.clone(), provider, event_id));
    match refresher.refresh().await {
        Ok(report) => info!(
            version = report.version,
            days = report.day_count,
            sessions = report.session_count,
            "initial timetable loaded"
        ),
        Err(e) => warn!(
            error = %e,
            "initial timetable fetch failed; showing an empty agenda until a refresh succeeds"
        ),
    }

    // 2. Hub
    let hub = BroadcastHub::new(HubConfig::default().with_queue_capacity(http_config.queue_capacity));
    let hub_handle = hub.handle();
    let hub_task = tokio::spawn(hub.run());

    // 3. Clock
    let renderer: Arc<dyn Renderer> = Arc::new(HtmlRenderer::new());
    let driver = ClockDriver::new(clock_config, store, renderer, hub_handle.clone());
    let clock = driver.handle();
    let clock_task = tokio::spawn(driver.run());

    // 4. SIGHUP refreshes
    let refresh_task = tokio::spawn(refresh_on_request(
        signals.refresh_requests(),
        refresher.clone(),
        signals.shutdown(),
    ));

    let ctx = ServiceContext {
        started: Instant::now(),
        timezone,
        refresher,
        clock: clock.clone(),
        hub: hub_handle.clone(),
        shutdown: signals.shutdown_handle(),
    };

    // 5. Control socket
    let control = ControlServer::bind(config.control_config()).await?;
    let handler = make_connection_handler(ControlHandler::new(ctx.clone()));
    let control_shutdown = signals.shutdown();
    let control_task = spawn_component("control socket", &signals, async move {
        control
            .run_until_shutdown(handler, control_shutdown.wait())
            .await
    });

    // 6. Viewer transport
    let listener = TcpListener::bind(http_config.addr).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        title = %http_config.page_title,
        "kiosk page ready"
    );
    let app = router(ctx, &http_config);
    let http_task = spawn_component(
        "viewer transport",
        &signals,
        serve(listener, app, signals.shutdown().wait()),
    );

    signals.shutdown().wait().await;
    info!("Shutting down...");

    if let Err(e) = clock.stop().await {
        warn!(error = %e, "Failed to send stop command to clock");
    }
    // Closing every subscriber queue ends the viewer sessions.
    if let Err(e) = hub_handle.stop().await {
        warn!(error = %e, "Failed to send stop command to hub");
    }

    let mut outcome = Ok(());
    for (name, task) in [("viewer transport", http_task), ("control socket", control_task)] {
        match tokio::time::timeout(STOP_GRACE, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                if outcome.is_ok() {
                    outcome = Err(ClientError::from(e));
                }
            }
            Ok(Err(e)) => warn!(component = name, error = %e, "component task panicked"),
            Err(_) => warn!(component = name, "component did not stop in time"),
        }
    }
    for (name, task) in [("clock", clock_task), ("hub", hub_task), ("refresher", refresh_task)] {
        if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
            warn!(component = name, "component did not stop in time");
        }
    }

    info!("Server stopped");
    outcome
}

/// Spawns a long-running component; its failure brings the daemon down.
fn spawn_component<F>(
    name: &'static str,
    signals: &SignalHandler,
    component: F,
) -> JoinHandle<ServerResult<()>>
where
    F: Future<Output = ServerResult<()>> + Send + 'static,
{
    let shutdown = signals.shutdown_handle();
    tokio::spawn(async move {
        let result = component.await;
        if let Err(ref e) = result {
            error!(component = name, error = %e, "component failed");
            shutdown.trigger();
        }
        result
    })
}

/// Refetches the timetable on every SIGHUP until shutdown.
async fn refresh_on_request(
    mut requests: RefreshRequests,
    refresher: Arc<Refresher>,
    shutdown: ShutdownSignal,
) {
    let shutdown = shutdown.wait();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            more = requests.next() => {
                if !more {
                    break;
                }
                match refresher.refresh().await {
                    Ok(report) => info!(version = report.version, sessions = report.session_count, "timetable refreshed"),
                    Err(e) => warn!(error = %e, "timetable refresh failed; keeping the previous one"),
                }
            }
            () = &mut shutdown => break,
        }
    }
}

/// Builds the timetable provider from config.
fn build_provider(config: &ClientConfig) -> ClientResult<Arc<dyn TimetableProvider>> {
    match config.event.timetable_file {
        Some(ref path) => {
            info!(path = %path.display(), "serving a saved timetable export");
            Ok(Arc::new(FileProvider::new(path)))
        }
        None => remote_provider(config),
    }
}

#[cfg(feature = "indico")]
fn remote_provider(config: &ClientConfig) -> ClientResult<Arc<dyn TimetableProvider>> {
    use agendawall_providers::IndicoProvider;

    let indico = super::fetch::indico_config(&config.event.host, config)?;
    Ok(Arc::new(IndicoProvider::new(indico)?))
}

#[cfg(not(feature = "indico"))]
fn remote_provider(_config: &ClientConfig) -> ClientResult<Arc<dyn TimetableProvider>> {
    Err(ClientError::Config(
        "built without Indico support; set event.timetable_file".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agendawall_protocol::{ClockModeInfo, Request, Response};
    use tempfile::tempdir;

    use crate::config::ClockModeSetting;
    use crate::socket::ControlClient;

    const EXPORT: &str = r#"{"results": {"9": {"20160928": {"s": {
        "id": "s",
        "title": "Posters",
        "room": "Hall",
        "startDate": {"date": "2016-09-28", "time": "09:00:00", "tz": "Europe/Paris"},
        "endDate": {"date": "2016-09-28", "time": "10:00:00", "tz": "Europe/Paris"}
    }}}}}"#;

    fn kiosk_config(dir: &std::path::Path) -> ClientConfig {
        let export = dir.join("timetable.json");
        std::fs::write(&export, EXPORT).unwrap();

        let mut config = ClientConfig::default();
        config.event.id = 9;
        config.event.timetable_file = Some(export);
        config.http.addr = "127.0.0.1:0".into();
        config.server.socket_path = Some(dir.join("kiosk.sock"));
        config.clock.mode = ClockModeSetting::Simulated;
        config.clock.now = Some("2016-09-28 09:30:00".into());
        config.clock.tick_ms = 3_600_000;
        config
    }

    async fn wait_for_daemon(client: &ControlClient) {
        for _ in 0..200 {
            if client.ping().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("daemon never answered");
    }

    #[tokio::test]
    async fn serves_until_shutdown_request() {
        let dir = tempdir().unwrap();
        let config = kiosk_config(dir.path());
        let socket_path = config.socket_path();

        let daemon_config = config.clone();
        let daemon =
            tokio::spawn(async move { run_with_signals(&daemon_config, SignalHandler::new()).await });

        let client = ControlClient::new(&socket_path, Duration::from_secs(5));
        wait_for_daemon(&client).await;

        let Response::Status(info) = client.call(Request::Status).await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(info.event_id, 9);
        assert_eq!(info.timetable_version, 1);
        assert_eq!(info.clock_mode, ClockModeInfo::Simulated);

        assert_eq!(client.call(Request::Shutdown).await.unwrap(), Response::Ok);
        daemon.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn failed_initial_fetch_still_serves() {
        let dir = tempdir().unwrap();
        let mut config = kiosk_config(dir.path());
        config.event.timetable_file = Some(dir.path().join("absent.json"));
        let socket_path = config.socket_path();

        let signals = SignalHandler::new();
        let shutdown = signals.shutdown_handle();
        let daemon = tokio::spawn(async move { run_with_signals(&config, signals).await });

        let client = ControlClient::new(&socket_path, Duration::from_secs(5));
        wait_for_daemon(&client).await;

        let Response::Status(info) = client.call(Request::Status).await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(info.timetable_version, 0);
        assert!(info.last_refresh_error.unwrap().contains("absent.json"));

        shutdown.trigger();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refresh_requests_reload_the_timetable() {
        let dir = tempdir().unwrap();
        let config = kiosk_config(dir.path());
        let store = Arc::new(TimetableStore::new(TimeTable::empty(9, chrono_tz::Europe::Paris)));
        let refresher = Arc::new(Refresher::new(
            store.clone(),
            build_provider(&config).unwrap(),
            9,
        ));

        let signals = SignalHandler::new();
        let task = tokio::spawn(refresh_on_request(
            signals.refresh_requests(),
            refresher,
            signals.shutdown(),
        ));

        signals.trigger_refresh();
        for _ in 0..200 {
            if store.stats().await.version == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.stats().await.version, 1);

        signals.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn file_setting_selects_file_provider() {
        let mut config = ClientConfig::default();
        config.event.timetable_file = Some("/srv/kiosk/timetable.json".into());
        assert_eq!(build_provider(&config).unwrap().name(), "file");
    }
}
