//! Viewer-facing HTTP transport.
//!
//! # Routes
//!
//! - `GET  /`                  the kiosk page
//! - `GET  /data`              WebSocket; one text frame per snapshot
//! - `POST /refresh-timetable` refetch the timetable, answer once swapped
//! - `GET  /health`            liveness probe

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agendawall_core::html_escape;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::error::ServerResult;
use crate::handler::ServiceContext;
use crate::subscriber::{SinkError, SnapshotSink, SubscriberSession};

const PAGE_TEMPLATE: &str = include_str!("../assets/index.html");

#[derive(Clone)]
struct AppState {
    ctx: ServiceContext,
    page: Arc<str>,
    queue_capacity: usize,
    write_timeout: Duration,
}

/// Builds the kiosk page with `title` filled in.
pub fn render_page(title: &str) -> String {
    PAGE_TEMPLATE.replace("{{title}}", &html_escape(title))
}

pub fn router(ctx: ServiceContext, config: &HttpConfig) -> Router {
    let state = AppState {
        ctx,
        page: render_page(&config.page_title).into(),
        queue_capacity: config.queue_capacity,
        write_timeout: config.write_timeout,
    };

    Router::new()
        .route("/", get(page_handler))
        .route("/data", get(data_handler))
        .route("/refresh-timetable", post(refresh_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` completes.
pub async fn serve<S>(listener: TcpListener, router: Router, shutdown: S) -> ServerResult<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    info!(addr = ?listener.local_addr().ok(), "viewer transport listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn page_handler(State(state): State<AppState>) -> Html<String> {
    Html(state.page.to_string())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    let event_id = state.ctx.refresher.event_id();
    info!(event_id, "timetable refresh requested over HTTP");
    match state.ctx.refresher.refresh().await {
        Ok(report) => (
            StatusCode::OK,
            format!("timetable-{} refreshed\n", report.event_id),
        ),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")),
    }
}

async fn data_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_viewer(socket, state))
}

async fn serve_viewer(socket: WebSocket, state: AppState) {
    let hub = state.ctx.hub.clone();
    let subscription = match hub.register_as(Uuid::new_v4(), state.queue_capacity).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(error = %e, "rejecting viewer");
            return;
        }
    };

    let (sink, mut incoming) = socket.split();
    let session = SubscriberSession::with_subscription(hub, subscription, WsSink { sink })
        .with_write_timeout(state.write_timeout);
    let id = session.id();
    info!(subscriber = %id, "viewer connected");

    // Viewers never send anything useful; reading only detects the close.
    let peer_closed = async move {
        while let Some(Ok(message)) = incoming.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };
    let end = session.run_until(peer_closed).await;
    info!(subscriber = %id, reason = ?end, "viewer disconnected");
}

struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

impl SnapshotSink for WsSink {
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.sink
                .send(Message::Text(payload.to_owned()))
                .await
                .map_err(SinkError::new)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.sink.close().await {
                debug!(error = %e, "closing viewer socket");
            }
        })
    }
}
