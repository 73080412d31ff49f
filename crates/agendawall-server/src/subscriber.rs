//! One viewer's delivery loop.
//!
//! A [`SubscriberSession`] registers with the hub, then drains its queue in
//! FIFO order into a [`SnapshotSink`]. It ends when
//!
//! - the hub closes the queue (eviction or hub shutdown), or
//! - a write fails, stalls past its deadline, or the peer goes away, in
//!   which case the session unregisters itself before releasing the sink.
//!
//! A write in flight is always raced against the peer closing, so a viewer
//! that stops reading cannot pin its session once the socket goes away.

use std::future::{Future, pending};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

use crate::hub::{HubError, HubHandle, SubscriberId, Subscription};

/// A write to the viewer's transport failed.
#[derive(Debug, Error)]
#[error("transport write failed: {0}")]
pub struct SinkError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl SinkError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// Outbound half of a viewer transport.
pub trait SnapshotSink: Send {
    fn send<'a>(&'a mut self, payload: &'a str) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Releases the transport. Errors are not interesting at this point.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The hub closed the queue.
    QueueClosed,
    /// The peer went away before a write failed.
    PeerClosed,
    TransportFailed(SinkError),
    /// A single write did not finish within the session's write timeout.
    WriteTimedOut,
}

pub struct SubscriberSession<S> {
    subscription: Subscription,
    hub: HubHandle,
    sink: S,
    write_timeout: Option<Duration>,
}

impl<S: SnapshotSink> SubscriberSession<S> {
    /// Registers a new viewer with the hub's default queue capacity.
    pub async fn open(hub: HubHandle, sink: S) -> Result<Self, HubError> {
        let subscription = hub.register().await?;
        Ok(Self::with_subscription(hub, subscription, sink))
    }

    pub fn with_subscription(hub: HubHandle, subscription: Subscription, sink: S) -> Self {
        debug!(subscriber = %subscription.id(), "viewer session opened");
        Self {
            subscription,
            hub,
            sink,
            write_timeout: None,
        }
    }

    /// Bounds every individual write. Idle time between snapshots is not
    /// counted.
    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }

    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// Delivers until the queue closes or a write fails.
    pub async fn run(self) -> SessionEnd {
        self.run_until(pending()).await
    }

    /// Like [`run`](Self::run), but also stops when `peer_closed` resolves.
    pub async fn run_until<F>(mut self, peer_closed: F) -> SessionEnd
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(peer_closed);
        let id = self.subscription.id();

        let end = 'deliver: loop {
            tokio::select! {
                payload = self.subscription.recv() => {
                    let Some(payload) = payload else {
                        debug!(subscriber = %id, "queue closed by hub");
                        break SessionEnd::QueueClosed;
                    };
                    let sent = tokio::select! {
                        sent = write_within(self.sink.send(&payload), self.write_timeout) => sent,
                        () = &mut peer_closed => {
                            debug!(subscriber = %id, "viewer disconnected during write");
                            break 'deliver SessionEnd::PeerClosed;
                        }
                    };
                    match sent {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            debug!(subscriber = %id, error = %e, "viewer write failed");
                            break SessionEnd::TransportFailed(e);
                        }
                        None => {
                            debug!(subscriber = %id, "viewer write timed out");
                            break SessionEnd::WriteTimedOut;
                        }
                    }
                }
                () = &mut peer_closed => {
                    debug!(subscriber = %id, "viewer disconnected");
                    break SessionEnd::PeerClosed;
                }
            }
        };

        if !matches!(end, SessionEnd::QueueClosed) {
            // A stopped hub has nothing left to remove.
            let _ = self.hub.unregister(id).await;
        }
        self.sink.close().await;
        end
    }
}

/// `None` when the deadline passed first.
async fn write_within(
    write: BoxFuture<'_, Result<(), SinkError>>,
    limit: Option<Duration>,
) -> Option<Result<(), SinkError>> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, write).await.ok(),
        None => Some(write.await),
    }
}
