//! Broadcast hub: the single owner of the viewer registry.
//!
//! Register, unregister and publish requests all go through one intake
//! channel and are handled in arrival order by [`BroadcastHub::run`], so the
//! registry is never mutated while a fan-out is in progress.
//!
//! Publishing never waits on a viewer. Each viewer has a bounded queue; a
//! viewer whose queue is full is dropped from the registry and its queue is
//! closed.
//!
//! ```text
//! clock ──publish──┐
//! viewer ─register─┼──► intake ──► hub loop ──try_send──► viewer queues
//! viewer ─unreg────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_QUEUE_CAPACITY;

/// Identifies one registered viewer.
pub type SubscriberId = Uuid;

/// A rendered snapshot, shared by every queue it is pushed to.
pub type Payload = Arc<str>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("broadcast hub has stopped")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Pending register/unregister/publish requests before senders wait.
    pub intake_capacity: usize,

    /// Default outbound queue capacity handed to new viewers.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 1024,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn with_intake_capacity(mut self, capacity: usize) -> Self {
        self.intake_capacity = capacity.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

enum HubCommand {
    Register {
        id: SubscriberId,
        queue: mpsc::Sender<Payload>,
    },
    Unregister(SubscriberId),
    Publish(Payload),
    Count(oneshot::Sender<usize>),
    Stop,
}

/// The receiving half of a registration.
///
/// `recv` yields payloads in publish order and returns `None` once the hub
/// has closed the queue (eviction, unregister or hub shutdown).
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    queue: mpsc::Receiver<Payload>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Payload> {
        self.queue.recv().await
    }
}

/// The hub task.
pub struct BroadcastHub {
    config: HubConfig,
    command_tx: mpsc::Sender<HubCommand>,
    command_rx: mpsc::Receiver<HubCommand>,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Payload>>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.intake_capacity.max(1));
        Self {
            config,
            command_tx,
            command_rx,
            subscribers: HashMap::new(),
        }
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle {
            command_tx: self.command_tx.clone(),
            queue_capacity: self.config.queue_capacity,
        }
    }

    /// Processes requests until stopped or until every handle is dropped.
    ///
    /// On exit every remaining viewer queue is closed.
    pub async fn run(self) {
        let Self {
            command_tx,
            mut command_rx,
            mut subscribers,
            ..
        } = self;
        // Only handles keep the intake open from here on.
        drop(command_tx);

        info!("broadcast hub started");
        while let Some(command) = command_rx.recv().await {
            match command {
                HubCommand::Register { id, queue } => {
                    if subscribers.contains_key(&id) {
                        warn!(subscriber = %id, "subscriber already registered, ignoring");
                        continue;
                    }
                    subscribers.insert(id, queue);
                    debug!(subscriber = %id, total = subscribers.len(), "subscriber registered");
                }
                HubCommand::Unregister(id) => {
                    if subscribers.remove(&id).is_some() {
                        debug!(subscriber = %id, total = subscribers.len(), "subscriber unregistered");
                    }
                }
                HubCommand::Publish(payload) => fan_out(&mut subscribers, &payload),
                HubCommand::Count(reply) => {
                    let _ = reply.send(subscribers.len());
                }
                HubCommand::Stop => break,
            }
        }

        info!(closing = subscribers.len(), "broadcast hub stopped");
    }
}

fn fan_out(subscribers: &mut HashMap<SubscriberId, mpsc::Sender<Payload>>, payload: &Payload) {
    subscribers.retain(|id, queue| match queue.try_send(payload.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            info!(subscriber = %id, "evicting slow subscriber");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(subscriber = %id, "dropping subscriber with closed queue");
            false
        }
    });
}

/// Cheap, cloneable access to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    command_tx: mpsc::Sender<HubCommand>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Registers a new viewer with the default queue capacity.
    pub async fn register(&self) -> Result<Subscription, HubError> {
        self.register_as(Uuid::new_v4(), self.queue_capacity).await
    }

    /// Registers `id` with a queue of `capacity` pending payloads.
    ///
    /// Registering an id that is already present leaves the existing
    /// registration untouched; the returned subscription is closed.
    pub async fn register_as(
        &self,
        id: SubscriberId,
        capacity: usize,
    ) -> Result<Subscription, HubError> {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        self.send(HubCommand::Register {
            id,
            queue: queue_tx,
        })
        .await?;
        Ok(Subscription {
            id,
            queue: queue_rx,
        })
    }

    /// Removes `id`; unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister(id)).await
    }

    pub async fn publish(&self, payload: impl Into<Payload>) -> Result<(), HubError> {
        self.send(HubCommand::Publish(payload.into())).await
    }

    pub async fn subscriber_count(&self) -> Result<usize, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::Count(reply_tx)).await?;
        reply_rx.await.map_err(|_| HubError::Closed)
    }

    /// Stops the hub, closing every viewer queue.
    pub async fn stop(&self) -> Result<(), HubError> {
        self.send(HubCommand::Stop).await
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_hub(config: HubConfig) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let hub = BroadcastHub::new(config);
        let handle = hub.handle();
        (handle, tokio::spawn(hub.run()))
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        for i in 0..10 {
            hub.publish(format!("snapshot-{i}")).await.unwrap();
        }

        for sub in [&mut a, &mut b] {
            for i in 0..10 {
                assert_eq!(&*sub.recv().await.unwrap(), format!("snapshot-{i}"));
            }
        }
        assert_eq!(hub.subscriber_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stalled_subscriber_is_evicted_after_capacity_plus_one() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let mut stalled = hub.register_as(Uuid::new_v4(), 3).await.unwrap();
        let mut healthy = hub.register_as(Uuid::new_v4(), 16).await.unwrap();

        for i in 0..3 {
            hub.publish(format!("p{i}")).await.unwrap();
        }
        assert_eq!(hub.subscriber_count().await.unwrap(), 2);

        hub.publish("p3").await.unwrap();
        assert_eq!(hub.subscriber_count().await.unwrap(), 1);

        // The evicted queue still holds what fit, then reports closed.
        for i in 0..3 {
            assert_eq!(&*stalled.recv().await.unwrap(), format!("p{i}"));
        }
        assert!(stalled.recv().await.is_none());

        for i in 0..4 {
            assert_eq!(&*healthy.recv().await.unwrap(), format!("p{i}"));
        }
    }

    #[tokio::test]
    async fn draining_subscriber_is_never_evicted() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let mut sub = hub.register_as(Uuid::new_v4(), 1).await.unwrap();

        for i in 0..20 {
            hub.publish(format!("p{i}")).await.unwrap();
            assert_eq!(&*sub.recv().await.unwrap(), format!("p{i}"));
        }
        assert_eq!(hub.subscriber_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_register_keeps_first() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let id = Uuid::new_v4();
        let mut first = hub.register_as(id, 8).await.unwrap();
        let mut second = hub.register_as(id, 8).await.unwrap();

        assert!(second.recv().await.is_none());
        assert_eq!(hub.subscriber_count().await.unwrap(), 1);

        hub.publish("still here").await.unwrap();
        assert_eq!(&*first.recv().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn unregister_closes_queue_and_tolerates_repeats() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let mut sub = hub.register().await.unwrap();

        hub.unregister(sub.id()).await.unwrap();
        hub.unregister(sub.id()).await.unwrap();
        hub.unregister(Uuid::new_v4()).await.unwrap();

        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_publish() {
        let (hub, _task) = spawn_hub(HubConfig::default());
        let sub = hub.register().await.unwrap();
        drop(sub);

        hub.publish("x").await.unwrap();
        assert_eq!(hub.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stop_closes_everything() {
        let (hub, task) = spawn_hub(HubConfig::default());
        let mut sub = hub.register().await.unwrap();

        hub.stop().await.unwrap();
        task.await.unwrap();

        assert!(sub.recv().await.is_none());
        assert_eq!(hub.publish("late").await, Err(HubError::Closed));
        assert!(hub.is_closed());
    }

    #[test]
    fn config_floors() {
        let config = HubConfig::default()
            .with_intake_capacity(0)
            .with_queue_capacity(0);
        assert_eq!(config.intake_capacity, 1);
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(HubConfig::default().queue_capacity, 256);
    }
}
