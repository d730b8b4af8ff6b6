//! The hub actor and its handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use coriolis_record::LogRecord;
use coriolis_writers::{LogWriter, WriteError};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{FilterSpec, HubError};

/// Capacity of the inbound event channel (registrations, unregistrations
/// and broadcasts all flow through it).
const EVENT_BUFFER: usize = 256;

/// Capacity of each subscriber's outbound record buffer.
pub(crate) const OUTBOUND_BUFFER: usize = 1024;

/// How long a broadcast may wait for space on one subscriber's buffer
/// before that subscriber is evicted.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `write` may wait for space on the event channel.
const BROADCAST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `stop` waits for the event loop to drain.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Events consumed by the hub's event loop.
#[derive(Debug)]
pub enum HubEvent {
    Register(SubscriberEntry),
    Unregister(Uuid),
    Broadcast(LogRecord),
}

/// The hub's view of one subscriber: its identity, its current filter
/// (shared with the subscriber's reader task, which replaces it on filter
/// updates) and the sending half of its outbound buffer. Dropping the
/// entry closes the buffer, which the subscriber's writer task observes
/// as eviction.
#[derive(Debug)]
pub struct SubscriberEntry {
    pub id: Uuid,
    pub filter: Arc<RwLock<FilterSpec>>,
    pub sender: mpsc::Sender<LogRecord>,
}

impl SubscriberEntry {
    /// Create an entry plus the receiving half of its outbound buffer.
    pub fn new(filter: FilterSpec) -> (Self, mpsc::Receiver<LogRecord>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
        let entry = Self {
            id: Uuid::new_v4(),
            filter: Arc::new(RwLock::new(filter)),
            sender,
        };
        (entry, receiver)
    }
}

/// Single-owner coordinator over the subscriber set.
///
/// All map access happens inside [`run`](Hub::run); the rest of the world
/// talks to the hub through a [`HubHandle`].
pub struct Hub {
    events: mpsc::Receiver<HubEvent>,
    subscribers: HashMap<Uuid, SubscriberEntry>,
    cancel: CancellationToken,
}

impl Hub {
    pub fn new(cancel: CancellationToken) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let hub = Self {
            events: rx,
            subscribers: HashMap::new(),
            cancel,
        };
        (hub, HubHandle { events: tx })
    }

    /// Create the hub and launch its event loop.
    pub fn spawn(cancel: CancellationToken) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(cancel);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// The event loop. Returns once cancelled (or once every handle is
    /// dropped); awaiting the spawned task observes the drain.
    pub async fn run(mut self) {
        info!("websocket hub started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => {
                    match event {
                        Some(HubEvent::Register(entry)) => {
                            debug!(subscriber = %entry.id, "subscriber registered");
                            self.subscribers.insert(entry.id, entry);
                        }
                        Some(HubEvent::Unregister(id)) => {
                            if self.subscribers.remove(&id).is_some() {
                                debug!(subscriber = %id, "subscriber removed");
                            }
                        }
                        Some(HubEvent::Broadcast(record)) => {
                            self.broadcast(record).await;
                        }
                        None => break,
                    }
                }
            }
        }
        info!(subscribers = self.subscribers.len(), "websocket hub stopped");
    }

    /// Deliver one record to every matching subscriber. A subscriber whose
    /// buffer stays full past [`ENQUEUE_TIMEOUT`] is evicted on the spot.
    async fn broadcast(&mut self, record: LogRecord) {
        let mut evicted = Vec::new();

        for (id, entry) in &self.subscribers {
            if !entry.filter.read().matches(&record) {
                continue;
            }
            let enqueue = tokio::time::timeout(ENQUEUE_TIMEOUT, entry.sender.send(record.clone()));
            match enqueue.await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Receiver gone: the subscriber's tasks already exited.
                    evicted.push(*id);
                }
                Err(_) => {
                    warn!(subscriber = %id, "subscriber too slow, evicting");
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            self.subscribers.remove(&id);
        }
    }
}

/// Cloneable handle for registering subscribers and broadcasting records.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub async fn register(&self, entry: SubscriberEntry) -> Result<(), HubError> {
        self.events
            .send(HubEvent::Register(entry))
            .await
            .map_err(|_| HubError::NotRunning)
    }

    pub async fn unregister(&self, id: Uuid) -> Result<(), HubError> {
        self.events
            .send(HubEvent::Unregister(id))
            .await
            .map_err(|_| HubError::NotRunning)
    }

    async fn broadcast(&self, record: LogRecord) -> Result<(), HubError> {
        match tokio::time::timeout(
            BROADCAST_TIMEOUT,
            self.events.send(HubEvent::Broadcast(record)),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HubError::NotRunning),
            Err(_) => Err(HubError::BroadcastTimeout),
        }
    }
}

#[async_trait::async_trait]
impl LogWriter for HubHandle {
    async fn write(&self, record: LogRecord) -> Result<(), WriteError> {
        self.broadcast(record)
            .await
            .map_err(|e| WriteError::new("broadcasting record to websocket hub", e))
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
