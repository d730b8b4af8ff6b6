//! Subscriber connection handling.
//!
//! Each subscriber runs two tasks. The reader owns the receive half of the
//! socket: it enforces the inbound size limit and the pong deadline, and
//! every well-formed JSON object it reads replaces the subscriber's filter.
//! The writer owns the send half, so all outbound frames (records, pings,
//! the final Close) are serialized by construction: it drains the outbound
//! buffer the hub fills, pings on a timer, and closes the connection when
//! the buffer is closed (eviction), the peer breaks, or the subscriber's
//! auth token expires.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use coriolis_record::{LogRecord, Severity};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::{HubHandle, SubscriberEntry};
use crate::FilterSpec;

/// Time allowed to write one frame to the peer.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between inbound frames (pongs included) before the peer
/// is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping period; must be below [`PONG_WAIT`].
const PING_PERIOD: Duration = Duration::from_secs(PONG_WAIT.as_secs() * 9 / 10);

/// Maximum inbound message size. Filter updates are tiny.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// The outbound JSON representation of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub severity: Severity,
    pub app_name: String,
    pub message: String,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&LogRecord> for WireRecord {
    fn from(record: &LogRecord) -> Self {
        Self {
            severity: record.severity,
            app_name: record.app_name.clone(),
            message: record.message.clone(),
            hostname: record.hostname.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// A connected WebSocket peer, ready to be registered with the hub.
pub struct Subscriber {
    id: Uuid,
    filter: Arc<RwLock<FilterSpec>>,
    outbound: mpsc::Receiver<LogRecord>,
    socket: WebSocket,
    hub: HubHandle,
    /// Force-disconnect deadline, carried over from the auth token.
    expires_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// Build a subscriber and the hub-side entry that feeds it.
    pub fn new(
        socket: WebSocket,
        filter: FilterSpec,
        expires_at: Option<DateTime<Utc>>,
        hub: HubHandle,
    ) -> (Self, SubscriberEntry) {
        let (entry, outbound) = SubscriberEntry::new(filter);
        let subscriber = Self {
            id: entry.id,
            filter: Arc::clone(&entry.filter),
            outbound,
            socket,
            hub,
            expires_at,
        };
        (subscriber, entry)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Launch the reader and writer tasks. Call after registering the
    /// entry with the hub.
    pub fn spawn(self) {
        let (sink, stream) = self.socket.split();
        tokio::spawn(read_loop(
            stream,
            Arc::clone(&self.filter),
            self.hub.clone(),
            self.id,
        ));
        tokio::spawn(write_loop(
            sink,
            self.outbound,
            self.hub,
            self.id,
            self.expires_at,
        ));
    }
}

/// Wait for filter updates from the peer. Any error, oversized frame or
/// missed pong deadline ends the subscription.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    filter: Arc<RwLock<FilterSpec>>,
    hub: HubHandle,
    id: Uuid,
) {
    loop {
        let frame = match tokio::time::timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                debug!(subscriber = %id, "pong deadline missed, dropping subscriber");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(subscriber = %id, error = %e, "websocket read failed");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if text.len() > MAX_MESSAGE_SIZE {
                    warn!(subscriber = %id, size = text.len(), "filter update too large");
                    break;
                }
                match serde_json::from_str::<FilterSpec>(text.as_str()) {
                    Ok(update) => {
                        debug!(subscriber = %id, filter = ?update, "filter updated");
                        *filter.write() = update;
                    }
                    Err(e) => {
                        warn!(subscriber = %id, error = %e, "malformed filter update");
                        break;
                    }
                }
            }
            // Pings are answered by the protocol layer; both directions of
            // keepalive traffic just refresh the read deadline.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
            Message::Binary(_) => {
                warn!(subscriber = %id, "unexpected binary frame");
                break;
            }
        }
    }

    let _ = hub.unregister(id).await;
}

/// Drain the outbound buffer onto the socket, pinging on a timer.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<LogRecord>,
    hub: HubHandle,
    id: Uuid,
    expires_at: Option<DateTime<Utc>>,
) {
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_PERIOD,
        PING_PERIOD,
    );

    let expiry = async {
        match expires_at {
            Some(at) => {
                let remaining = (at - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(remaining).await;
            }
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            maybe = outbound.recv() => {
                match maybe {
                    Some(record) => {
                        let payload = match serde_json::to_string(&WireRecord::from(&record)) {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(subscriber = %id, error = %e, "failed to encode record");
                                continue;
                            }
                        };
                        if send_frame(&mut sink, Message::Text(payload.into())).await.is_err() {
                            debug!(subscriber = %id, "websocket write failed");
                            break;
                        }
                    }
                    None => {
                        // The hub closed the buffer (eviction or shutdown).
                        let _ = send_frame(&mut sink, Message::Close(None)).await;
                        return;
                    }
                }
            }
            _ = ping.tick() => {
                if send_frame(&mut sink, Message::Ping(Vec::new().into())).await.is_err() {
                    debug!(subscriber = %id, "ping failed");
                    break;
                }
            }
            _ = &mut expiry => {
                debug!(subscriber = %id, "auth token expired, disconnecting");
                let _ = send_frame(&mut sink, Message::Close(None)).await;
                break;
            }
        }
    }

    let _ = hub.unregister(id).await;
}

/// Write one frame under the write deadline.
async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: Message,
) -> Result<(), ()> {
    match tokio::time::timeout(WRITE_WAIT, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}
