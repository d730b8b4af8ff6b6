//! Live log distribution over WebSockets.
//!
//! The hub is a single-owner actor: one event loop owns the subscriber map
//! and consumes `{Register, Unregister, Broadcast}` events from a bounded
//! channel; nothing else ever touches the map. Each subscriber carries a
//! mutable filter and a bounded outbound buffer. A subscriber that cannot
//! accept a record within the enqueue timeout is evicted so one bad peer
//! can never stall the broadcast path.
//!
//! # Architecture
//!
//! ```text
//! AggregateWriter ──► HubHandle::write (60s deadline)
//!                          │
//!                          ▼
//!                    Hub event loop ── owns HashMap<Uuid, SubscriberEntry>
//!                          │ per-subscriber enqueue, 5s timeout
//!                ┌─────────┼─────────┐
//!                ▼         ▼         ▼
//!            outbound   outbound  outbound   (mpsc, 1024 records)
//!                │         │         │
//!            writer task  ...       ...      (owns the WS write half)
//! ```

mod error;
mod filter;
mod hub;
mod subscriber;

pub use error::HubError;
pub use filter::FilterSpec;
pub use hub::{Hub, HubEvent, HubHandle, SubscriberEntry, DRAIN_TIMEOUT};
pub use subscriber::{Subscriber, WireRecord, MAX_MESSAGE_SIZE};
