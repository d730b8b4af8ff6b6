//! Error types for the hub.

use thiserror::Error;

/// Errors surfaced by the hub to its callers.
#[derive(Debug, Error)]
pub enum HubError {
    /// The broadcast channel did not accept the record within the
    /// deadline. The hub itself keeps running.
    #[error("timed out enqueueing record for broadcast")]
    BroadcastTimeout,

    /// The event loop is gone (shutdown already happened).
    #[error("hub is not running")]
    NotRunning,

    /// The event loop did not drain within the stop deadline.
    #[error("timed out waiting for hub stop")]
    StopTimeout,
}
