//! Shared application state.

use std::sync::Arc;

use coriolis_datastore::DataStore;
use coriolis_hub::HubHandle;

use crate::auth::Authenticator;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live-tail hub; WebSocket subscribers register here.
    pub hub: HubHandle,
    /// Stored-log backend for list and download.
    pub store: Arc<dyn DataStore>,
    /// Token authenticator; `None` means authentication is disabled and
    /// handlers allow anonymous access.
    pub auth: Option<Arc<dyn Authenticator>>,
    /// WebSocket origin allow-list (`*` wildcard, empty = no check).
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        hub: HubHandle,
        store: Arc<dyn DataStore>,
        auth: Option<Arc<dyn Authenticator>>,
        cors_origins: Vec<String>,
    ) -> Self {
        Self {
            hub,
            store,
            auth,
            cors_origins: Arc::new(cors_origins),
        }
    }
}
