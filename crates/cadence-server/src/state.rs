use std::sync::Arc;

use cadence_core::config::{ApiToken, Config};
use cadence_core::content::MemoryContentStore;
use cadence_core::service::ReleaseService;
use cadence_core::Workspace;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub content: Arc<MemoryContentStore>,
    pub service: Arc<ReleaseService>,
}

impl AppState {
    pub fn new(ws: Workspace) -> Self {
        Self {
            config: Arc::new(ws.config),
            content: ws.content,
            service: ws.service,
        }
    }

    pub fn tokens(&self) -> &[ApiToken] {
        &self.config.auth.tokens
    }
}
