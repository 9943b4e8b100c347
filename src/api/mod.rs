//! REST control surface for the recorder
//!
//! Exposes camera listing and editing, capture dispatch, task status and
//! video format control over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::capture::Orchestrator;
use crate::config::Config;

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{build_router, AppState};

/// API server in front of an orchestrator
#[derive(Debug)]
pub struct ApiServer {
    orchestrator: Orchestrator,
    config: Arc<Config>,
}

impl ApiServer {
    pub fn new(orchestrator: Orchestrator, config: Arc<Config>) -> Self {
        Self { orchestrator, config }
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        info!(
            "🚀 Starting API server on {}:{}",
            self.config.server.host, self.config.server.port
        );
        server::start_http_server(self.orchestrator, self.config).await
    }
}
