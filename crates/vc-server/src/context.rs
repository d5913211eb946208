//! Application context shared by all route handlers via Axum state.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use vc_av::{EncoderDriver, ToolRegistry};
use vc_core::config::Config;

use crate::orchestrator::Orchestrator;
use crate::registry::JobRegistry;
use crate::storage::Storage;

/// Cheaply cloneable bundle of shared services.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration snapshot.
    pub config: Arc<Config>,
    /// External tool locations.
    pub tools: Arc<ToolRegistry>,
    /// Single source of truth for job state.
    pub registry: Arc<JobRegistry>,
    pub storage: Arc<Storage>,
    pub orchestrator: Orchestrator,
    /// Cancelled on shutdown; stops encoders and background tasks.
    pub cancel: CancellationToken,
    pub started_at: Instant,
}

impl AppContext {
    /// Wire up storage, registry, driver and orchestrator.
    ///
    /// Creates the upload and output directories if needed.
    pub fn new(config: Config, tools: ToolRegistry) -> vc_core::Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage));
        storage.ensure_dirs()?;

        let tools = Arc::new(tools);
        let registry = Arc::new(JobRegistry::new());
        let cancel = CancellationToken::new();
        let driver = EncoderDriver::standard(tools.clone(), &config.conversion);
        let orchestrator = Orchestrator::new(
            registry.clone(),
            storage.clone(),
            tools.clone(),
            driver,
            config.storage.keep_inputs,
            cancel.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            tools,
            registry,
            storage,
            orchestrator,
            cancel,
            started_at: Instant::now(),
        })
    }
}
