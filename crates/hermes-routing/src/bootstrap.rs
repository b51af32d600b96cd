//! # Core Bootstrap
//!
//! Wires the context into a running core: resolver, registry, ownership
//! checker, correlator, router, and the scheduled reaper. Returns a handle
//! whose `stop` performs the orderly shutdown: reaper first, then the
//! correlator resolves every pending entry as cancelled and waits for all
//! output-queue poll loops to acknowledge the stop signal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use hermes_shared::HermesResult;

use crate::context::CoreContext;
use crate::correlator::Correlator;
use crate::ownership::OwnershipChecker;
use crate::reaper::Reaper;
use crate::registry::QueueRegistry;
use crate::resolver::TenantResolver;
use crate::router::Router;

/// A running core and the pieces callers interact with
#[derive(Debug)]
pub struct CoreHandle {
    pub context: CoreContext,
    pub router: Arc<Router>,
    pub correlator: Arc<Correlator>,
    reaper_shutdown: CancellationToken,
    reaper_task: tokio::task::JoinHandle<()>,
}

/// Builder for a running core
#[derive(Debug)]
pub struct CoreBootstrap;

impl CoreBootstrap {
    /// Assemble and start every component against the given context
    pub fn bootstrap(context: CoreContext) -> HermesResult<CoreHandle> {
        let resolver = TenantResolver::new(context.storage.clone(), &context.config)?;
        let registry = QueueRegistry::new(context.client.clone(), context.storage.clone());
        let ownership =
            OwnershipChecker::new(context.storage.clone(), context.config.ownership.clone());
        let correlator = Correlator::new(
            context.client.clone(),
            context.config.correlation.clone(),
        );

        let router = Arc::new(Router::new(
            resolver,
            registry,
            ownership.clone(),
            correlator.clone(),
            context.client.clone(),
            context.storage.clone(),
        ));

        let reaper = Arc::new(Reaper::new(
            context.client.clone(),
            context.storage.clone(),
            ownership,
            context.config.reaper.clone(),
        ));
        let reaper_shutdown = CancellationToken::new();
        let reaper_task = tokio::spawn(reaper.run(reaper_shutdown.clone()));

        info!("Core bootstrap complete");
        Ok(CoreHandle {
            context,
            router,
            correlator,
            reaper_shutdown,
            reaper_task,
        })
    }
}

impl CoreHandle {
    /// Orderly shutdown: stop the reaper, then drain the correlator
    pub async fn stop(self) -> HermesResult<()> {
        info!("Stopping core");
        self.reaper_shutdown.cancel();
        let _ = self.reaper_task.await;
        self.correlator.shutdown().await;
        info!("Core stopped");
        Ok(())
    }
}
