//! The charging engine — the service that owns every narrow collaborator
//! port plus the repositories, clock, and deferred-work scheduler, and
//! exposes one async method per inbound OCPP message kind. Everything in
//! `boot.rs`, `status.rs`, `authorize.rs`, `start_transaction.rs`,
//! `meter_values.rs`, and `stop_transaction.rs` is an `impl` block on
//! [`ChargingEngine`] so the handlers can freely call into one another the
//! way the connector recovery path calls back into `stop_transaction`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::ports::outbound::{
    Billing, InactivityClassifier, Locks, Notifications, Pricing, Roaming, SmartCharging,
    TemplateCatalog,
};
use crate::domain::RepositoryProvider;
use crate::support::{Clock, Scheduler};

/// Bundles every out-of-scope collaborator the core consumes through a
/// narrow trait. Each field is an `Arc<dyn Trait>` so a deployment can swap
/// a real billing/roaming/etc. implementation in without touching the core.
pub struct ChargingEngine {
    pub(crate) repos: Arc<dyn RepositoryProvider>,
    pub(crate) pricing: Arc<dyn Pricing>,
    pub(crate) billing: Arc<dyn Billing>,
    pub(crate) roaming: Arc<dyn Roaming>,
    pub(crate) smart_charging: Arc<dyn SmartCharging>,
    pub(crate) notifications: Arc<dyn Notifications>,
    pub(crate) locks: Arc<dyn Locks>,
    pub(crate) template_catalog: Arc<dyn TemplateCatalog>,
    pub(crate) inactivity_classifier: Arc<dyn InactivityClassifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) scheduler: Scheduler,
    pub(crate) config: AppConfig,
}

/// Everything [`ChargingEngine::new`] needs, grouped so the constructor
/// doesn't take a dozen positional `Arc`s.
pub struct ChargingEngineDeps {
    pub repos: Arc<dyn RepositoryProvider>,
    pub pricing: Arc<dyn Pricing>,
    pub billing: Arc<dyn Billing>,
    pub roaming: Arc<dyn Roaming>,
    pub smart_charging: Arc<dyn SmartCharging>,
    pub notifications: Arc<dyn Notifications>,
    pub locks: Arc<dyn Locks>,
    pub template_catalog: Arc<dyn TemplateCatalog>,
    pub inactivity_classifier: Arc<dyn InactivityClassifier>,
    pub clock: Arc<dyn Clock>,
}

impl ChargingEngine {
    pub fn new(deps: ChargingEngineDeps, config: AppConfig) -> Self {
        Self {
            repos: deps.repos,
            pricing: deps.pricing,
            billing: deps.billing,
            roaming: deps.roaming,
            smart_charging: deps.smart_charging,
            notifications: deps.notifications,
            locks: deps.locks,
            template_catalog: deps.template_catalog,
            inactivity_classifier: deps.inactivity_classifier,
            clock: deps.clock,
            scheduler: Scheduler::new(16),
            config,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Bound an outbound integration call with the configured per-call
    /// timeout. The caller decides what a
    /// timeout means for its own error category.
    pub(crate) async fn with_timeout<T, F>(&self, fut: F) -> Result<T, ()>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::time::timeout(Duration::from_millis(self.config.core.per_call_timeout_ms), fut)
            .await
            .map_err(|_| ())
    }

    /// Drain the deferred-work scheduler on shutdown: jobs get a real
    /// chance to finish instead of being abandoned mid-call.
    pub async fn drain(&self, timeout: Duration) {
        self.scheduler.drain(16, timeout).await;
    }
}
