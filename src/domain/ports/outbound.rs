//! Narrow outbound ports for every out-of-scope collaborator:
//! pricing, billing, roaming, smart-charging, notifications, the template
//! catalog, the inactivity classifier, and named locks. The core only ever
//! depends on these traits — never on a concrete pricing/billing/roaming
//! implementation.

use async_trait::async_trait;

use crate::domain::charge_point::{ChargingStation, Connector};
use crate::domain::consumption::Consumption;
use crate::domain::transaction::Transaction;
use crate::support::errors::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingAction {
    Start,
    Update,
    Stop,
}

/// Pricing is invoked inline; it may mutate both the consumption's pricing
/// snapshot and the transaction's running price totals.
#[async_trait]
pub trait Pricing: Send + Sync {
    async fn price(
        &self,
        action: PricingAction,
        transaction: &mut Transaction,
        consumption: &mut Consumption,
    ) -> CoreResult<()>;
}

/// Billing is invoked inline; failure is logged and treated as a soft
/// (category 5) error that never unwinds the already-committed transaction
/// state.
#[async_trait]
pub trait Billing: Send + Sync {
    async fn bill(&self, action: PricingAction, transaction: &Transaction) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamingProtocol {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoamingAction {
    Start,
    Update,
    Stop,
    End,
}

/// CPO/EMSP roaming bridges. `push_cdr` (the `End` action) must be called
/// behind the per-`(protocol, transactionId)` lock from [`Locks`] so a
/// duplicate CDR push is structurally impossible, not just unlikely.
#[async_trait]
pub trait Roaming: Send + Sync {
    async fn process_session(
        &self,
        protocol: RoamingProtocol,
        action: RoamingAction,
        transaction: &Transaction,
        station: &ChargingStation,
    ) -> CoreResult<()>;

    async fn push_cdr(
        &self,
        protocol: RoamingProtocol,
        transaction: &Transaction,
        station: &ChargingStation,
    ) -> CoreResult<()>;

    async fn push_connector_status(
        &self,
        protocol: RoamingProtocol,
        station: &ChargingStation,
        connector: &Connector,
    ) -> CoreResult<()>;
}

/// Smart-charging profile recomputation. Always invoked deferred, under the
/// per-site-area lock with a 30-second max hold.
#[async_trait]
pub trait SmartCharging: Send + Sync {
    async fn compute_and_apply(&self, site_area_id: &str) -> CoreResult<()>;
    async fn clear_tx_profile(&self, transaction_id: i64) -> CoreResult<()>;
}

/// Fully async, fire-and-forget, best-effort notifications. One method per
/// kind; callers swallow the error after logging it.
#[async_trait]
pub trait Notifications: Send + Sync {
    async fn station_registered(&self, station: &ChargingStation) -> CoreResult<()>;
    async fn session_started(&self, transaction: &Transaction) -> CoreResult<()>;
    async fn end_of_charge(&self, transaction: &Transaction) -> CoreResult<()>;
    async fn optimal_charge_reached(&self, transaction: &Transaction) -> CoreResult<()>;
    async fn end_of_session(&self, transaction: &Transaction) -> CoreResult<()>;
    async fn end_of_signed_session(&self, transaction: &Transaction) -> CoreResult<()>;
    async fn status_error(&self, station: &ChargingStation, connector: &Connector) -> CoreResult<()>;
}

/// Result of applying the vendor/model/firmware template to a station.
#[derive(Debug, Clone, Default)]
pub struct TemplateApplicationResult {
    pub updated: bool,
    pub ocpp_standard_updated: bool,
    pub ocpp_vendor_updated: bool,
}

/// Declarative per-vendor/model enrichment: connector types/power/phase
/// assignment plus recommended OCPP configuration keys. Application is
/// idempotent — applying the same template twice produces the same result
/// and does not re-flag `updated`.
#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    async fn apply_template(&self, station: &mut ChargingStation) -> CoreResult<TemplateApplicationResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityClass {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for InactivityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Thresholds live outside the core, in station/site configuration; the
/// core only ever consumes this classification.
#[async_trait]
pub trait InactivityClassifier: Send + Sync {
    async fn classify(
        &self,
        station_id: &str,
        connector_id: u32,
        total_inactivity_secs: i64,
    ) -> CoreResult<InactivityClass>;
}

/// Opaque handle returned by [`Locks::acquire`]; passed back unchanged to
/// [`Locks::release`].
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub name: String,
    pub token: uuid::Uuid,
}

/// Named per-aggregate exclusivity: CDR push, smart-charging recomputation,
/// and bulk-sync operations all serialize through this rather than an
/// in-process mutex, so the contract still holds if the core is ever run
/// as more than one process.
#[async_trait]
pub trait Locks: Send + Sync {
    async fn acquire(&self, name: &str, ttl_ms: u64) -> CoreResult<Option<LockHandle>>;
    async fn release(&self, handle: LockHandle) -> CoreResult<()>;
}
