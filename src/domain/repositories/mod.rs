//! Per-aggregate repository traits and the `RepositoryProvider` that
//! bundles them — the single persistence port the core depends on. The
//! document store itself is treated as an external collaborator; this
//! module is the narrow contract that collaborator must satisfy.

use async_trait::async_trait;

use crate::domain::charge_point::ChargingStationRepository;
use crate::domain::consumption::Consumption;
use crate::domain::id_tag::{IdTagRepository, UserRepository};
use crate::domain::meter_value::MeterValue;
use crate::domain::registration_token::RegistrationToken;
use crate::domain::tenant::TenantId;
use crate::domain::transaction::TransactionRepository;
use crate::support::errors::CoreResult;

#[async_trait]
pub trait ConsumptionRepository: Send + Sync {
    async fn save(&self, consumption: Consumption) -> CoreResult<()>;
    async fn find_by_transaction(&self, tenant_id: TenantId, transaction_id: i64) -> CoreResult<Vec<Consumption>>;
}

#[async_trait]
pub trait MeterValueRepository: Send + Sync {
    async fn save(&self, meter_value: MeterValue) -> CoreResult<()>;
}

#[async_trait]
pub trait RegistrationTokenRepository: Send + Sync {
    async fn find(&self, tenant_id: TenantId, token: &str) -> CoreResult<Option<RegistrationToken>>;
}

/// Unified access to all domain repositories. Handlers request only the
/// repository they need rather than threading each one through separately.
pub trait RepositoryProvider: Send + Sync {
    fn charging_stations(&self) -> &dyn ChargingStationRepository;
    fn transactions(&self) -> &dyn TransactionRepository;
    fn consumptions(&self) -> &dyn ConsumptionRepository;
    fn meter_values(&self) -> &dyn MeterValueRepository;
    fn id_tags(&self) -> &dyn IdTagRepository;
    fn users(&self) -> &dyn UserRepository;
    fn registration_tokens(&self) -> &dyn RegistrationTokenRepository;
}
