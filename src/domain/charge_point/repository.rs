//! Charging station repository interface.

use async_trait::async_trait;

use super::model::ChargingStation;
use crate::domain::tenant::TenantId;
use crate::support::errors::CoreResult;

#[async_trait]
pub trait ChargingStationRepository: Send + Sync {
    async fn save(&self, station: ChargingStation) -> CoreResult<()>;
    async fn find_by_id(&self, tenant_id: TenantId, id: &str) -> CoreResult<Option<ChargingStation>>;

    /// A hot, compact write used for `lastSeen`/`currentIP` bumps (Heartbeat,
    /// StatusNotification) that should not require reloading and re-saving
    /// the whole station document.
    async fn touch_last_seen(
        &self,
        tenant_id: TenantId,
        id: &str,
        last_seen: chrono::DateTime<chrono::Utc>,
        current_ip: Option<String>,
    ) -> CoreResult<()>;
}
