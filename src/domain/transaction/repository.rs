//! Transaction repository interface.

use async_trait::async_trait;

use super::model::Transaction;
use crate::domain::tenant::TenantId;
use crate::support::errors::CoreResult;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn save(&self, transaction: Transaction) -> CoreResult<()>;
    async fn find_by_id(&self, tenant_id: TenantId, id: i64) -> CoreResult<Option<Transaction>>;
    async fn update(&self, transaction: Transaction) -> CoreResult<()>;
    async fn delete(&self, tenant_id: TenantId, id: i64) -> CoreResult<()>;

    async fn find_active_for_connector(
        &self,
        tenant_id: TenantId,
        charge_box_id: &str,
        connector_id: u32,
    ) -> CoreResult<Option<Transaction>>;

    /// The most recently started transaction on `(station, connectorId)`,
    /// open or stopped. Used by the Connector State Machine's "transition to
    /// Available after a completed transaction" policy to locate the
    /// just-finished session once the connector's `currentTransactionId`
    /// has already been cleared.
    async fn find_last_for_connector(
        &self,
        tenant_id: TenantId,
        charge_box_id: &str,
        connector_id: u32,
    ) -> CoreResult<Option<Transaction>>;

    /// Dense next-available integer per tenant.
    async fn next_transaction_id(&self, tenant_id: TenantId) -> CoreResult<i64>;
}
