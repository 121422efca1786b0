//! `DashMap`-backed reference storage adapter. Persistence is an
//! out-of-scope collaborator; this is the narrowest implementation that
//! satisfies [`RepositoryProvider`] for tests and standalone operation.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::charge_point::{ChargingStation, ChargingStationRepository};
use crate::domain::consumption::Consumption;
use crate::domain::id_tag::{IdTag, IdTagRepository, User, UserRepository};
use crate::domain::meter_value::MeterValue;
use crate::domain::registration_token::RegistrationToken;
use crate::domain::repositories::{
    ConsumptionRepository, MeterValueRepository, RegistrationTokenRepository, RepositoryProvider,
};
use crate::domain::tenant::TenantId;
use crate::domain::transaction::{Transaction, TransactionRepository};
use crate::support::errors::CoreResult;

/// Every station/transaction/consumption/tag record, keyed by `(tenant_id,
/// natural key)` so a single process can serve many tenants without
/// cross-tenant leakage.
#[derive(Default)]
pub struct MemoryRepositoryProvider {
    stations: DashMap<(TenantId, String), ChargingStation>,
    transactions: DashMap<(TenantId, i64), Transaction>,
    consumptions: DashMap<(TenantId, i64), Vec<Consumption>>,
    meter_values: DashMap<String, Vec<MeterValue>>,
    id_tags: DashMap<(TenantId, String), IdTag>,
    users: DashMap<(TenantId, String), User>,
    registration_tokens: DashMap<(TenantId, String), RegistrationToken>,
    next_transaction_id: DashMap<TenantId, AtomicI64>,
}

impl MemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registration token ahead of a station's first boot. Exposed
    /// for tests and for a standalone deployment's bootstrap script; the
    /// core itself never calls this.
    pub fn seed_registration_token(&self, token: RegistrationToken) {
        self.registration_tokens.insert((token.tenant_id, token.token.clone()), token);
    }

    pub fn seed_id_tag(&self, tag: IdTag) {
        self.id_tags.insert((tag.tenant_id, tag.tag_id.clone()), tag);
    }

    pub fn seed_user(&self, user: User) {
        self.users.insert((user.tenant_id, user.id.clone()), user);
    }
}

#[async_trait]
impl ChargingStationRepository for MemoryRepositoryProvider {
    async fn save(&self, station: ChargingStation) -> CoreResult<()> {
        self.stations.insert((station.tenant_id, station.id.clone()), station);
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, id: &str) -> CoreResult<Option<ChargingStation>> {
        Ok(self.stations.get(&(tenant_id, id.to_string())).map(|r| r.clone()))
    }

    async fn touch_last_seen(
        &self,
        tenant_id: TenantId,
        id: &str,
        last_seen: DateTime<Utc>,
        current_ip: Option<String>,
    ) -> CoreResult<()> {
        if let Some(mut station) = self.stations.get_mut(&(tenant_id, id.to_string())) {
            station.last_seen = Some(last_seen);
            if current_ip.is_some() {
                station.current_ip = current_ip;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryRepositoryProvider {
    async fn save(&self, transaction: Transaction) -> CoreResult<()> {
        self.transactions.insert((transaction.tenant_id, transaction.id), transaction);
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, id: i64) -> CoreResult<Option<Transaction>> {
        Ok(self.transactions.get(&(tenant_id, id)).map(|r| r.clone()))
    }

    async fn update(&self, transaction: Transaction) -> CoreResult<()> {
        self.transactions.insert((transaction.tenant_id, transaction.id), transaction);
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, id: i64) -> CoreResult<()> {
        self.transactions.remove(&(tenant_id, id));
        Ok(())
    }

    async fn find_active_for_connector(
        &self,
        tenant_id: TenantId,
        charge_box_id: &str,
        connector_id: u32,
    ) -> CoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .map(|r| r.value().clone())
            .find(|t| t.tenant_id == tenant_id && t.charge_box_id == charge_box_id && t.connector_id == connector_id && t.is_open()))
    }

    async fn find_last_for_connector(
        &self,
        tenant_id: TenantId,
        charge_box_id: &str,
        connector_id: u32,
    ) -> CoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .map(|r| r.value().clone())
            .filter(|t| t.tenant_id == tenant_id && t.charge_box_id == charge_box_id && t.connector_id == connector_id)
            .max_by_key(|t| t.timestamp))
    }

    async fn next_transaction_id(&self, tenant_id: TenantId) -> CoreResult<i64> {
        let counter = self.next_transaction_id.entry(tenant_id).or_insert_with(|| AtomicI64::new(1));
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ConsumptionRepository for MemoryRepositoryProvider {
    async fn save(&self, consumption: Consumption) -> CoreResult<()> {
        self.consumptions
            .entry((consumption.tenant_id, consumption.transaction_id))
            .or_default()
            .push(consumption);
        Ok(())
    }

    async fn find_by_transaction(&self, tenant_id: TenantId, transaction_id: i64) -> CoreResult<Vec<Consumption>> {
        Ok(self.consumptions.get(&(tenant_id, transaction_id)).map(|r| r.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl MeterValueRepository for MemoryRepositoryProvider {
    async fn save(&self, meter_value: MeterValue) -> CoreResult<()> {
        // Meter values carry no tenant id of their own; they're scoped by
        // station id, which is unique enough for the reference adapter.
        self.meter_values.entry(meter_value.station_id.clone()).or_default().push(meter_value);
        Ok(())
    }
}

#[async_trait]
impl RegistrationTokenRepository for MemoryRepositoryProvider {
    async fn find(&self, tenant_id: TenantId, token: &str) -> CoreResult<Option<RegistrationToken>> {
        Ok(self.registration_tokens.get(&(tenant_id, token.to_string())).map(|r| r.clone()))
    }
}

#[async_trait]
impl IdTagRepository for MemoryRepositoryProvider {
    async fn find_by_tag(&self, tenant_id: TenantId, tag_id: &str) -> CoreResult<Option<IdTag>> {
        Ok(self.id_tags.get(&(tenant_id, tag_id.to_string())).map(|r| r.clone()))
    }
}

#[async_trait]
impl UserRepository for MemoryRepositoryProvider {
    async fn find_by_id(&self, tenant_id: TenantId, user_id: &str) -> CoreResult<Option<User>> {
        Ok(self.users.get(&(tenant_id, user_id.to_string())).map(|r| r.clone()))
    }

    async fn clear_default_car(&self, tenant_id: TenantId, user_id: &str) -> CoreResult<()> {
        if let Some(mut user) = self.users.get_mut(&(tenant_id, user_id.to_string())) {
            user.default_car_id = None;
        }
        Ok(())
    }
}

impl RepositoryProvider for MemoryRepositoryProvider {
    fn charging_stations(&self) -> &dyn ChargingStationRepository {
        self
    }
    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }
    fn consumptions(&self) -> &dyn ConsumptionRepository {
        self
    }
    fn meter_values(&self) -> &dyn MeterValueRepository {
        self
    }
    fn id_tags(&self) -> &dyn IdTagRepository {
        self
    }
    fn users(&self) -> &dyn UserRepository {
        self
    }
    fn registration_tokens(&self) -> &dyn RegistrationTokenRepository {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ocpp::OcppVersion;

    #[tokio::test]
    async fn next_transaction_id_is_dense_per_tenant() {
        let repos = MemoryRepositoryProvider::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        assert_eq!(repos.next_transaction_id(tenant_a).await.unwrap(), 1);
        assert_eq!(repos.next_transaction_id(tenant_a).await.unwrap(), 2);
        assert_eq!(repos.next_transaction_id(tenant_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn station_round_trips() {
        let repos = MemoryRepositoryProvider::new();
        let tenant_id = TenantId::new();
        let station = ChargingStation::new(tenant_id, "CB-1", "Acme", "X1", OcppVersion::V16);
        repos.save(station.clone()).await.unwrap();
        let found = repos.find_by_id(tenant_id, "CB-1").await.unwrap().unwrap();
        assert_eq!(found.vendor, "Acme");
    }

    #[tokio::test]
    async fn active_transaction_lookup_ignores_stopped_sessions() {
        let repos = MemoryRepositoryProvider::new();
        let tenant_id = TenantId::new();
        let mut t = Transaction::new(tenant_id, 1, "CB-1", 1, "TAG", 0.0, Utc::now());
        repos.save(t.clone()).await.unwrap();
        assert!(repos.find_active_for_connector(tenant_id, "CB-1", 1).await.unwrap().is_some());

        t.stop = Some(crate::domain::transaction::model::TransactionStop {
            timestamp: Utc::now(),
            meter_stop: 10.0,
            tag_id: None,
            total_consumption_wh: 10.0,
            total_inactivity_secs: 0,
            inactivity_status: None,
            total_duration_secs: 60,
            extra_inactivity_secs: 0,
            extra_inactivity_computed: false,
            state_of_charge: None,
            price: None,
            rounded_price: None,
            price_unit: None,
            pricing_source: None,
            user_snapshot: None,
            signed_data: None,
        });
        repos.update(t).await.unwrap();
        assert!(repos.find_active_for_connector(tenant_id, "CB-1", 1).await.unwrap().is_none());
    }
}
