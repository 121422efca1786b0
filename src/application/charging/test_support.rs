//! Shared in-memory test doubles for the charging engine's handler tests.
//! Not part of the public API — `#[cfg(test)]` only, pulled in by
//! `boot.rs`, `status.rs`, `start_transaction.rs`, `meter_values.rs`, and
//! `stop_transaction.rs` so each doesn't hand-roll its own `MemRepos`.

#![cfg(test)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::domain::charge_point::{ChargingStation, ChargingStationRepository, Connector};
use crate::domain::consumption::Consumption;
use crate::domain::id_tag::{IdTag, IdTagRepository, User, UserRepository};
use crate::domain::meter_value::MeterValue;
use crate::domain::ports::outbound::{
    Billing, InactivityClass, InactivityClassifier, LockHandle, Locks, Notifications, Pricing,
    PricingAction, Roaming, RoamingAction, RoamingProtocol, SmartCharging, TemplateApplicationResult,
    TemplateCatalog,
};
use crate::domain::registration_token::RegistrationToken;
use crate::domain::repositories::{
    ConsumptionRepository, MeterValueRepository, RegistrationTokenRepository, RepositoryProvider,
};
use crate::domain::tenant::TenantId;
use crate::domain::transaction::{Transaction, TransactionRepository};
use crate::support::clock::FixedClock;
use crate::support::errors::CoreResult;

use super::engine::{ChargingEngine, ChargingEngineDeps};

#[derive(Default)]
pub(crate) struct MemRepos {
    pub stations: Mutex<Vec<ChargingStation>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub consumptions: Mutex<Vec<Consumption>>,
    pub tags: Mutex<Vec<IdTag>>,
    pub users: Mutex<Vec<User>>,
    pub registration_tokens: Mutex<Vec<RegistrationToken>>,
}

#[async_trait]
impl ChargingStationRepository for MemRepos {
    async fn save(&self, station: ChargingStation) -> CoreResult<()> {
        let mut s = self.stations.lock().unwrap();
        s.retain(|existing| existing.id != station.id);
        s.push(station);
        Ok(())
    }
    async fn find_by_id(&self, _tenant_id: TenantId, id: &str) -> CoreResult<Option<ChargingStation>> {
        Ok(self.stations.lock().unwrap().iter().find(|s| s.id == id).cloned())
    }
    async fn touch_last_seen(&self, _tenant_id: TenantId, id: &str, last_seen: DateTime<Utc>, ip: Option<String>) -> CoreResult<()> {
        let mut stations = self.stations.lock().unwrap();
        if let Some(s) = stations.iter_mut().find(|s| s.id == id) {
            s.last_seen = Some(last_seen);
            if ip.is_some() {
                s.current_ip = ip;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemRepos {
    async fn save(&self, transaction: Transaction) -> CoreResult<()> {
        self.transactions.lock().unwrap().push(transaction);
        Ok(())
    }
    async fn find_by_id(&self, _tenant_id: TenantId, id: i64) -> CoreResult<Option<Transaction>> {
        Ok(self.transactions.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }
    async fn update(&self, transaction: Transaction) -> CoreResult<()> {
        let mut t = self.transactions.lock().unwrap();
        if let Some(slot) = t.iter_mut().find(|existing| existing.id == transaction.id) {
            *slot = transaction;
        }
        Ok(())
    }
    async fn delete(&self, _tenant_id: TenantId, id: i64) -> CoreResult<()> {
        self.transactions.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }
    async fn find_active_for_connector(&self, _tenant_id: TenantId, charge_box_id: &str, connector_id: u32) -> CoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.charge_box_id == charge_box_id && t.connector_id == connector_id && t.is_open())
            .cloned())
    }
    async fn find_last_for_connector(&self, _tenant_id: TenantId, charge_box_id: &str, connector_id: u32) -> CoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.charge_box_id == charge_box_id && t.connector_id == connector_id)
            .max_by_key(|t| t.timestamp)
            .cloned())
    }
    async fn next_transaction_id(&self, _tenant_id: TenantId) -> CoreResult<i64> {
        Ok(self.transactions.lock().unwrap().len() as i64 + 1)
    }
}

#[async_trait]
impl ConsumptionRepository for MemRepos {
    async fn save(&self, consumption: Consumption) -> CoreResult<()> {
        self.consumptions.lock().unwrap().push(consumption);
        Ok(())
    }
    async fn find_by_transaction(&self, _tenant_id: TenantId, transaction_id: i64) -> CoreResult<Vec<Consumption>> {
        Ok(self.consumptions.lock().unwrap().iter().filter(|c| c.transaction_id == transaction_id).cloned().collect())
    }
}

#[async_trait]
impl MeterValueRepository for MemRepos {
    async fn save(&self, _meter_value: MeterValue) -> CoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RegistrationTokenRepository for MemRepos {
    async fn find(&self, _tenant_id: TenantId, token: &str) -> CoreResult<Option<RegistrationToken>> {
        Ok(self.registration_tokens.lock().unwrap().iter().find(|t| t.token == token).cloned())
    }
}

#[async_trait]
impl IdTagRepository for MemRepos {
    async fn find_by_tag(&self, _tenant_id: TenantId, tag_id: &str) -> CoreResult<Option<IdTag>> {
        Ok(self.tags.lock().unwrap().iter().find(|t| t.tag_id == tag_id).cloned())
    }
}

#[async_trait]
impl UserRepository for MemRepos {
    async fn find_by_id(&self, _tenant_id: TenantId, id: &str) -> CoreResult<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }
    async fn clear_default_car(&self, _tenant_id: TenantId, id: &str) -> CoreResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(u) = users.iter_mut().find(|u| u.id == id) {
            u.default_car_id = None;
        }
        Ok(())
    }
}

impl RepositoryProvider for MemRepos {
    fn charging_stations(&self) -> &dyn ChargingStationRepository { self }
    fn transactions(&self) -> &dyn TransactionRepository { self }
    fn consumptions(&self) -> &dyn ConsumptionRepository { self }
    fn meter_values(&self) -> &dyn MeterValueRepository { self }
    fn id_tags(&self) -> &dyn IdTagRepository { self }
    fn users(&self) -> &dyn UserRepository { self }
    fn registration_tokens(&self) -> &dyn RegistrationTokenRepository { self }
}

pub(crate) struct NoopPricing;
#[async_trait]
impl Pricing for NoopPricing {
    async fn price(&self, _action: PricingAction, _t: &mut Transaction, _c: &mut Consumption) -> CoreResult<()> {
        Ok(())
    }
}

pub(crate) struct NoopBilling;
#[async_trait]
impl Billing for NoopBilling {
    async fn bill(&self, _action: PricingAction, _t: &Transaction) -> CoreResult<()> {
        Ok(())
    }
}

pub(crate) struct NoopRoaming;
#[async_trait]
impl Roaming for NoopRoaming {
    async fn process_session(&self, _p: RoamingProtocol, _a: RoamingAction, _t: &Transaction, _s: &ChargingStation) -> CoreResult<()> { Ok(()) }
    async fn push_cdr(&self, _p: RoamingProtocol, _t: &Transaction, _s: &ChargingStation) -> CoreResult<()> { Ok(()) }
    async fn push_connector_status(&self, _p: RoamingProtocol, _s: &ChargingStation, _c: &Connector) -> CoreResult<()> { Ok(()) }
}

pub(crate) struct NoopSmartCharging;
#[async_trait]
impl SmartCharging for NoopSmartCharging {
    async fn compute_and_apply(&self, _site_area_id: &str) -> CoreResult<()> { Ok(()) }
    async fn clear_tx_profile(&self, _transaction_id: i64) -> CoreResult<()> { Ok(()) }
}

pub(crate) struct NoopNotifications;
#[async_trait]
impl Notifications for NoopNotifications {
    async fn station_registered(&self, _s: &ChargingStation) -> CoreResult<()> { Ok(()) }
    async fn session_started(&self, _t: &Transaction) -> CoreResult<()> { Ok(()) }
    async fn end_of_charge(&self, _t: &Transaction) -> CoreResult<()> { Ok(()) }
    async fn optimal_charge_reached(&self, _t: &Transaction) -> CoreResult<()> { Ok(()) }
    async fn end_of_session(&self, _t: &Transaction) -> CoreResult<()> { Ok(()) }
    async fn end_of_signed_session(&self, _t: &Transaction) -> CoreResult<()> { Ok(()) }
    async fn status_error(&self, _s: &ChargingStation, _c: &Connector) -> CoreResult<()> { Ok(()) }
}

pub(crate) struct NoopTemplateCatalog;
#[async_trait]
impl TemplateCatalog for NoopTemplateCatalog {
    async fn apply_template(&self, _s: &mut ChargingStation) -> CoreResult<TemplateApplicationResult> {
        Ok(TemplateApplicationResult::default())
    }
}

pub(crate) struct NoopInactivityClassifier;
#[async_trait]
impl InactivityClassifier for NoopInactivityClassifier {
    async fn classify(&self, _s: &str, _c: u32, _secs: i64) -> CoreResult<InactivityClass> {
        Ok(InactivityClass::Info)
    }
}

pub(crate) struct NoopLocks;
#[async_trait]
impl Locks for NoopLocks {
    async fn acquire(&self, name: &str, _ttl_ms: u64) -> CoreResult<Option<LockHandle>> {
        Ok(Some(LockHandle { name: name.to_string(), token: uuid::Uuid::new_v4() }))
    }
    async fn release(&self, _handle: LockHandle) -> CoreResult<()> {
        Ok(())
    }
}

pub(crate) fn engine(repos: Arc<MemRepos>, now: DateTime<Utc>) -> ChargingEngine {
    ChargingEngine::new(
        ChargingEngineDeps {
            repos,
            pricing: Arc::new(NoopPricing),
            billing: Arc::new(NoopBilling),
            roaming: Arc::new(NoopRoaming),
            smart_charging: Arc::new(NoopSmartCharging),
            notifications: Arc::new(NoopNotifications),
            locks: Arc::new(NoopLocks),
            template_catalog: Arc::new(NoopTemplateCatalog),
            inactivity_classifier: Arc::new(NoopInactivityClassifier),
            clock: Arc::new(FixedClock::new(now)),
        },
        AppConfig::default(),
    )
}

pub(crate) fn station_with_open_connector(connector_id: u32, transaction_id: i64) -> ChargingStation {
    use crate::domain::ocpp::OcppVersion;
    let mut station = ChargingStation::new(TenantId::new(), "CB-1", "Acme", "X1", OcppVersion::V16);
    let mut connector = Connector::new(connector_id);
    connector.current_transaction_id = transaction_id;
    station.connectors.push(connector);
    station
}
