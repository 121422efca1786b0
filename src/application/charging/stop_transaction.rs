//! StopTransaction handling and the active-transaction cleanup/recovery
//! loop it shares with the Connector State Machine.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::consumption::PricingSnapshot;
use crate::domain::meter_value::{
    MeterContext, MeterFormat, MeterLocation, MeterUnit, MeterValue, MeterValueData, Measurand,
};
use crate::domain::ports::outbound::PricingAction;
use crate::domain::tenant::TenantId;
use crate::domain::transaction::{Transaction, TransactionStop, UserSnapshot};
use crate::support::errors::{CoreError, CoreResult};

use super::consumption_builder::build_consumption_intervals;
use super::engine::ChargingEngine;
use super::messages::{InboundHeader, StopTransaction, StopTransactionResponse};

/// The wire-supplied pieces of a station-initiated stop. `None` at the call
/// site means a soft (recovery-driven) stop instead: no stopper-tag
/// authorization, and `meterStop` synthesized from the transaction's last
/// known cumulative.
struct WireStop {
    id_tag: Option<String>,
    meter_stop: f64,
    transaction_data: Option<Vec<MeterValue>>,
}

impl ChargingEngine {
    pub async fn handle_stop_transaction(
        &self,
        header: &InboundHeader,
        msg: StopTransaction,
    ) -> CoreResult<StopTransactionResponse> {
        if msg.transaction_id == 0 {
            info!(station = %header.charge_box_identity, "StopTransaction with transactionId=0, accepting without side effects");
            return Ok(StopTransactionResponse { status: super::messages::IdTagStatus::Accepted });
        }

        if msg.transaction_data_invalid {
            info!(
                station = %header.charge_box_identity,
                transaction_id = msg.transaction_id,
                "StopTransaction transactionData shape does not match the station's declared OCPP version, rejecting as Invalid without mutating state"
            );
            return Ok(StopTransactionResponse { status: super::messages::IdTagStatus::Invalid });
        }

        let wire = WireStop {
            id_tag: msg.id_tag,
            meter_stop: msg.meter_stop,
            transaction_data: msg.transaction_data,
        };
        self.stop_transaction(header.tenant_id, msg.transaction_id, msg.timestamp, Some(wire)).await?;
        Ok(StopTransactionResponse { status: super::messages::IdTagStatus::Accepted })
    }

    /// Shared stop algorithm for both the wire-driven call and the
    /// recovery loop (`wire = None`).
    async fn stop_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: i64,
        timestamp: DateTime<Utc>,
        wire: Option<WireStop>,
    ) -> CoreResult<()> {
        let mut transaction = self
            .repos
            .transactions()
            .find_by_id(tenant_id, transaction_id)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?
            .ok_or_else(|| CoreError::state(format!("transaction {transaction_id} not found")))?;

        if transaction.stop.is_some() {
            return Err(CoreError::state(format!("transaction {transaction_id} already stopped")));
        }

        let soft = wire.is_none();
        let provided_tag = wire.as_ref().and_then(|w| w.id_tag.as_deref());
        let stopper_tag = transaction.effective_stopper_tag(provided_tag, timestamp);

        if !soft && !transaction.is_remote_stop_soft() {
            let station_public = station_public(self, tenant_id, &transaction.charge_box_id).await;
            let auth = self.resolve_authorization(tenant_id, &stopper_tag, station_public).await;
            if !auth.is_accepted() {
                return Err(CoreError::authorization(format!(
                    "stopper tag '{stopper_tag}' not authorized to stop transaction {transaction_id}"
                )));
            }
        }

        self.free_connector(tenant_id, &transaction.charge_box_id, transaction.connector_id).await;

        let meter_stop = match &wire {
            Some(w) => w.meter_stop,
            None => transaction.last_consumption_wh.unwrap_or(transaction.meter_start),
        };

        transaction.reset_instants_for_end();

        let mut closing_values: Vec<MeterValue> = wire
            .as_ref()
            .and_then(|w| w.transaction_data.clone())
            .unwrap_or_default();
        closing_values.push(MeterValue {
            station_id: transaction.charge_box_id.clone(),
            connector_id: transaction.connector_id,
            transaction_id: Some(transaction.id),
            timestamp,
            context: MeterContext::TransactionEnd,
            format: MeterFormat::Raw,
            measurand: Measurand::EnergyActiveImportRegister,
            location: MeterLocation::Outlet,
            unit: MeterUnit::Wh,
            phase: None,
            value: MeterValueData::Numeric(meter_stop),
        });

        for value in &closing_values {
            if value.measurand == Measurand::SignedData && value.context == MeterContext::TransactionEnd {
                if let MeterValueData::Signed(bytes) = &value.value {
                    transaction.stop_signed_data = Some(bytes.clone());
                }
            }
        }

        let intervals = build_consumption_intervals(tenant_id, &mut transaction, &closing_values);
        let mut last_pricing: Option<PricingSnapshot> = None;
        for mut interval in intervals {
            if let Err(e) = self.pricing.price(PricingAction::Stop, &mut transaction, &mut interval).await {
                warn!(error = %e, transaction_id, "pricing failed on stop, consumption interval left unpriced");
            }
            if interval.pricing.is_some() {
                last_pricing = interval.pricing.clone();
            }
            if let Err(e) = self.billing.bill(PricingAction::Stop, &transaction).await {
                warn!(error = %e, transaction_id, "billing failed on stop");
            }
            if let Err(e) = self.repos.consumptions().save(interval).await {
                warn!(error = %e, transaction_id, "failed to persist closing consumption interval");
            }
        }

        let total_duration_secs = (timestamp - transaction.timestamp).num_seconds().max(0);
        let inactivity_status = self
            .inactivity_classifier
            .classify(&transaction.charge_box_id, transaction.connector_id, transaction.current_total_inactivity_secs)
            .await
            .ok()
            .map(|c| c.to_string());

        let user_snapshot = match &transaction.user_id {
            Some(uid) => self
                .repos
                .users()
                .find_by_id(tenant_id, uid)
                .await
                .ok()
                .flatten()
                .map(|u| UserSnapshot { user_id: u.id, name: u.name, email: u.email }),
            None => None,
        };

        transaction.stop = Some(TransactionStop {
            timestamp,
            meter_stop,
            tag_id: Some(stopper_tag),
            total_consumption_wh: transaction.current_total_consumption_wh,
            total_inactivity_secs: transaction.current_total_inactivity_secs,
            inactivity_status,
            total_duration_secs,
            extra_inactivity_secs: 0,
            extra_inactivity_computed: false,
            state_of_charge: transaction.current_state_of_charge,
            price: last_pricing.as_ref().map(|p| p.price),
            rounded_price: last_pricing.as_ref().map(|p| p.rounded_price),
            price_unit: last_pricing.as_ref().map(|p| p.price_unit.clone()),
            pricing_source: last_pricing.as_ref().map(|p| p.pricing_source.clone()),
            user_snapshot,
            signed_data: transaction.stop_signed_data.clone(),
        });

        let has_signed_data = transaction.stop_signed_data.is_some();
        self.repos
            .transactions()
            .update(transaction.clone())
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        let notifications = self.notifications.clone();
        let tx_for_notif = transaction.clone();
        self.scheduler.submit(std::time::Duration::ZERO, async move {
            if let Err(e) = notifications.end_of_session(&tx_for_notif).await {
                warn!(error = %e, "end_of_session notification failed");
            }
            if has_signed_data {
                if let Err(e) = notifications.end_of_signed_session(&tx_for_notif).await {
                    warn!(error = %e, "end_of_signed_session notification failed");
                }
            }
        });

        if let Some(site_area_id) = transaction.site_area_id.clone() {
            let smart_charging = self.smart_charging.clone();
            let delay = std::time::Duration::from_millis(self.config.core.smart_charging_delay_ms);
            let tx_id = transaction.id;
            self.scheduler.submit(delay, async move {
                if let Err(e) = smart_charging.clear_tx_profile(tx_id).await {
                    warn!(error = %e, transaction_id = tx_id, "clear_tx_profile failed");
                }
                if let Err(e) = smart_charging.compute_and_apply(&site_area_id).await {
                    warn!(error = %e, site_area_id, "post-stop smart-charging reoptimization failed");
                }
            });
        }

        Ok(())
    }

    async fn free_connector(&self, tenant_id: TenantId, charge_box_id: &str, connector_id: u32) {
        let Ok(Some(mut station)) = self.repos.charging_stations().find_by_id(tenant_id, charge_box_id).await else {
            return;
        };
        if let Some(connector) = station.connector_mut(connector_id) {
            connector.clear_transaction();
        }
        if let Err(e) = self.repos.charging_stations().save(station).await {
            warn!(error = %e, station = charge_box_id, "failed to persist station after freeing connector");
        }
    }

    /// Invoked on StartTransaction and on a StatusNotification that
    /// reports `Available` while `currentTransactionId > 0`. Stops or deletes
    /// whatever is found active on `(station, connectorId)` until nothing is
    /// left, guarding against a non-terminating loop via a fixed-point check.
    pub async fn cleanup_active_transactions(
        &self,
        tenant_id: TenantId,
        charge_box_id: &str,
        connector_id: u32,
        now: DateTime<Utc>,
    ) {
        let mut last_seen_id: Option<i64> = None;
        loop {
            let active = match self
                .repos
                .transactions()
                .find_active_for_connector(tenant_id, charge_box_id, connector_id)
                .await
            {
                Ok(Some(t)) => t,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, station = charge_box_id, connector_id, "active-transaction lookup failed during recovery");
                    return;
                }
            };

            if last_seen_id == Some(active.id) {
                warn!(transaction_id = active.id, "active-transaction cleanup made no progress, stopping to avoid looping forever");
                return;
            }
            last_seen_id = Some(active.id);

            if active.current_total_consumption_wh <= 0.0 {
                if let Err(e) = self.repos.transactions().delete(tenant_id, active.id).await {
                    warn!(error = %e, transaction_id = active.id, "failed to delete empty recovered transaction");
                    return;
                }
                self.free_connector(tenant_id, charge_box_id, connector_id).await;
            } else if let Err(e) = self.stop_transaction(tenant_id, active.id, now, None).await {
                warn!(error = %e, transaction_id = active.id, "recovery soft-stop failed");
                return;
            }
        }
    }
}

async fn station_public(engine: &ChargingEngine, tenant_id: TenantId, charge_box_id: &str) -> bool {
    engine
        .repos
        .charging_stations()
        .find_by_id(tenant_id, charge_box_id)
        .await
        .ok()
        .flatten()
        .map(|s| s.public)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::charging::test_support::{engine, station_with_open_connector, MemRepos};
    use crate::domain::ocpp::OcppVersion;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn transaction_id_zero_is_accepted_without_side_effects() {
        let repos = Arc::new(MemRepos::default());
        let now = Utc::now();
        let engine = engine(repos, now);
        let header = InboundHeader {
            tenant_id: TenantId::new(),
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: crate::domain::ocpp::OcppTransport::Json,
            token: None,
            soap_from: None,
            received_at: now,
        };
        let msg = StopTransaction { transaction_id: 0, id_tag: None, meter_stop: 0.0, timestamp: now, transaction_data: None, transaction_data_invalid: false };
        let resp = engine.handle_stop_transaction(&header, msg).await.unwrap();
        assert_eq!(resp.status, super::super::messages::IdTagStatus::Accepted);
    }

    #[tokio::test]
    async fn missing_transaction_is_a_state_error() {
        let repos = Arc::new(MemRepos::default());
        let now = Utc::now();
        let tenant_id = TenantId::new();
        let engine = engine(repos, now);
        let header = InboundHeader {
            tenant_id,
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: crate::domain::ocpp::OcppTransport::Json,
            token: None,
            soap_from: None,
            received_at: now,
        };
        let msg = StopTransaction { transaction_id: 42, id_tag: Some("TAG-1".to_string()), meter_stop: 100.0, timestamp: now, transaction_data: None, transaction_data_invalid: false };
        let err = engine.handle_stop_transaction(&header, msg).await.unwrap_err();
        assert!(matches!(err, CoreError::State(_)));
    }

    #[tokio::test]
    async fn already_stopped_transaction_is_rejected_idempotently() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let mut t = Transaction::new(tenant_id, 1, "CB-1", 1, "TAG-1", 0.0, now - Duration::seconds(120));
        t.stop = Some(TransactionStop {
            timestamp: now,
            meter_stop: 1000.0,
            tag_id: Some("TAG-1".to_string()),
            total_consumption_wh: 1000.0,
            total_inactivity_secs: 0,
            inactivity_status: None,
            total_duration_secs: 120,
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
        repos.transactions.lock().unwrap().push(t);
        let engine = engine(repos, now);
        let header = InboundHeader {
            tenant_id,
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: crate::domain::ocpp::OcppTransport::Json,
            token: None,
            soap_from: None,
            received_at: now,
        };
        let msg = StopTransaction { transaction_id: 1, id_tag: Some("TAG-1".to_string()), meter_stop: 1000.0, timestamp: now, transaction_data: None, transaction_data_invalid: false };
        let err = engine.handle_stop_transaction(&header, msg).await.unwrap_err();
        assert!(matches!(err, CoreError::State(_)));
    }

    #[tokio::test]
    async fn recovery_deletes_empty_transaction_and_frees_connector() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let t = Transaction::new(tenant_id, 7, "CB-1", 1, "TAG-1", 0.0, now - Duration::seconds(60));
        repos.transactions.lock().unwrap().push(t);
        repos.stations.lock().unwrap().push(station_with_open_connector(1, 7));

        let engine = engine(repos.clone(), now);
        engine.cleanup_active_transactions(tenant_id, "CB-1", 1, now).await;

        assert!(repos.transactions.lock().unwrap().is_empty());
        let station = repos.stations.lock().unwrap()[0].clone();
        assert_eq!(station.connector(1).unwrap().current_transaction_id, 0);
    }

    #[tokio::test]
    async fn recovery_soft_stops_transaction_with_consumption() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let mut t = Transaction::new(tenant_id, 9, "CB-1", 1, "TAG-1", 0.0, now - Duration::seconds(600));
        t.current_total_consumption_wh = 5000.0;
        t.last_consumption_at = Some(now - Duration::seconds(60));
        t.last_consumption_wh = Some(5000.0);
        repos.transactions.lock().unwrap().push(t);
        repos.stations.lock().unwrap().push(station_with_open_connector(1, 9));

        let engine = engine(repos.clone(), now);
        engine.cleanup_active_transactions(tenant_id, "CB-1", 1, now).await;

        let stopped = repos.transactions.lock().unwrap().iter().find(|t| t.id == 9).cloned().unwrap();
        assert!(stopped.stop.is_some());
        assert_eq!(stopped.stop.as_ref().unwrap().meter_stop, 5000.0);
        let station = repos.stations.lock().unwrap()[0].clone();
        assert_eq!(station.connector(1).unwrap().current_transaction_id, 0);
    }

    #[tokio::test]
    async fn mismatched_transaction_data_is_rejected_as_invalid_without_mutation() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let t = Transaction::new(tenant_id, 5, "CB-1", 1, "TAG-1", 0.0, now - Duration::seconds(60));
        repos.transactions.lock().unwrap().push(t);
        repos.stations.lock().unwrap().push(station_with_open_connector(1, 5));

        let engine = engine(repos.clone(), now);
        let header = InboundHeader {
            tenant_id,
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V15,
            ocpp_transport: crate::domain::ocpp::OcppTransport::Soap,
            token: None,
            soap_from: None,
            received_at: now,
        };
        let msg = StopTransaction {
            transaction_id: 5,
            id_tag: Some("TAG-1".to_string()),
            meter_stop: 1000.0,
            timestamp: now,
            transaction_data: None,
            transaction_data_invalid: true,
        };
        let resp = engine.handle_stop_transaction(&header, msg).await.unwrap();
        assert_eq!(resp.status, super::super::messages::IdTagStatus::Invalid);

        let unchanged = repos.transactions.lock().unwrap().iter().find(|t| t.id == 5).cloned().unwrap();
        assert!(unchanged.stop.is_none(), "a version-mismatched stop must not mutate the transaction");
        let station = repos.stations.lock().unwrap()[0].clone();
        assert_eq!(station.connector(1).unwrap().current_transaction_id, 5, "the connector must not be freed either");

        // A follow-up stop without transactionData is accepted normally.
        let follow_up = StopTransaction {
            transaction_id: 5,
            id_tag: Some("TAG-1".to_string()),
            meter_stop: 1000.0,
            timestamp: now,
            transaction_data: None,
            transaction_data_invalid: false,
        };
        let resp = engine.handle_stop_transaction(&header, follow_up).await.unwrap();
        assert_eq!(resp.status, super::super::messages::IdTagStatus::Accepted);
    }

    #[tokio::test]
    async fn transaction_end_signed_data_lands_on_stop_not_start() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let mut t = Transaction::new(tenant_id, 3, "CB-1", 1, "TAG-1", 0.0, now - Duration::seconds(60));
        t.signed_data = Some(b"start-blob".to_vec());
        repos.transactions.lock().unwrap().push(t);
        repos.stations.lock().unwrap().push(station_with_open_connector(1, 3));

        let engine = engine(repos.clone(), now);
        let header = InboundHeader {
            tenant_id,
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: crate::domain::ocpp::OcppTransport::Json,
            token: None,
            soap_from: None,
            received_at: now,
        };
        let signed_end_value = MeterValue {
            station_id: "CB-1".to_string(),
            connector_id: 1,
            transaction_id: Some(3),
            timestamp: now,
            context: MeterContext::TransactionEnd,
            format: MeterFormat::SignedData,
            measurand: Measurand::SignedData,
            location: MeterLocation::Outlet,
            unit: MeterUnit::Wh,
            phase: None,
            value: MeterValueData::Signed(b"end-blob".to_vec()),
        };
        let msg = StopTransaction {
            transaction_id: 3,
            id_tag: Some("TAG-1".to_string()),
            meter_stop: 0.0,
            timestamp: now,
            transaction_data: Some(vec![signed_end_value]),
            transaction_data_invalid: false,
        };
        engine.handle_stop_transaction(&header, msg).await.unwrap();

        let stopped = repos.transactions.lock().unwrap().iter().find(|t| t.id == 3).cloned().unwrap();
        assert_eq!(stopped.signed_data, Some(b"start-blob".to_vec()), "the Begin snapshot must be untouched");
        assert_eq!(
            stopped.stop.as_ref().unwrap().signed_data,
            Some(b"end-blob".to_vec()),
            "the End capture must land on the stop block"
        );
    }
}
