//! Connector State Machine — StatusNotification for `connectorId ==
//! 0` (informational only) and `connectorId >= 1` (the full policy set:
//! new-connector creation, no-change guard, the ABB-class recovery trigger,
//! extra-inactivity accounting, smart-charging and fault notifications).

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::charge_point::{ChargingStation, ConnectorStatus};
use crate::domain::consumption::Consumption;
use crate::domain::ports::outbound::{RoamingAction, RoamingProtocol};
use crate::domain::tenant::TenantId;
use crate::support::errors::{CoreError, CoreResult};

use super::engine::ChargingEngine;
use super::messages::{InboundHeader, StatusNotification, StatusResponse};

impl ChargingEngine {
    pub async fn handle_status_notification(
        &self,
        header: &InboundHeader,
        msg: StatusNotification,
    ) -> StatusResponse {
        if msg.connector_id == 0 {
            info!(station = %header.charge_box_identity, status = %msg.status, "StatusNotification connectorId=0, informational only");
            return StatusResponse;
        }

        if let Err(e) = self.apply_status_notification(header, msg).await {
            warn!(error = %e, station = %header.charge_box_identity, "StatusNotification handling failed");
        }
        StatusResponse
    }

    async fn apply_status_notification(
        &self,
        header: &InboundHeader,
        msg: StatusNotification,
    ) -> CoreResult<()> {
        let tenant_id = header.tenant_id;
        let mut station = self
            .repos
            .charging_stations()
            .find_by_id(tenant_id, &header.charge_box_identity)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?
            .ok_or_else(|| CoreError::resolution(format!("unknown station '{}'", header.charge_box_identity)))?;

        let is_new = station.connector(msg.connector_id).is_none();
        let connector = station.connector_or_create(msg.connector_id);
        if is_new {
            info!(station = %station.id, connector_id = msg.connector_id, "new connector observed");
        }

        // No-change guard: identical (status, errorCode, info) is
        // chatter, not a transition — log and stop without persisting.
        if !is_new
            && connector.status == msg.status
            && connector.error_code == msg.error_code
            && connector.info == msg.info
        {
            info!(station = %station.id, connector_id = msg.connector_id, status = %msg.status, "StatusNotification repeats current state, not persisted");
            return Ok(());
        }

        let previous_status = connector.status;
        let had_open_transaction = connector.has_open_transaction();

        connector.status = msg.status;
        connector.error_code = msg.error_code.clone();
        connector.info = msg.info.clone();
        connector.vendor_error_code = msg.vendor_error_code.clone();
        connector.status_last_changed_on = Some(msg.timestamp);

        if is_new {
            if let Err(e) = self.template_catalog.apply_template(&mut station).await {
                warn!(error = %e, station = %station.id, "template enrichment failed for new connector");
            }
        }

        station.resort_connectors();
        station.last_seen = Some(self.now());

        let connector_id = msg.connector_id;
        let transitioning_to_available = msg.status == ConnectorStatus::Available;

        self.repos
            .charging_stations()
            .save(station.clone())
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        // ABB-class bug: the station reports Available while a
        // transaction is still marked open on this connector.
        if transitioning_to_available && had_open_transaction {
            self.cleanup_active_transactions(tenant_id, &station.id, connector_id, msg.timestamp).await;
        } else if transitioning_to_available {
            self.on_available_after_completed_transaction(tenant_id, &station, connector_id, msg.timestamp)
                .await;
        }

        if matches!(msg.status, ConnectorStatus::Charging | ConnectorStatus::SuspendedEV) {
            if let Some(site_area_id) = station.site_area_id.clone() {
                let smart_charging = self.smart_charging.clone();
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = smart_charging.compute_and_apply(&site_area_id).await {
                        warn!(error = %e, site_area_id, "smart-charging reoptimization on charging transition failed");
                    }
                });
            }
        }

        if msg.status == ConnectorStatus::Faulted && previous_status != ConnectorStatus::Faulted {
            let notifications = self.notifications.clone();
            let station_for_notif = station.clone();
            if let Some(connector) = station_for_notif.connector(connector_id).cloned() {
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = notifications.status_error(&station_for_notif, &connector).await {
                        warn!(error = %e, "status_error notification failed");
                    }
                });
            }
        }

        if station.public {
            self.push_connector_status_to_roaming(&station, connector_id);
        }

        Ok(())
    }

    /// When a connector returns to `Available` and the most recent
    /// transaction on it has already stopped but not yet had its
    /// extra-inactivity gap computed, close that gap now, guarded by
    /// `extraInactivityComputed` so it runs at most once per transaction.
    async fn on_available_after_completed_transaction(
        &self,
        tenant_id: TenantId,
        station: &ChargingStation,
        connector_id: u32,
        notification_timestamp: DateTime<Utc>,
    ) {
        let last = match self.repos.transactions().find_last_for_connector(tenant_id, &station.id, connector_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, station = %station.id, connector_id, "extra-inactivity lookup failed");
                return;
            }
        };

        let Some(mut stop) = last.stop.clone() else { return };
        if stop.extra_inactivity_computed {
            return;
        }

        let mut transaction = last;
        let extra_secs = (notification_timestamp - stop.timestamp).num_seconds().max(0);
        stop.extra_inactivity_secs = extra_secs;
        stop.extra_inactivity_computed = true;
        stop.total_inactivity_secs += extra_secs;
        stop.inactivity_status = self
            .inactivity_classifier
            .classify(&station.id, connector_id, stop.total_inactivity_secs)
            .await
            .ok()
            .map(|c| c.to_string())
            .or(stop.inactivity_status.clone());
        transaction.stop = Some(stop.clone());

        if extra_secs > 0 {
            let extra = Consumption::new(
                tenant_id,
                transaction.id,
                stop.timestamp,
                notification_timestamp,
                0.0,
                0.0,
                0.0,
                stop.total_consumption_wh,
            );
            if let Err(e) = self.repos.consumptions().save(extra).await {
                warn!(error = %e, transaction_id = transaction.id, "failed to persist extra-inactivity consumption");
            }
        }

        if let Err(e) = self.repos.transactions().update(transaction.clone()).await {
            warn!(error = %e, transaction_id = transaction.id, "failed to persist extra-inactivity accounting");
            return;
        }

        self.push_cdr_once(tenant_id, &transaction, station);
    }

    /// CDR push, serialized behind the per-`(protocol, transactionId)`
    /// named lock so two concurrent Available transitions that both race to
    /// close out the same transaction can only push the CDR once.
    fn push_cdr_once(&self, tenant_id: TenantId, transaction: &crate::domain::transaction::Transaction, station: &ChargingStation) {
        let roaming = self.roaming.clone();
        let locks = self.locks.clone();
        let repos = self.repos.clone();
        let transaction = transaction.clone();
        let station = station.clone();
        self.scheduler.submit(std::time::Duration::ZERO, async move {
            let protocol = if transaction.ocpi_data.is_some() {
                Some(RoamingProtocol::A)
            } else if transaction.oicp_data.is_some() {
                Some(RoamingProtocol::B)
            } else {
                None
            };
            let Some(protocol) = protocol else { return };
            let lock_name = match protocol {
                RoamingProtocol::A => format!("{tenant_id}:ocpi-cdr:{}", transaction.id),
                RoamingProtocol::B => format!("{tenant_id}:oicp-cdr:{}", transaction.id),
            };
            let Ok(Some(handle)) = locks.acquire(&lock_name, 30_000).await else {
                info!(transaction_id = transaction.id, "CDR push lock not acquired, skipping (will be retried by a later trigger)");
                return;
            };

            if let Err(e) = roaming.process_session(protocol, RoamingAction::End, &transaction, &station).await {
                warn!(error = %e, transaction_id = transaction.id, "roaming end-of-session push failed");
            }
            if let Err(e) = roaming.push_cdr(protocol, &transaction, &station).await {
                warn!(error = %e, transaction_id = transaction.id, "CDR push failed");
            } else {
                let mut updated = transaction.clone();
                match protocol {
                    RoamingProtocol::A => {
                        if let Some(data) = &mut updated.ocpi_data {
                            data.cdr_pushed = true;
                        }
                    }
                    RoamingProtocol::B => {
                        if let Some(data) = &mut updated.oicp_data {
                            data.cdr_pushed = true;
                        }
                    }
                }
                if let Err(e) = repos.transactions().update(updated).await {
                    warn!(error = %e, transaction_id = transaction.id, "failed to record CDR push state");
                }
            }
            let _ = locks.release(handle).await;
        });
    }

    fn push_connector_status_to_roaming(&self, station: &ChargingStation, connector_id: u32) {
        let Some(connector) = station.connector(connector_id).cloned() else { return };
        let roaming = self.roaming.clone();
        let station = station.clone();
        self.scheduler.submit(std::time::Duration::ZERO, async move {
            for protocol in [RoamingProtocol::A, RoamingProtocol::B] {
                if let Err(e) = roaming.push_connector_status(protocol, &station, &connector).await {
                    warn!(error = %e, station = %station.id, connector_id = connector.connector_id, "best-effort connector status push failed");
                }
            }
        });
    }
}
