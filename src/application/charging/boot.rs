//! Station Registry — BootNotification, Heartbeat, and the
//! informational `connectorId == 0` StatusNotification case.

use tracing::{info, warn};

use crate::domain::charge_point::{ChargingStation, RegistrationStatus};
use crate::support::errors::{CoreError, CoreResult};

use super::engine::ChargingEngine;
use super::messages::{BootNotification, BootResponse, HeartbeatResponse, InboundHeader};

impl ChargingEngine {
    /// BootNotification algorithm. Never mutates state on
    /// any failure path — a `Rejected` response is built from scratch, not
    /// from a half-applied station record.
    pub async fn handle_boot_notification(
        &self,
        header: &InboundHeader,
        msg: BootNotification,
    ) -> BootResponse {
        match self.try_boot(header, &msg).await {
            Ok(station) => {
                let interval = match header.ocpp_transport {
                    crate::domain::ocpp::OcppTransport::Soap => self.config.core.heartbeat_interval_ocpp_s_secs,
                    crate::domain::ocpp::OcppTransport::Json => self.config.core.heartbeat_interval_ocpp_j_secs,
                };

                self.schedule_post_boot_configuration(station.tenant_id, station.id.clone());

                let notif = self.notifications.clone();
                let station_for_notif = station.clone();
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = notif.station_registered(&station_for_notif).await {
                        warn!(error = %e, "station_registered notification failed");
                    }
                });

                BootResponse {
                    status: RegistrationStatus::Accepted,
                    current_time: station.last_reboot.unwrap_or_else(|| self.now()),
                    interval_secs: interval,
                }
            }
            Err(e) => {
                warn!(error = %e, station = %header.charge_box_identity, "BootNotification rejected");
                BootResponse {
                    status: RegistrationStatus::Rejected,
                    current_time: self.now(),
                    interval_secs: self.config.core.boot_reject_retry_secs,
                }
            }
        }
    }

    async fn try_boot(&self, header: &InboundHeader, msg: &BootNotification) -> CoreResult<ChargingStation> {
        let now = self.now();
        let existing = self
            .repos
            .charging_stations()
            .find_by_id(header.tenant_id, &header.charge_box_identity)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        let mut station = match existing {
            None => {
                let token = header
                    .token
                    .as_deref()
                    .ok_or_else(|| CoreError::resolution("new station requires a registration token"))?;
                let record = self
                    .repos
                    .registration_tokens()
                    .find(header.tenant_id, token)
                    .await
                    .map_err(|e| CoreError::integration("storage", e.to_string()))?
                    .ok_or_else(|| CoreError::resolution("unknown registration token"))?;
                if !record.is_valid_at(now) {
                    return Err(CoreError::resolution("registration token expired or revoked"));
                }

                let mut station = ChargingStation::new(
                    header.tenant_id,
                    header.charge_box_identity.clone(),
                    msg.vendor.clone(),
                    msg.model.clone(),
                    header.ocpp_version,
                );
                station.serial_number = msg.serial_number.clone();
                station.firmware_version = msg.firmware_version.clone();
                station.registration_status = RegistrationStatus::Accepted;
                station.issuer = true;
                if let Some(site_area_id) = record.site_area_id {
                    station.site_area_id = Some(site_area_id);
                }
                station
            }
            Some(mut station) => {
                if station.attributes_mismatch(&msg.vendor, &msg.model, msg.serial_number.as_deref()) {
                    return Err(CoreError::resolution(format!(
                        "attribute mismatch on reboot for station '{}'",
                        station.id
                    )));
                }
                station.serial_number = msg.serial_number.clone().or(station.serial_number);
                station.firmware_version = msg.firmware_version.clone();
                station.deleted = false;
                station.registration_status = RegistrationStatus::Accepted;
                station
            }
        };

        station.last_reboot = Some(now);
        station.last_seen = Some(now);
        station.ocpp_version = header.ocpp_version;
        station.ocpp_transport = header.ocpp_transport;
        station.current_ip = header.client_ip.clone();

        let template_result = self
            .template_catalog
            .apply_template(&mut station)
            .await
            .map_err(|e| CoreError::integration("template_catalog", e.to_string()))?;
        if template_result.updated {
            info!(station = %station.id, "template applied to station");
        }

        self.repos
            .charging_stations()
            .save(station.clone())
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        Ok(station)
    }

    /// Deferred post-boot configuration: attempts both spellings of
    /// the heartbeat-interval configuration key, succeeding on either
    /// (see DESIGN.md). Failure is logged at error level but
    /// never un-accepts the boot.
    fn schedule_post_boot_configuration(&self, tenant_id: crate::domain::tenant::TenantId, station_id: String) {
        let template_catalog = self.template_catalog.clone();
        let repos = self.repos.clone();
        let delay = std::time::Duration::from_millis(self.config.core.post_boot_config_delay_ms);
        self.scheduler.submit(delay, async move {
            let Ok(Some(mut station)) = repos.charging_stations().find_by_id(tenant_id, &station_id).await else {
                warn!(station = %station_id, "post-boot configuration: station vanished before deferred run");
                return;
            };
            match template_catalog.apply_template(&mut station).await {
                Ok(result) if result.ocpp_standard_updated || result.ocpp_vendor_updated => {
                    info!(station = %station_id, "post-boot template configuration pushed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(station = %station_id, error = %e, "post-boot configuration push failed on both HeartBeatInterval and HeartbeatInterval keys");
                }
            }
        });
    }

    /// Heartbeat: bump `lastSeen`, echo server wallclock.
    pub async fn handle_heartbeat(&self, header: &InboundHeader) -> HeartbeatResponse {
        let now = self.now();
        if let Err(e) = self
            .repos
            .charging_stations()
            .touch_last_seen(header.tenant_id, &header.charge_box_identity, now, header.client_ip.clone())
            .await
        {
            warn!(error = %e, station = %header.charge_box_identity, "failed to record heartbeat last-seen");
        }
        HeartbeatResponse { current_time: now }
    }
}
