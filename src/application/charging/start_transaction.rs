//! StartTransaction handling.

use std::time::Duration;

use tracing::warn;

use crate::domain::consumption::Consumption;
use crate::domain::ports::outbound::{PricingAction, RoamingAction, RoamingProtocol};
use crate::domain::transaction::{RoamingSessionData, Transaction};
use crate::support::errors::{CoreError, CoreResult};

use super::authorize::to_wire;
use super::engine::ChargingEngine;
use super::messages::{IdTagStatus, InboundHeader, StartTransaction, StartTransactionResponse};

impl ChargingEngine {
    pub async fn handle_start_transaction(
        &self,
        header: &InboundHeader,
        msg: StartTransaction,
    ) -> StartTransactionResponse {
        match self.try_start_transaction(header, msg).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, station = %header.charge_box_identity, "StartTransaction rejected");
                StartTransactionResponse { transaction_id: 0, status: IdTagStatus::Invalid }
            }
        }
    }

    async fn try_start_transaction(
        &self,
        header: &InboundHeader,
        msg: StartTransaction,
    ) -> CoreResult<StartTransactionResponse> {
        let now = self.now();
        let mut station = self
            .repos
            .charging_stations()
            .find_by_id(header.tenant_id, &header.charge_box_identity)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?
            .ok_or_else(|| CoreError::resolution(format!("unknown station '{}'", header.charge_box_identity)))?;

        let auth = self
            .resolve_authorization_for_start(header.tenant_id, &msg.id_tag, station.public)
            .await?;
        if !auth.is_accepted() {
            return Ok(StartTransactionResponse { transaction_id: 0, status: to_wire(auth.status) });
        }

        self.cleanup_active_transactions(header.tenant_id, &header.charge_box_identity, msg.connector_id, now)
            .await;

        let tx_id = self
            .repos
            .transactions()
            .next_transaction_id(header.tenant_id)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        let mut transaction = Transaction::new(
            header.tenant_id,
            tx_id,
            header.charge_box_identity.clone(),
            msg.connector_id,
            msg.id_tag.clone(),
            msg.meter_start,
            msg.timestamp,
        );
        transaction.user_id = auth.user_id.clone();
        transaction.site_area_id = station.site_area_id.clone();
        // Clears the user's last-selected car unconditionally at
        // transaction start; see DESIGN.md.
        if let Some(user_id) = &auth.user_id {
            if let Ok(Some(user)) = self.repos.users().find_by_id(header.tenant_id, user_id).await {
                transaction.car_id = user.default_car_id;
            }
            if let Err(e) = self.repos.users().clear_default_car(header.tenant_id, user_id).await {
                warn!(error = %e, user_id, "failed to clear default car on transaction start");
            }
        }
        if let Some(roaming_id) = &auth.roaming_authorization_id {
            transaction.ocpi_data = Some(RoamingSessionData { session_id: roaming_id.clone(), cdr_pushed: false });
        }

        let mut begin = Consumption::new(
            header.tenant_id,
            transaction.id,
            msg.timestamp,
            msg.timestamp,
            0.0,
            0.0,
            0.0,
            0.0,
        );
        if let Err(e) = self.pricing.price(PricingAction::Start, &mut transaction, &mut begin).await {
            warn!(error = %e, transaction_id = transaction.id, "pricing failed on start");
        }
        if let Err(e) = self.billing.bill(PricingAction::Start, &transaction).await {
            warn!(error = %e, transaction_id = transaction.id, "billing failed on start");
        }
        if auth.roaming_authorization_id.is_some() {
            if let Err(e) = self.roaming.process_session(RoamingProtocol::A, RoamingAction::Start, &transaction, &station).await {
                warn!(error = %e, transaction_id = transaction.id, "roaming session-start push failed");
            }
        }

        transaction.last_consumption_at = Some(msg.timestamp);
        transaction.last_consumption_wh = Some(msg.meter_start);

        self.repos
            .transactions()
            .save(transaction.clone())
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        if let Some(connector) = station.connector_mut(msg.connector_id) {
            connector.current_transaction_id = transaction.id;
            connector.current_transaction_date = Some(msg.timestamp);
            connector.current_tag_id = Some(msg.id_tag.clone());
            connector.current_user_id = transaction.user_id.clone();
        } else {
            warn!(connector_id = msg.connector_id, station = %header.charge_box_identity, "StartTransaction on a connector the station never announced");
        }
        station.last_seen = Some(now);
        self.repos
            .charging_stations()
            .save(station)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        let notifications = self.notifications.clone();
        let tx_for_notif = transaction.clone();
        self.scheduler.submit(Duration::ZERO, async move {
            if let Err(e) = notifications.session_started(&tx_for_notif).await {
                warn!(error = %e, "session_started notification failed");
            }
        });

        Ok(StartTransactionResponse { transaction_id: transaction.id, status: IdTagStatus::Accepted })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use crate::application::charging::test_support::{engine, MemRepos};
    use crate::domain::charge_point::{ChargingStation, Connector};
    use crate::domain::id_tag::{IdTag, User, UserStatus};
    use crate::domain::ocpp::{OcppTransport, OcppVersion};
    use crate::domain::tenant::TenantId;

    use super::*;

    fn header(tenant_id: TenantId) -> InboundHeader {
        InboundHeader {
            tenant_id,
            charge_box_identity: "CB-1".to_string(),
            client_ip: None,
            ocpp_version: OcppVersion::V16,
            ocpp_transport: OcppTransport::Json,
            token: None,
            soap_from: None,
            received_at: Utc::now(),
        }
    }

    fn station_with_connector(tenant_id: TenantId, public: bool) -> ChargingStation {
        let mut station = ChargingStation::new(tenant_id, "CB-1", "Acme", "X1", OcppVersion::V16);
        station.public = public;
        station.connectors.push(Connector::new(1));
        station
    }

    fn start_msg_on(connector_id: u32, id_tag: &str, meter_start: f64, timestamp: chrono::DateTime<Utc>) -> StartTransaction {
        StartTransaction { connector_id, id_tag: id_tag.to_string(), meter_start, timestamp }
    }

    fn tag_and_user(tenant_id: TenantId) -> (IdTag, User) {
        (
            IdTag {
                tenant_id,
                tag_id: "TAG-1".to_string(),
                user_id: "USER-1".to_string(),
                active: true,
                blocked: false,
                expiration_date: None,
                roaming_authorization_id: None,
                can_start_on_station: true,
            },
            User { tenant_id, id: "USER-1".to_string(), status: UserStatus::Active, name: None, email: None, default_car_id: Some("CAR-1".to_string()) },
        )
    }

    fn start_msg(id_tag: &str, meter_start: f64, timestamp: chrono::DateTime<Utc>) -> StartTransaction {
        StartTransaction { connector_id: 1, id_tag: id_tag.to_string(), meter_start, timestamp }
    }

    #[tokio::test]
    async fn accepted_tag_starts_a_transaction_and_populates_the_connector() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        repos.stations.lock().unwrap().push(station_with_connector(tenant_id, false));
        let (tag, user) = tag_and_user(tenant_id);
        repos.tags.lock().unwrap().push(tag);
        repos.users.lock().unwrap().push(user);

        let now = Utc::now();
        let eng = engine(repos.clone(), now);
        let resp = eng.handle_start_transaction(&header(tenant_id), start_msg("TAG-1", 100.0, now)).await;

        assert_eq!(resp.status, IdTagStatus::Accepted);
        assert_eq!(resp.transaction_id, 1);

        let transactions = repos.transactions.lock().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].meter_start, 100.0);
        assert_eq!(transactions[0].user_id.as_deref(), Some("USER-1"));
        assert_eq!(transactions[0].car_id.as_deref(), Some("CAR-1"), "snapshots the user's default car at start");

        let stations = repos.stations.lock().unwrap();
        let connector = stations[0].connector(1).unwrap();
        assert_eq!(connector.current_transaction_id, 1);
        assert_eq!(connector.current_tag_id.as_deref(), Some("TAG-1"));

        // Spec open question: the default car selection is cleared
        // unconditionally on start.
        let users = repos.users.lock().unwrap();
        assert_eq!(users[0].default_car_id, None);
    }

    #[tokio::test]
    async fn invalid_tag_rejects_with_transaction_id_zero() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        repos.stations.lock().unwrap().push(station_with_connector(tenant_id, false));

        let now = Utc::now();
        let eng = engine(repos.clone(), now);
        let resp = eng.handle_start_transaction(&header(tenant_id), start_msg(&"A".repeat(23), 0.0, now)).await;

        assert_eq!(resp.transaction_id, 0);
        assert_eq!(resp.status, IdTagStatus::Invalid);
        assert!(repos.transactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn roaming_tag_on_a_private_station_is_rejected() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        repos.stations.lock().unwrap().push(station_with_connector(tenant_id, false));
        let (mut tag, user) = tag_and_user(tenant_id);
        tag.roaming_authorization_id = Some("ROAMING-AUTH".to_string());
        repos.tags.lock().unwrap().push(tag);
        repos.users.lock().unwrap().push(user);

        let now = Utc::now();
        let eng = engine(repos.clone(), now);
        let resp = eng.handle_start_transaction(&header(tenant_id), start_msg("TAG-1", 0.0, now)).await;

        assert_eq!(resp.transaction_id, 0);
        assert_eq!(resp.status, IdTagStatus::Invalid);
    }

    #[tokio::test]
    async fn unknown_station_rejects_start() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let now = Utc::now();
        let eng = engine(repos.clone(), now);
        let resp = eng.handle_start_transaction(&header(tenant_id), start_msg("TAG-1", 0.0, now)).await;
        assert_eq!(resp.transaction_id, 0);
        assert_eq!(resp.status, IdTagStatus::Invalid);
    }

    #[tokio::test]
    async fn dense_transaction_ids_increment_across_starts() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let mut station = station_with_connector(tenant_id, false);
        station.connectors.push(Connector::new(2));
        repos.stations.lock().unwrap().push(station);
        let (tag, user) = tag_and_user(tenant_id);
        repos.tags.lock().unwrap().push(tag);
        repos.users.lock().unwrap().push(user);

        let now = Utc::now();
        let eng = engine(repos.clone(), now);
        // Two distinct connectors so neither start's cleanup pass deletes
        // the other's still-open transaction.
        let first = eng.handle_start_transaction(&header(tenant_id), start_msg_on(1, "TAG-1", 0.0, now)).await;
        let second = eng.handle_start_transaction(&header(tenant_id), start_msg_on(2, "TAG-1", 0.0, now)).await;
        assert_eq!(first.transaction_id, 1);
        assert_eq!(second.transaction_id, 2);
    }
}
