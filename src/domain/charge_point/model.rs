//! Charging station domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ocpp::{OcppTransport, OcppVersion};
use crate::domain::tenant::TenantId;

/// Connector status, exactly the OCPP enumeration — the core treats every
/// transition as legal since vendor firmware can and does send anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single outlet on a station, including the transient fields that only
/// make sense while a transaction is live on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    pub vendor_error_code: Option<String>,
    pub status_last_changed_on: Option<DateTime<Utc>>,
    pub connector_type: Option<String>,
    pub power: u32,
    pub phase_assignment: Option<String>,

    /// 0 when no transaction is open on this connector.
    pub current_transaction_id: i64,
    pub current_transaction_date: Option<DateTime<Utc>>,
    pub current_tag_id: Option<String>,
    pub current_user_id: Option<String>,
    pub current_instant_watts: f64,
    pub current_total_consumption_wh: f64,
    pub current_total_inactivity_secs: i64,
    pub current_inactivity_status: Option<String>,
    pub current_state_of_charge: Option<u8>,
}

impl Connector {
    /// New connector default: `{status=Unavailable, power=0,
    /// type=Unknown, currentTransactionId=0}`, awaiting template enrichment.
    pub fn new(connector_id: u32) -> Self {
        Self {
            connector_id,
            status: ConnectorStatus::Unavailable,
            error_code: None,
            info: None,
            vendor_error_code: None,
            status_last_changed_on: None,
            connector_type: Some("Unknown".to_string()),
            power: 0,
            phase_assignment: None,
            current_transaction_id: 0,
            current_transaction_date: None,
            current_tag_id: None,
            current_user_id: None,
            current_instant_watts: 0.0,
            current_total_consumption_wh: 0.0,
            current_total_inactivity_secs: 0,
            current_inactivity_status: None,
            current_state_of_charge: None,
        }
    }

    pub fn has_open_transaction(&self) -> bool {
        self.current_transaction_id > 0
    }

    /// Zero the live-session fields; called when a transaction is freed from
    /// the connector on stop. `status` is deliberately untouched — it
    /// follows from the station's own subsequent notification.
    pub fn clear_transaction(&mut self) {
        self.current_transaction_id = 0;
        self.current_transaction_date = None;
        self.current_tag_id = None;
        self.current_user_id = None;
        self.current_instant_watts = 0.0;
        self.current_total_consumption_wh = 0.0;
        self.current_total_inactivity_secs = 0;
        self.current_inactivity_status = None;
        self.current_state_of_charge = None;
    }
}

/// Identity and registration state of a charging station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingStation {
    pub tenant_id: TenantId,
    /// Station-declared ChargeBoxIdentity; unique within `tenant_id`.
    pub id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub ocpp_version: OcppVersion,
    pub ocpp_transport: OcppTransport,
    pub registration_status: RegistrationStatus,
    pub last_reboot: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub current_ip: Option<String>,
    pub site_area_id: Option<String>,
    /// Ordered by connector id; `connectors[k].connector_id == k + 1` once
    /// sorted, per the station invariant.
    pub connectors: Vec<Connector>,
    /// Owned locally vs shadowed from a roaming peer.
    pub issuer: bool,
    pub public: bool,
    pub deleted: bool,
}

impl ChargingStation {
    pub fn new(
        tenant_id: TenantId,
        id: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        ocpp_version: OcppVersion,
    ) -> Self {
        Self {
            tenant_id,
            id: id.into(),
            vendor: vendor.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
            ocpp_transport: ocpp_version.transport(),
            ocpp_version,
            registration_status: RegistrationStatus::Accepted,
            last_reboot: None,
            last_seen: None,
            current_ip: None,
            site_area_id: None,
            connectors: Vec::new(),
            issuer: true,
            public: false,
            deleted: false,
        }
    }

    pub fn connector(&self, connector_id: u32) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.connector_id == connector_id)
    }

    pub fn connector_mut(&mut self, connector_id: u32) -> Option<&mut Connector> {
        self.connectors.iter_mut().find(|c| c.connector_id == connector_id)
    }

    /// Create the connector if unknown, then return a mutable handle to it,
    /// per the "new connector" policy.
    pub fn connector_or_create(&mut self, connector_id: u32) -> &mut Connector {
        if self.connector(connector_id).is_none() {
            self.connectors.push(Connector::new(connector_id));
            self.resort_connectors();
        }
        self.connector_mut(connector_id).expect("just inserted")
    }

    pub fn resort_connectors(&mut self) {
        self.connectors.sort_by_key(|c| c.connector_id);
    }

    /// Attribute mismatch check: vendor/model always
    /// compared; serial only when both sides provide one.
    pub fn attributes_mismatch(&self, vendor: &str, model: &str, serial: Option<&str>) -> bool {
        if self.vendor != vendor || self.model != model {
            return true;
        }
        if let (Some(stored), Some(incoming)) = (self.serial_number.as_deref(), serial) {
            if stored != incoming {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> ChargingStation {
        ChargingStation::new(TenantId::new(), "CB-1", "Acme", "X1", OcppVersion::V16)
    }

    #[test]
    fn connector_or_create_sorts_by_id() {
        let mut st = station();
        st.connector_or_create(2);
        st.connector_or_create(1);
        let ids: Vec<u32> = st.connectors.iter().map(|c| c.connector_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn attribute_mismatch_ignores_serial_when_either_side_is_absent() {
        let mut st = station();
        st.serial_number = None;
        assert!(!st.attributes_mismatch("Acme", "X1", Some("SN-1")));
        st.serial_number = Some("SN-1".to_string());
        assert!(!st.attributes_mismatch("Acme", "X1", None));
        assert!(st.attributes_mismatch("Acme", "X1", Some("SN-2")));
    }
}
