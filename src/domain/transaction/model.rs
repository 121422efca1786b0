//! Transaction domain entity — the aggregate root for a single charging
//! session, from `StartTransaction` through `StopTransaction` and any
//! subsequent extra-inactivity accounting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// A reading broken out by AC phase, or a single DC reading. `None` means
/// the station never reported that slot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseReadings {
    pub l1: Option<f64>,
    pub l2: Option<f64>,
    pub l3: Option<f64>,
    pub dc: Option<f64>,
}

/// Denormalized snapshot of the user at stop time, so billing/CDR export
/// does not need a live join back into the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A central-system-issued remote stop, recorded so `StopTransaction` can
/// resolve the "stopper tag".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStop {
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Roaming session linkage for CDR publication bookkeeping. One instance
/// per active protocol (OCPI / OICP); the core never speaks either protocol
/// directly, it only remembers whether the CDR push happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoamingSessionData {
    pub session_id: String,
    pub cdr_pushed: bool,
}

/// Everything only known once the transaction has stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStop {
    pub timestamp: DateTime<Utc>,
    pub meter_stop: f64,
    pub tag_id: Option<String>,
    pub total_consumption_wh: f64,
    pub total_inactivity_secs: i64,
    pub inactivity_status: Option<String>,
    pub total_duration_secs: i64,
    pub extra_inactivity_secs: i64,
    /// Guards the extra-inactivity gap so it's computed at most once.
    pub extra_inactivity_computed: bool,
    pub state_of_charge: Option<u8>,
    pub price: Option<Decimal>,
    pub rounded_price: Option<Decimal>,
    pub price_unit: Option<String>,
    pub pricing_source: Option<String>,
    pub user_snapshot: Option<UserSnapshot>,
    pub signed_data: Option<Vec<u8>>,
}

/// A charging session, from start to (optionally) stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub tenant_id: TenantId,
    /// Server-issued, dense, unique within the tenant.
    pub id: i64,
    pub charge_box_id: String,
    pub connector_id: u32,
    pub tag_id: String,
    /// `None` for unauthenticated roaming sessions.
    pub user_id: Option<String>,
    pub site_area_id: Option<String>,
    pub site_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub meter_start: f64,
    pub car_id: Option<String>,
    pub issuer: bool,

    /// Snapshot taken once, from the `Transaction.Begin` SoC reading (or 0
    /// if the station never reports one). Distinct from
    /// `current_state_of_charge`, which tracks the live/ending value.
    pub state_of_charge: u8,

    // Running fields, mirroring the owning connector's live fields.
    pub current_instant_watts: f64,
    pub current_total_consumption_wh: f64,
    pub current_total_inactivity_secs: i64,
    pub current_inactivity_status: Option<String>,
    pub current_state_of_charge: Option<u8>,
    pub instant_watts_phases: PhaseReadings,
    pub instant_volts_phases: PhaseReadings,
    pub instant_amps_phases: PhaseReadings,

    pub number_of_meter_values: u32,
    /// Set the first time a meter value carries a phase tag; `{1,2,3}`.
    pub phases_used: Option<u8>,

    /// The Consumption Builder's anchor: the timestamp/cumulative-Wh
    /// pair that the next interval is measured from. `None` until the first
    /// meter value is processed, at which point it seeds from
    /// `(timestamp, meter_start)`.
    pub last_consumption_at: Option<DateTime<Utc>>,
    pub last_consumption_wh: Option<f64>,

    /// Captured once, from a `SignedData` meter value at `Transaction.Begin`.
    pub signed_data: Option<Vec<u8>>,
    /// Captured from a `SignedData` meter value at `Transaction.End`, held
    /// here until `StopTransaction` moves it onto `TransactionStop`.
    pub stop_signed_data: Option<Vec<u8>>,
    /// Guards the consumption cutoff: once the first `Transaction.End` arrives, subsequent
    /// meter values are accepted but ignored for consumption purposes.
    pub transaction_end_received: bool,

    /// Dedup gates for the end-of-charge detection policy: each
    /// notification fires at most once per transaction.
    pub end_of_charge_notified: bool,
    pub optimal_charge_notified: bool,

    pub stop: Option<TransactionStop>,

    pub ocpi_data: Option<RoamingSessionData>,
    pub oicp_data: Option<RoamingSessionData>,
    pub remotestop: Option<RemoteStop>,
}

impl Transaction {
    pub fn new(
        tenant_id: TenantId,
        id: i64,
        charge_box_id: impl Into<String>,
        connector_id: u32,
        tag_id: impl Into<String>,
        meter_start: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            id,
            charge_box_id: charge_box_id.into(),
            connector_id,
            tag_id: tag_id.into(),
            user_id: None,
            site_area_id: None,
            site_id: None,
            timestamp,
            meter_start,
            car_id: None,
            issuer: true,
            state_of_charge: 0,
            current_instant_watts: 0.0,
            current_total_consumption_wh: 0.0,
            current_total_inactivity_secs: 0,
            current_inactivity_status: None,
            current_state_of_charge: None,
            instant_watts_phases: PhaseReadings::default(),
            instant_volts_phases: PhaseReadings::default(),
            instant_amps_phases: PhaseReadings::default(),
            number_of_meter_values: 0,
            phases_used: None,
            last_consumption_at: None,
            last_consumption_wh: None,
            signed_data: None,
            stop_signed_data: None,
            transaction_end_received: false,
            stop: None,
            ocpi_data: None,
            oicp_data: None,
            remotestop: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stop.is_none()
    }

    /// Zero the running instants once, on the first `Transaction.End` meter
    /// value — interim readings must not bleed into the final
    /// snapshot.
    pub fn reset_instants_for_end(&mut self) {
        if self.transaction_end_received {
            return;
        }
        self.transaction_end_received = true;
        self.current_instant_watts = 0.0;
        self.current_state_of_charge = None;
        self.instant_watts_phases = PhaseReadings::default();
        self.instant_volts_phases = PhaseReadings::default();
        self.instant_amps_phases = PhaseReadings::default();
    }

    /// The tag that should be treated as having stopped this transaction,
    /// a central-system remote-stop issued within the last 60
    /// seconds wins, otherwise the tag the stop message carried, otherwise
    /// the tag that started the session.
    pub fn effective_stopper_tag(&self, provided_tag: Option<&str>, now: DateTime<Utc>) -> String {
        if let Some(remote) = &self.remotestop {
            if (now - remote.timestamp).num_seconds() < 60 {
                return remote.tag_id.clone();
            }
        }
        provided_tag.map(str::to_string).unwrap_or_else(|| self.tag_id.clone())
    }

    pub fn is_remote_stop_soft(&self) -> bool {
        self.remotestop.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new(TenantId::new(), 1, "CB-1", 1, "TAG-1", 0.0, Utc::now())
    }

    #[test]
    fn new_transaction_is_open() {
        let t = tx();
        assert!(t.is_open());
        assert_eq!(t.meter_start, 0.0);
        assert!(!t.transaction_end_received);
    }

    #[test]
    fn reset_instants_for_end_is_idempotent() {
        let mut t = tx();
        t.current_instant_watts = 500.0;
        t.reset_instants_for_end();
        assert_eq!(t.current_instant_watts, 0.0);
        assert!(t.transaction_end_received);
        t.current_instant_watts = 999.0;
        t.reset_instants_for_end();
        // Second call is a no-op: the guard prevents re-zeroing.
        assert_eq!(t.current_instant_watts, 999.0);
    }

    #[test]
    fn effective_stopper_tag_prefers_recent_remote_stop() {
        let mut t = tx();
        let now = Utc::now();
        t.remotestop = Some(RemoteStop {
            tag_id: "REMOTE".to_string(),
            timestamp: now - chrono::Duration::seconds(10),
        });
        assert_eq!(t.effective_stopper_tag(Some("PROVIDED"), now), "REMOTE");
    }

    #[test]
    fn effective_stopper_tag_falls_back_after_remote_stop_expires() {
        let mut t = tx();
        let now = Utc::now();
        t.remotestop = Some(RemoteStop {
            tag_id: "REMOTE".to_string(),
            timestamp: now - chrono::Duration::seconds(90),
        });
        assert_eq!(t.effective_stopper_tag(Some("PROVIDED"), now), "PROVIDED");
        assert_eq!(t.effective_stopper_tag(None, now), "TAG-1");
    }
}
