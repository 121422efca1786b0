//! Logging stand-ins for every out-of-scope collaborator (pricing, billing,
//! roaming, smart-charging, notifications), plus two reference
//! implementations the core needs to run standalone at all: a declarative
//! template catalog and a fixed-threshold inactivity classifier. None of
//! these encode real business rules — a deployment wires its own tariff
//! engine, invoicing system, roaming bridge, optimizer and notification
//! channel in by implementing the same ports.

use async_trait::async_trait;
use tracing::info;

use crate::domain::charge_point::{ChargingStation, Connector};
use crate::domain::consumption::Consumption;
use crate::domain::ports::outbound::{
    Billing, InactivityClass, InactivityClassifier, Notifications, Pricing, PricingAction, Roaming,
    RoamingAction, RoamingProtocol, SmartCharging, TemplateApplicationResult, TemplateCatalog,
};
use crate::domain::transaction::Transaction;
use crate::support::errors::CoreResult;

/// Logs every call and leaves the transaction/consumption price fields
/// untouched. A real tariff engine fills in [`Consumption::pricing`] and
/// [`Transaction`]'s running price totals here.
#[derive(Debug, Default)]
pub struct LoggingPricing;

#[async_trait]
impl Pricing for LoggingPricing {
    async fn price(&self, action: PricingAction, transaction: &mut Transaction, _consumption: &mut Consumption) -> CoreResult<()> {
        info!(transaction_id = transaction.id, ?action, "pricing collaborator not configured, leaving price unset");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoggingBilling;

#[async_trait]
impl Billing for LoggingBilling {
    async fn bill(&self, action: PricingAction, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, ?action, "billing collaborator not configured, skipping invoice");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoggingRoaming;

#[async_trait]
impl Roaming for LoggingRoaming {
    async fn process_session(&self, protocol: RoamingProtocol, action: RoamingAction, transaction: &Transaction, station: &ChargingStation) -> CoreResult<()> {
        info!(station = %station.id, transaction_id = transaction.id, ?protocol, ?action, "roaming collaborator not configured");
        Ok(())
    }

    async fn push_cdr(&self, protocol: RoamingProtocol, transaction: &Transaction, station: &ChargingStation) -> CoreResult<()> {
        info!(station = %station.id, transaction_id = transaction.id, ?protocol, "roaming collaborator not configured, CDR not pushed");
        Ok(())
    }

    async fn push_connector_status(&self, protocol: RoamingProtocol, station: &ChargingStation, connector: &Connector) -> CoreResult<()> {
        info!(station = %station.id, connector_id = connector.connector_id, ?protocol, "roaming collaborator not configured, status not pushed");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoggingSmartCharging;

#[async_trait]
impl SmartCharging for LoggingSmartCharging {
    async fn compute_and_apply(&self, site_area_id: &str) -> CoreResult<()> {
        info!(site_area_id, "smart-charging collaborator not configured, no profile recomputed");
        Ok(())
    }

    async fn clear_tx_profile(&self, transaction_id: i64) -> CoreResult<()> {
        info!(transaction_id, "smart-charging collaborator not configured, no profile to clear");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LoggingNotifications;

#[async_trait]
impl Notifications for LoggingNotifications {
    async fn station_registered(&self, station: &ChargingStation) -> CoreResult<()> {
        info!(station = %station.id, "notification: station_registered");
        Ok(())
    }

    async fn session_started(&self, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, "notification: session_started");
        Ok(())
    }

    async fn end_of_charge(&self, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, "notification: end_of_charge");
        Ok(())
    }

    async fn optimal_charge_reached(&self, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, "notification: optimal_charge_reached");
        Ok(())
    }

    async fn end_of_session(&self, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, "notification: end_of_session");
        Ok(())
    }

    async fn end_of_signed_session(&self, transaction: &Transaction) -> CoreResult<()> {
        info!(transaction_id = transaction.id, "notification: end_of_signed_session");
        Ok(())
    }

    async fn status_error(&self, station: &ChargingStation, connector: &Connector) -> CoreResult<()> {
        info!(station = %station.id, connector_id = connector.connector_id, "notification: status_error");
        Ok(())
    }
}

/// One row of the declarative vendor/model template table.
struct Template {
    vendor: &'static str,
    model: &'static str,
    connector_type: &'static str,
    power: u32,
    phase_assignment: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template { vendor: "Acme", model: "X1", connector_type: "Type2", power: 22_000, phase_assignment: "1L1" },
    Template { vendor: "Acme", model: "X2", connector_type: "CCS", power: 50_000, phase_assignment: "3L1L2L3" },
    Template { vendor: "Generic", model: "Default", connector_type: "Type2", power: 7_400, phase_assignment: "1L1" },
];

fn lookup(vendor: &str, model: &str) -> &'static Template {
    TEMPLATES
        .iter()
        .find(|t| t.vendor == vendor && t.model == model)
        .unwrap_or_else(|| TEMPLATES.last().expect("at least one fallback template"))
}

/// Applies a fixed connector-defaults table keyed by `(vendor, model)`,
/// falling back to a generic profile for anything unrecognized. Idempotent:
/// re-applying the same template to an already-matching station reports no
/// change.
#[derive(Debug, Default)]
pub struct StaticTemplateCatalog;

#[async_trait]
impl TemplateCatalog for StaticTemplateCatalog {
    async fn apply_template(&self, station: &mut ChargingStation) -> CoreResult<TemplateApplicationResult> {
        let template = lookup(&station.vendor, &station.model);
        let mut result = TemplateApplicationResult::default();

        for connector in station.connectors.iter_mut() {
            if connector.connector_type.as_deref() != Some(template.connector_type) {
                connector.connector_type = Some(template.connector_type.to_string());
                result.ocpp_standard_updated = true;
            }
            if connector.power != template.power {
                connector.power = template.power;
                result.ocpp_standard_updated = true;
            }
            if connector.phase_assignment.as_deref() != Some(template.phase_assignment) {
                connector.phase_assignment = Some(template.phase_assignment.to_string());
                result.ocpp_vendor_updated = true;
            }
        }

        result.updated = result.ocpp_standard_updated || result.ocpp_vendor_updated;
        Ok(result)
    }
}

/// Fixed thresholds: a warning past five minutes idle, an error past
/// fifteen. Real thresholds belong in per-station or per-site
/// configuration external to the core; see the design ledger's note on
/// this collaborator.
#[derive(Debug, Default)]
pub struct DefaultInactivityClassifier;

#[async_trait]
impl InactivityClassifier for DefaultInactivityClassifier {
    async fn classify(&self, _station_id: &str, _connector_id: u32, total_inactivity_secs: i64) -> CoreResult<InactivityClass> {
        Ok(if total_inactivity_secs >= 900 {
            InactivityClass::Error
        } else if total_inactivity_secs >= 300 {
            InactivityClass::Warning
        } else {
            InactivityClass::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ocpp::OcppVersion;
    use crate::domain::tenant::TenantId;

    #[tokio::test]
    async fn template_application_is_idempotent() {
        let catalog = StaticTemplateCatalog;
        let mut station = ChargingStation::new(TenantId::new(), "CB-1", "Acme", "X1", OcppVersion::V16);
        station.connectors.push(Connector::new(1));

        let first = catalog.apply_template(&mut station).await.unwrap();
        assert!(first.updated);

        let second = catalog.apply_template(&mut station).await.unwrap();
        assert!(!second.updated);
    }

    #[tokio::test]
    async fn unknown_vendor_falls_back_to_generic_template() {
        let catalog = StaticTemplateCatalog;
        let mut station = ChargingStation::new(TenantId::new(), "CB-2", "Unknown Corp", "Z9", OcppVersion::V16);
        station.connectors.push(Connector::new(1));
        catalog.apply_template(&mut station).await.unwrap();
        assert_eq!(station.connectors[0].connector_type.as_deref(), Some("Type2"));
    }

    #[tokio::test]
    async fn classifier_thresholds() {
        let classifier = DefaultInactivityClassifier;
        assert_eq!(classifier.classify("CB-1", 1, 0).await.unwrap(), InactivityClass::Info);
        assert_eq!(classifier.classify("CB-1", 1, 300).await.unwrap(), InactivityClass::Warning);
        assert_eq!(classifier.classify("CB-1", 1, 900).await.unwrap(), InactivityClass::Error);
    }
}
