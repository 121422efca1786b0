//! MeterValues handling — routes SignedData and SoC samples, builds
//! consumption intervals via the Consumption Builder, and evaluates the
//! end-of-charge detection policy.

use tracing::{info, warn};

use crate::domain::meter_value::{MeterContext, MeterValueData, Measurand, Phase};
use crate::domain::ports::outbound::{PricingAction, RoamingAction, RoamingProtocol};
use crate::domain::tenant::TenantId;
use crate::domain::transaction::Transaction;
use crate::support::errors::{CoreError, CoreResult};

use super::consumption_builder::build_consumption_intervals;
use super::engine::ChargingEngine;
use super::messages::{InboundHeader, MeterValues, MeterValuesResponse};

/// IEC 61851-1's minimum continuous per-phase charging current. Below this,
/// a reported "limit" is effectively a pause, not an active charging
/// profile, for the purposes of the end-of-charge zero-intervals check.
const MIN_PER_PHASE_AMPS: f64 = 6.0;

fn phase_rank(phase: Phase) -> u8 {
    match phase {
        Phase::L1 | Phase::L1N => 1,
        Phase::L2 | Phase::L2N => 2,
        Phase::L3 | Phase::L3N => 3,
    }
}

/// Highest phase index carried by this batch, or `None` if nothing in it
/// was phase-tagged. A batch that only ever reports L1 looks like a
/// single-phase session; one that reports up to L3 looks three-phase.
fn phase_count(values: &[crate::domain::meter_value::MeterValue]) -> Option<u8> {
    values.iter().filter_map(|v| v.phase).map(phase_rank).max()
}

impl ChargingEngine {
    pub async fn handle_meter_values(&self, header: &InboundHeader, msg: MeterValues) -> MeterValuesResponse {
        if let Err(e) = self.apply_meter_values(header, msg).await {
            warn!(error = %e, station = %header.charge_box_identity, "MeterValues handling failed");
        }
        MeterValuesResponse
    }

    async fn apply_meter_values(&self, header: &InboundHeader, msg: MeterValues) -> CoreResult<()> {
        let tenant_id = header.tenant_id;

        for value in &msg.meter_values {
            if let Err(e) = self.repos.meter_values().save(value.clone()).await {
                warn!(error = %e, station = %header.charge_box_identity, "failed to persist raw meter value");
            }
        }

        let Some(transaction_id) = msg.transaction_id.filter(|id| *id > 0) else {
            return Ok(());
        };

        let mut transaction = self
            .repos
            .transactions()
            .find_by_id(tenant_id, transaction_id)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?
            .ok_or_else(|| CoreError::state(format!("transaction {transaction_id} not found")))?;

        if transaction.stop.is_some() {
            info!(transaction_id, "MeterValues for an already-stopped transaction, ignored");
            return Ok(());
        }

        let values = msg.meter_values;
        let is_first_end_batch =
            !transaction.transaction_end_received && values.iter().any(|v| v.context == MeterContext::TransactionEnd);

        if transaction.transaction_end_received && !is_first_end_batch {
            info!(transaction_id, "meter values arrived after Transaction.End, ignored (clock values)");
            return Ok(());
        }
        if is_first_end_batch {
            transaction.reset_instants_for_end();
        }

        for value in &values {
            if value.measurand == Measurand::SignedData {
                if let MeterValueData::Signed(bytes) = &value.value {
                    match value.context {
                        MeterContext::TransactionBegin => transaction.signed_data = Some(bytes.clone()),
                        MeterContext::TransactionEnd => transaction.stop_signed_data = Some(bytes.clone()),
                        _ => {}
                    }
                }
            }
        }

        let had_phases_known = transaction.phases_used.is_some();
        if !had_phases_known {
            if let Some(count) = phase_count(&values) {
                transaction.phases_used = Some(count);
            }
        }
        let phases_just_learned = !had_phases_known && transaction.phases_used.is_some();

        transaction.number_of_meter_values +=
            values.iter().filter(|v| v.measurand == Measurand::EnergyActiveImportRegister).count() as u32;

        let prev_soc = transaction.current_state_of_charge;
        let intervals = build_consumption_intervals(tenant_id, &mut transaction, &values);

        for mut interval in intervals {
            if let Err(e) = self.pricing.price(PricingAction::Update, &mut transaction, &mut interval).await {
                warn!(error = %e, transaction_id, "pricing failed on meter values, interval left unpriced");
            }
            if let Err(e) = self.billing.bill(PricingAction::Update, &transaction).await {
                warn!(error = %e, transaction_id, "billing failed on meter values");
            }
            if let Err(e) = self.repos.consumptions().save(interval).await {
                warn!(error = %e, transaction_id, "failed to persist consumption interval");
            }
        }

        if phases_just_learned {
            if let Some(site_area_id) = transaction.site_area_id.clone() {
                let smart_charging = self.smart_charging.clone();
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = smart_charging.compute_and_apply(&site_area_id).await {
                        warn!(error = %e, site_area_id, "smart-charging reoptimization on phase detection failed");
                    }
                });
            }
        }

        self.evaluate_end_of_charge(tenant_id, &mut transaction, prev_soc).await;

        if transaction.ocpi_data.is_some() {
            self.dispatch_roaming_update(tenant_id, RoamingProtocol::A, &transaction).await;
        }
        if transaction.oicp_data.is_some() {
            self.dispatch_roaming_update(tenant_id, RoamingProtocol::B, &transaction).await;
        }

        self.repos
            .transactions()
            .update(transaction)
            .await
            .map_err(|e| CoreError::integration("storage", e.to_string()))?;

        Ok(())
    }

    /// The end-of-charge detection policy, evaluated once per MeterValues
    /// call on a transaction with at least two meter values and positive
    /// cumulative consumption. Each outcome has its own per-transaction
    /// dedup flag so a notification fires at most once.
    async fn evaluate_end_of_charge(&self, tenant_id: TenantId, transaction: &mut Transaction, prev_soc: Option<u8>) {
        if transaction.number_of_meter_values < 2 || transaction.current_total_consumption_wh <= 0.0 {
            return;
        }

        if self.config.core.notif_end_of_charge_enabled && !transaction.end_of_charge_notified {
            let soc_full = transaction.current_state_of_charge == Some(100);
            let zero_intervals = !soc_full && self.last_intervals_are_idle(tenant_id, transaction.id, 3).await;

            if soc_full || zero_intervals {
                transaction.end_of_charge_notified = true;
                let notifications = self.notifications.clone();
                let tx = transaction.clone();
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = notifications.end_of_charge(&tx).await {
                        warn!(error = %e, transaction_id = tx.id, "end_of_charge notification failed");
                    }
                });
                return;
            }
        }

        if self.config.core.notif_before_end_of_charge_enabled && !transaction.optimal_charge_notified {
            let threshold = self.config.core.notif_before_end_of_charge_percent;
            let crossed = transaction
                .current_state_of_charge
                .is_some_and(|soc| soc >= threshold && prev_soc.unwrap_or(0) < threshold);
            if crossed {
                transaction.optimal_charge_notified = true;
                let notifications = self.notifications.clone();
                let tx = transaction.clone();
                self.scheduler.submit(std::time::Duration::ZERO, async move {
                    if let Err(e) = notifications.optimal_charge_reached(&tx).await {
                        warn!(error = %e, transaction_id = tx.id, "optimal_charge_reached notification failed");
                    }
                });
            }
        }
    }

    /// Whether the last `n` persisted consumption intervals for this
    /// transaction are all idle AND the most recent one's limit context, if
    /// any, is not an active charging profile constraining output below
    /// [`MIN_PER_PHASE_AMPS`].
    async fn last_intervals_are_idle(&self, tenant_id: TenantId, transaction_id: i64, n: usize) -> bool {
        let Ok(mut history) = self.repos.consumptions().find_by_transaction(tenant_id, transaction_id).await else {
            return false;
        };
        if history.len() < n {
            return false;
        }
        history.sort_by_key(|c| c.started_at);
        let tail = &history[history.len() - n..];
        if !tail.iter().all(|c| c.is_idle()) {
            return false;
        }
        match tail.last().and_then(|c| c.limit.as_ref()) {
            None => true,
            Some(limit) => limit.limit_amps >= MIN_PER_PHASE_AMPS,
        }
    }

    async fn dispatch_roaming_update(&self, tenant_id: TenantId, protocol: RoamingProtocol, transaction: &Transaction) {
        let Ok(Some(station)) = self.repos.charging_stations().find_by_id(tenant_id, &transaction.charge_box_id).await else {
            return;
        };
        if let Err(e) = self.roaming.process_session(protocol, RoamingAction::Update, transaction, &station).await {
            warn!(error = %e, transaction_id = transaction.id, "roaming update push failed");
        }
    }
}
