//! Consumption Builder — derives zero-or-more [`Consumption`]
//! intervals from an ordered batch of normalized meter values, advancing
//! the transaction's anchor `(timestamp, cumulativeWh)` as it goes.
//!
//! The anchor lives on the transaction itself (`last_consumption_at` /
//! `last_consumption_wh`), not in a side table, so replaying the same batch
//! twice is a no-op the second time: every derived `interval_secs` comes out
//! `<= 0` against an anchor that has already moved past it.

use chrono::{DateTime, Utc};

use crate::domain::consumption::Consumption;
use crate::domain::meter_value::{MeterContext, MeterValue, Measurand};
use crate::domain::tenant::TenantId;
use crate::domain::transaction::{PhaseReadings, Transaction};

/// Nominal line voltage used to convert a derived wattage into amps, since
/// the data model carries a connector's `power`/`type`/phase
/// assignment but not a metered voltage. Standard European domestic/
/// three-phase nominal voltages are assumed; see DESIGN.md.
fn watts_to_amps(watts: f64, phases_used: Option<u8>) -> f64 {
    let amps = match phases_used.unwrap_or(1) {
        3 => watts / (400.0 * 3f64.sqrt()),
        2 => watts / (2.0 * 230.0),
        _ => watts / 230.0,
    };
    amps.max(0.0)
}

fn apply_phase_instant(transaction: &mut Transaction, value: &MeterValue) {
    let Some(raw) = value.as_numeric() else {
        return;
    };

    // `phase == None` is the total/DC reading — single-phase AC reporting
    // one combined figure, or a genuine DC station — and shares the `dc`
    // slot since a connector is never both phase-tagged and untagged.
    let slot = |p: &mut PhaseReadings| match value.phase {
        Some(crate::domain::meter_value::Phase::L1) | Some(crate::domain::meter_value::Phase::L1N) => &mut p.l1,
        Some(crate::domain::meter_value::Phase::L2) | Some(crate::domain::meter_value::Phase::L2N) => &mut p.l2,
        Some(crate::domain::meter_value::Phase::L3) | Some(crate::domain::meter_value::Phase::L3N) => &mut p.l3,
        None => &mut p.dc,
    };

    match value.measurand {
        Measurand::PowerActiveImport => *slot(&mut transaction.instant_watts_phases) = Some(value.watts().unwrap_or(raw)),
        Measurand::Voltage => *slot(&mut transaction.instant_volts_phases) = Some(raw),
        Measurand::CurrentImport => *slot(&mut transaction.instant_amps_phases) = Some(raw),
        _ => {}
    }
}

/// Process one MeterValues batch against `transaction`, mutating its
/// running totals and anchor in place and returning the newly derived
/// Consumption rows. `phases_used` should reflect the
/// transaction's `phases_used` field (passed separately so callers can
/// update it from the same batch before invoking this).
pub fn build_consumption_intervals(
    tenant_id: TenantId,
    transaction: &mut Transaction,
    values: &[MeterValue],
) -> Vec<Consumption> {
    if transaction.last_consumption_at.is_none() {
        transaction.last_consumption_at = Some(transaction.timestamp);
        transaction.last_consumption_wh = Some(transaction.meter_start);
    }
    let mut anchor_t: DateTime<Utc> = transaction.last_consumption_at.unwrap();
    let mut anchor_wh: f64 = transaction.last_consumption_wh.unwrap();
    let mut last_soc = transaction.current_state_of_charge;
    let mut intervals = Vec::new();

    for value in values {
        if value.measurand == Measurand::SoC {
            if let Some(raw) = value.as_numeric() {
                let soc = raw.round().clamp(0.0, 100.0) as u8;
                if value.context == MeterContext::TransactionBegin {
                    transaction.state_of_charge = soc;
                }
                last_soc = Some(soc);
            }
        }
        // Phase-resolved Voltage/Power/Current readings are live telemetry at
        // any context, but the Transaction.End snapshot matters most: it's
        // what `reset_instants_for_end` zeroed moments ago, so applying it
        // here is what actually repopulates the final per-phase fields.
        apply_phase_instant(transaction, value);
        if value.measurand != Measurand::EnergyActiveImportRegister {
            continue;
        }
        let Some(cumulative) = value.as_numeric() else {
            continue;
        };
        // Sample.Clock readings are saved as MeterValue (by the caller) but
        // never feed consumption, regardless of what cumulative they
        // report. Backward-dated/duplicate timestamps fall out naturally
        // via interval_secs <= 0 — the same guard that makes replay a no-op.
        if value.context == MeterContext::SampleClock {
            continue;
        }
        let interval_secs = (value.timestamp - anchor_t).num_seconds();
        if interval_secs <= 0 {
            continue;
        }

        let consumption_wh = (cumulative - anchor_wh).max(0.0);
        let instant_watts = consumption_wh * 3600.0 / interval_secs as f64;
        let instant_amps = watts_to_amps(instant_watts, transaction.phases_used);
        let cumulated_consumption_wh = (cumulative - transaction.meter_start).max(0.0);

        if consumption_wh <= 0.0 {
            transaction.current_total_inactivity_secs += interval_secs;
        }

        let mut interval = Consumption::new(
            tenant_id,
            transaction.id,
            anchor_t,
            value.timestamp,
            consumption_wh,
            instant_watts,
            instant_amps,
            cumulated_consumption_wh,
        );
        interval.state_of_charge = last_soc;
        intervals.push(interval);

        anchor_t = value.timestamp;
        anchor_wh = cumulative;
    }

    transaction.last_consumption_at = Some(anchor_t);
    transaction.last_consumption_wh = Some(anchor_wh);

    if let Some(last) = intervals.last() {
        transaction.current_instant_watts = last.instant_watts;
        transaction.current_total_consumption_wh = last.cumulated_consumption_wh;
        transaction.current_state_of_charge = last.state_of_charge;
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meter_value::{MeterFormat, MeterLocation, MeterUnit, MeterValueData};
    use chrono::Duration;

    fn energy_value(station: &str, connector_id: u32, t: DateTime<Utc>, cumulative: f64, context: MeterContext) -> MeterValue {
        MeterValue {
            station_id: station.to_string(),
            connector_id,
            transaction_id: None,
            timestamp: t,
            context,
            format: MeterFormat::Raw,
            measurand: Measurand::EnergyActiveImportRegister,
            location: MeterLocation::Outlet,
            unit: MeterUnit::Wh,
            phase: None,
            value: MeterValueData::Numeric(cumulative),
        }
    }

    fn soc_value(station: &str, connector_id: u32, t: DateTime<Utc>, percent: f64, context: MeterContext) -> MeterValue {
        MeterValue {
            station_id: station.to_string(),
            connector_id,
            transaction_id: None,
            timestamp: t,
            context,
            format: MeterFormat::Raw,
            measurand: Measurand::SoC,
            location: MeterLocation::Outlet,
            unit: MeterUnit::Percent,
            phase: None,
            value: MeterValueData::Numeric(percent),
        }
    }

    fn tx(start: DateTime<Utc>) -> Transaction {
        Transaction::new(TenantId::new(), 1, "CB-1", 1, "TAG-1", 0.0, start)
    }

    #[test]
    fn happy_path_fourteen_intervals() {
        let start = Utc::now();
        let mut t = tx(start);
        let mut values = Vec::new();
        let mut cumulative = 0.0;
        for i in 1..=14u32 {
            // two of the fourteen samples are zero-energy (idle) intervals
            let delta = if i == 5 || i == 10 { 0.0 } else { 1000.0 };
            cumulative += delta;
            values.push(energy_value("CB-1", 1, start + Duration::seconds(60 * i as i64), cumulative, MeterContext::SamplePeriodic));
        }
        let intervals = build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(intervals.len(), 14);
        assert_eq!(t.current_total_consumption_wh, cumulative);
        assert_eq!(t.current_total_inactivity_secs, 120);
    }

    #[test]
    fn replay_is_idempotent() {
        let start = Utc::now();
        let mut t = tx(start);
        let values = vec![energy_value("CB-1", 1, start + Duration::seconds(60), 1000.0, MeterContext::SamplePeriodic)];
        let first = build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(first.len(), 1);
        let second = build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert!(second.is_empty(), "replaying the same batch must not emit more intervals");
    }

    #[test]
    fn sample_clock_between_periodics_is_skipped() {
        let start = Utc::now();
        let mut t = tx(start);
        let values = vec![
            energy_value("CB-1", 1, start + Duration::seconds(30), 500.0, MeterContext::SampleClock),
            energy_value("CB-1", 1, start + Duration::seconds(60), 1000.0, MeterContext::SamplePeriodic),
        ];
        let intervals = build_consumption_intervals(TenantId::new(), &mut t, &values);
        // The clock sample reports the same cumulative mid-interval and must
        // not split the interval; exactly one interval spans [0, 60].
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].started_at, start);
        assert_eq!(intervals[0].ended_at, start + Duration::seconds(60));
    }

    #[test]
    fn transaction_begin_soc_sets_start_snapshot_not_current() {
        let start = Utc::now();
        let mut t = tx(start);
        assert_eq!(t.state_of_charge, 0);
        let values = vec![
            soc_value("CB-1", 1, start, 42.0, MeterContext::TransactionBegin),
            energy_value("CB-1", 1, start + Duration::seconds(60), 1000.0, MeterContext::SamplePeriodic),
        ];
        build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(t.state_of_charge, 42, "Transaction.Begin SoC must snapshot into the start field");
        assert_eq!(t.current_state_of_charge, Some(42), "the running field still tracks the latest reading");
    }

    #[test]
    fn later_soc_readings_update_current_but_not_the_start_snapshot() {
        let start = Utc::now();
        let mut t = tx(start);
        let values = vec![
            soc_value("CB-1", 1, start, 10.0, MeterContext::TransactionBegin),
            soc_value("CB-1", 1, start + Duration::seconds(30), 55.0, MeterContext::SamplePeriodic),
            energy_value("CB-1", 1, start + Duration::seconds(60), 1000.0, MeterContext::SamplePeriodic),
        ];
        build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(t.state_of_charge, 10);
        assert_eq!(t.current_state_of_charge, Some(55));
    }

    fn power_value(station: &str, connector_id: u32, t: DateTime<Utc>, watts: f64, phase: Option<crate::domain::meter_value::Phase>) -> MeterValue {
        MeterValue {
            station_id: station.to_string(),
            connector_id,
            transaction_id: None,
            timestamp: t,
            context: MeterContext::SamplePeriodic,
            format: MeterFormat::Raw,
            measurand: Measurand::PowerActiveImport,
            location: MeterLocation::Outlet,
            unit: MeterUnit::W,
            phase,
            value: MeterValueData::Numeric(watts),
        }
    }

    #[test]
    fn unphased_power_reading_populates_the_dc_slot() {
        let start = Utc::now();
        let mut t = tx(start);
        let values = vec![power_value("CB-1", 1, start + Duration::seconds(30), 7400.0, None)];
        build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(t.instant_watts_phases.dc, Some(7400.0));
        assert_eq!(t.instant_watts_phases.l1, None);
    }

    #[test]
    fn phased_power_reading_still_lands_on_its_own_phase() {
        let start = Utc::now();
        let mut t = tx(start);
        let values = vec![power_value("CB-1", 1, start + Duration::seconds(30), 2000.0, Some(crate::domain::meter_value::Phase::L2))];
        build_consumption_intervals(TenantId::new(), &mut t, &values);
        assert_eq!(t.instant_watts_phases.l2, Some(2000.0));
        assert_eq!(t.instant_watts_phases.dc, None);
    }
}
