//! Normalized meter value — the single shape both OCPP 1.5 and 1.6 meter
//! readings are flattened into by the protocol normalizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterContext {
    SamplePeriodic,
    SampleClock,
    TransactionBegin,
    TransactionEnd,
    InterruptionBegin,
    InterruptionEnd,
    Other,
}

impl Default for MeterContext {
    fn default() -> Self {
        Self::SamplePeriodic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterFormat {
    Raw,
    SignedData,
}

impl Default for MeterFormat {
    fn default() -> Self {
        Self::Raw
    }
}

/// Known measurands plus a catch-all so unrecognized values from newer
/// firmware round-trip unchanged instead of being rejected — unknown
/// measurand/context values are preserved unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurand {
    EnergyActiveImportRegister,
    PowerActiveImport,
    CurrentImport,
    Voltage,
    SoC,
    SignedData,
    Other(String),
}

impl Default for Measurand {
    fn default() -> Self {
        Self::EnergyActiveImportRegister
    }
}

impl Measurand {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "Energy.Active.Import.Register" => Self::EnergyActiveImportRegister,
            "Power.Active.Import" => Self::PowerActiveImport,
            "Current.Import" => Self::CurrentImport,
            "Voltage" => Self::Voltage,
            "SoC" => Self::SoC,
            "SignedData" => Self::SignedData,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterLocation {
    Outlet,
    Inlet,
    Body,
    Cable,
    Ev,
}

impl Default for MeterLocation {
    fn default() -> Self {
        Self::Outlet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterUnit {
    Wh,
    KWh,
    W,
    KW,
    V,
    A,
    Percent,
    Other,
}

impl Default for MeterUnit {
    fn default() -> Self {
        Self::Wh
    }
}

/// AC phase tag, or none for a DC / unphased reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    L1,
    L1N,
    L2,
    L2N,
    L3,
    L3N,
}

/// Numeric payload when `format == Raw`, or opaque bytes preserved verbatim
/// for a signed-meter payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeterValueData {
    Numeric(f64),
    Signed(Vec<u8>),
}

/// One flattened `(stationId, connectorId, transactionId?, timestamp,
/// attribute, value)` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterValue {
    pub station_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub context: MeterContext,
    pub format: MeterFormat,
    pub measurand: Measurand,
    pub location: MeterLocation,
    pub unit: MeterUnit,
    pub phase: Option<Phase>,
    pub value: MeterValueData,
}

impl MeterValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match &self.value {
            MeterValueData::Numeric(v) => Some(*v),
            MeterValueData::Signed(_) => None,
        }
    }

    /// Watts, normalizing kWh-tagged power readings.
    pub fn watts(&self) -> Option<f64> {
        let raw = self.as_numeric()?;
        match self.unit {
            MeterUnit::KW => Some(raw * 1000.0),
            _ => Some(raw),
        }
    }
}
