//! The single internal message shape every OCPP version is normalized into.
//! Version differences live only in `normalizer.rs`; everything
//! downstream of decode deals exclusively with these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::meter_value::MeterValue;
use crate::domain::ocpp::{OcppTransport, OcppVersion};
use crate::domain::tenant::TenantId;

/// Per-message context the transport layer supplies alongside the decoded
/// body: who is talking, on what protocol, from where.
#[derive(Debug, Clone)]
pub struct InboundHeader {
    pub tenant_id: TenantId,
    pub charge_box_identity: String,
    pub client_ip: Option<String>,
    pub ocpp_version: OcppVersion,
    pub ocpp_transport: OcppTransport,
    pub token: Option<String>,
    /// The SOAP `From.Address` header, present only on 1.5 frames.
    pub soap_from: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BootNotification {
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Heartbeat;

#[derive(Debug, Clone)]
pub struct StatusNotification {
    pub connector_id: u32,
    pub status: crate::domain::charge_point::ConnectorStatus,
    pub error_code: Option<String>,
    pub info: Option<String>,
    pub vendor_error_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MeterValues {
    pub connector_id: u32,
    pub transaction_id: Option<i64>,
    pub meter_values: Vec<MeterValue>,
}

#[derive(Debug, Clone)]
pub struct Authorize {
    pub id_tag: String,
}

#[derive(Debug, Clone)]
pub struct StartTransaction {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: f64,
    pub timestamp: DateTime<Utc>,
}

/// `transaction_data` is `None` when the station sent no closing meter
/// values, and `Some` once the normalizer has validated its shape matches
/// the station's declared OCPP version. `transaction_data_invalid` is set
/// instead of `transaction_data` when the payload's shape belongs to the
/// *other* OCPP version — §4.D.3/§8.5's "stop rejected with `Invalid`"
/// case, not a transport-level decode failure.
#[derive(Debug, Clone)]
pub struct StopTransaction {
    pub transaction_id: i64,
    pub id_tag: Option<String>,
    pub meter_stop: f64,
    pub timestamp: DateTime<Utc>,
    pub transaction_data: Option<Vec<MeterValue>>,
    pub transaction_data_invalid: bool,
}

#[derive(Debug, Clone)]
pub struct DataTransfer {
    pub vendor_id: String,
    pub message_id: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FirmwareStatusNotification {
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsStatusNotification {
    pub status: String,
}

/// The tagged variant every inbound frame decodes into.
#[derive(Debug, Clone)]
pub enum NormalizedMessage {
    Boot(BootNotification),
    Heartbeat(Heartbeat),
    Status(StatusNotification),
    MeterValues(MeterValues),
    Authorize(Authorize),
    StartTx(StartTransaction),
    StopTx(StopTransaction),
    DataTransfer(DataTransfer),
    FirmwareStatus(FirmwareStatusNotification),
    DiagnosticsStatus(DiagnosticsStatusNotification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTagStatus {
    Accepted,
    Invalid,
    Blocked,
    Expired,
    ConcurrentTx,
}

#[derive(Debug, Clone)]
pub struct BootResponse {
    pub status: crate::domain::charge_point::RegistrationStatus,
    pub current_time: DateTime<Utc>,
    pub interval_secs: u32,
}

#[derive(Debug, Clone)]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatusResponse;

#[derive(Debug, Clone)]
pub struct MeterValuesResponse;

#[derive(Debug, Clone)]
pub struct AuthorizeResponse {
    pub status: IdTagStatus,
}

#[derive(Debug, Clone)]
pub struct StartTransactionResponse {
    pub transaction_id: i64,
    pub status: IdTagStatus,
}

#[derive(Debug, Clone)]
pub struct StopTransactionResponse {
    pub status: IdTagStatus,
}

#[derive(Debug, Clone)]
pub struct DataTransferResponse {
    pub status: String,
    pub data: Option<String>,
}

/// Error envelope for a structurally invalid inbound frame: 1.6/JSON
/// errors return `[4, uniqueId, code, description, details]`.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum NormalizedResponse {
    Boot(BootResponse),
    Heartbeat(HeartbeatResponse),
    Status(StatusResponse),
    MeterValues(MeterValuesResponse),
    Authorize(AuthorizeResponse),
    StartTx(StartTransactionResponse),
    StopTx(StopTransactionResponse),
    DataTransfer(DataTransferResponse),
    Error(ErrorResponse),
}
