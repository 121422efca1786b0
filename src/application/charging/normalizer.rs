//! Protocol Normalizer — hides OCPP 1.5/1.6 wire differences behind
//! the single [`NormalizedMessage`] shape. 1.6 decodes via `rust-ocpp`'s
//! JSON message types; 1.5 decodes via hand-rolled `quick-xml` structs
//! against the OCPP 1.5 SOAP XSDs, since nothing in the OCPP ecosystem
//! ships a ready-made 1.5 XML binding.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use rust_ocpp::v1_6::messages::authorize::AuthorizeRequest;
use rust_ocpp::v1_6::messages::boot_notification::BootNotificationRequest;
use rust_ocpp::v1_6::messages::data_transfer::DataTransferRequest;
use rust_ocpp::v1_6::messages::meter_values::MeterValuesRequest;
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionRequest;
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionRequest;
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, ChargePointStatus as WireConnectorStatus, Measurand as WireMeasurand,
    Phase as WirePhase, ReadingContext as WireReadingContext, UnitOfMeasure,
};

use crate::domain::charge_point::ConnectorStatus;
use crate::domain::meter_value::{
    MeterContext, MeterFormat, MeterLocation, MeterUnit, MeterValue, MeterValueData, Measurand, Phase,
};
use crate::support::errors::{CoreError, CoreResult};

use super::messages::*;

/// Decode a 1.6 JSON-RPC array frame's payload, given the already-parsed
/// `action` name (the normalizer is handed the payload value directly; the
/// WS ingress is responsible for unwrapping the `[callType, uniqueId,
/// action, payload]` envelope).
pub fn decode_v16_json(
    header: &InboundHeader,
    action: &str,
    payload: &serde_json::Value,
) -> CoreResult<NormalizedMessage> {
    match action {
        "BootNotification" => {
            let req: BootNotificationRequest = parse(payload)?;
            Ok(NormalizedMessage::Boot(BootNotification {
                vendor: req.charge_point_vendor,
                model: req.charge_point_model,
                serial_number: req.charge_point_serial_number,
                firmware_version: req.firmware_version,
                timestamp: header.received_at,
            }))
        }
        "Heartbeat" => Ok(NormalizedMessage::Heartbeat(Heartbeat)),
        "StatusNotification" => {
            let req: StatusNotificationRequest = parse(payload)?;
            Ok(NormalizedMessage::Status(StatusNotification {
                connector_id: req.connector_id as u32,
                status: map_connector_status(req.status),
                error_code: Some(format!("{:?}", req.error_code)),
                info: req.info,
                vendor_error_code: req.vendor_error_code,
                timestamp: req.timestamp.unwrap_or(header.received_at),
            }))
        }
        "MeterValues" => {
            let req: MeterValuesRequest = parse(payload)?;
            let connector_id = req.connector_id as u32;
            let transaction_id = req.transaction_id.map(i64::from);
            let mut values = Vec::new();
            for mv in req.meter_value {
                for sampled in mv.sampled_value {
                    let format = MeterFormat::Raw;
                    let measurand = sampled
                        .measurand
                        .map(map_measurand)
                        .unwrap_or(Measurand::EnergyActiveImportRegister);
                    let unit = sampled.unit.map(map_unit).unwrap_or(MeterUnit::Wh);
                    let context = sampled.context.map(map_context).unwrap_or_default();
                    let phase = sampled.phase.map(map_phase);
                    let value = match sampled.value.parse::<f64>() {
                        Ok(v) => MeterValueData::Numeric(v),
                        Err(_) => MeterValueData::Signed(sampled.value.into_bytes()),
                    };
                    values.push(MeterValue {
                        station_id: header.charge_box_identity.clone(),
                        connector_id,
                        transaction_id,
                        timestamp: mv.timestamp,
                        context,
                        format,
                        measurand,
                        location: MeterLocation::Outlet,
                        unit,
                        phase,
                        value,
                    });
                }
            }
            Ok(NormalizedMessage::MeterValues(MeterValues {
                connector_id,
                transaction_id,
                meter_values: values,
            }))
        }
        "Authorize" => {
            let req: AuthorizeRequest = parse(payload)?;
            Ok(NormalizedMessage::Authorize(Authorize { id_tag: req.id_tag }))
        }
        "StartTransaction" => {
            let req: StartTransactionRequest = parse(payload)?;
            Ok(NormalizedMessage::StartTx(StartTransaction {
                connector_id: req.connector_id as u32,
                id_tag: req.id_tag,
                meter_start: req.meter_start as f64,
                timestamp: req.timestamp,
            }))
        }
        "StopTransaction" => {
            // Checked before the strict `rust-ocpp` parse below: a 1.5-shaped
            // `transactionData` object would fail that parse outright (its
            // `transaction_data` field expects the 1.6 array shape), so a
            // mismatch is handled here from the raw JSON, not as a decode error.
            let (transaction_data, transaction_data_invalid) = decode_v16_transaction_data(header, payload)?;
            if transaction_data_invalid {
                let transaction_id = payload.get("transactionId").and_then(|v| v.as_i64()).unwrap_or(0);
                let id_tag = payload.get("idTag").and_then(|v| v.as_str()).map(str::to_string);
                let meter_stop = payload.get("meterStop").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let timestamp = payload
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(header.received_at);
                return Ok(NormalizedMessage::StopTx(StopTransaction {
                    transaction_id,
                    id_tag,
                    meter_stop,
                    timestamp,
                    transaction_data: None,
                    transaction_data_invalid: true,
                }));
            }
            let req: StopTransactionRequest = parse(payload)?;
            Ok(NormalizedMessage::StopTx(StopTransaction {
                transaction_id: req.transaction_id as i64,
                id_tag: req.id_tag,
                meter_stop: req.meter_stop as f64,
                timestamp: req.timestamp,
                transaction_data,
                transaction_data_invalid: false,
            }))
        }
        "DataTransfer" => {
            let req: DataTransferRequest = parse(payload)?;
            Ok(NormalizedMessage::DataTransfer(DataTransfer {
                vendor_id: req.vendor_id,
                message_id: req.message_id,
                data: req.data,
            }))
        }
        "FirmwareStatusNotification" => {
            let status = payload
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string();
            Ok(NormalizedMessage::FirmwareStatus(FirmwareStatusNotification { status }))
        }
        "DiagnosticsStatusNotification" => {
            let status = payload
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string();
            Ok(NormalizedMessage::DiagnosticsStatus(DiagnosticsStatusNotification { status }))
        }
        other => Err(CoreError::protocol(format!("unknown 1.6 action '{other}'"))),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(payload: &serde_json::Value) -> CoreResult<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| CoreError::protocol(format!("malformed payload: {e}")))
}

/// StopTransaction's optional `transactionData` is protocol-version
/// sensitive: 1.6 carries an array of `{timestamp, sampledValue[]}`.
/// If the station instead sent the 1.5-shaped `{values: [...]}` object (or
/// array elements shaped that way) under the same key, that's a station
/// talking 1.5 over a 1.6 session. That's not a malformed frame — it's a
/// normal (if confused) stop that the handler rejects with `Invalid`, so the
/// mismatch is returned as data rather than an `Err`; only a genuinely
/// corrupt entry (e.g. an unparseable timestamp) is a decode error.
fn decode_v16_transaction_data(
    header: &InboundHeader,
    payload: &serde_json::Value,
) -> CoreResult<(Option<Vec<MeterValue>>, bool)> {
    let Some(raw) = payload.get("transactionData") else {
        return Ok((None, false));
    };
    let Some(entries) = raw.as_array() else {
        return Ok((None, true));
    };

    let mut values = Vec::new();
    for entry in entries {
        if entry.get("value").is_some() || entry.get("sampledValue").is_none() {
            return Ok((None, true));
        }
        let timestamp = entry
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CoreError::protocol("transactionData entry missing a valid timestamp"))?;
        let sampled = entry
            .get("sampledValue")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for sv in sampled {
            let measurand = sv
                .get("measurand")
                .and_then(|v| v.as_str())
                .map(Measurand::from_wire)
                .unwrap_or(Measurand::EnergyActiveImportRegister);
            let unit = match sv.get("unit").and_then(|v| v.as_str()) {
                Some("kWh") => MeterUnit::KWh,
                Some("W") => MeterUnit::W,
                Some("kW") => MeterUnit::KW,
                Some("V") => MeterUnit::V,
                Some("A") => MeterUnit::A,
                Some("Percent") => MeterUnit::Percent,
                _ => MeterUnit::Wh,
            };
            let context = match sv.get("context").and_then(|v| v.as_str()) {
                Some("Sample.Clock") => MeterContext::SampleClock,
                Some("Transaction.Begin") => MeterContext::TransactionBegin,
                Some("Transaction.End") => MeterContext::TransactionEnd,
                Some("Interruption.Begin") => MeterContext::InterruptionBegin,
                Some("Interruption.End") => MeterContext::InterruptionEnd,
                Some("Other") => MeterContext::Other,
                _ => MeterContext::SamplePeriodic,
            };
            let raw_value = sv.get("value").and_then(|v| v.as_str()).unwrap_or_default();
            let value = match raw_value.parse::<f64>() {
                Ok(v) => MeterValueData::Numeric(v),
                Err(_) => MeterValueData::Signed(raw_value.as_bytes().to_vec()),
            };
            let phase = match sv.get("phase").and_then(|v| v.as_str()) {
                Some("L1") => Some(Phase::L1),
                Some("L1-N") => Some(Phase::L1N),
                Some("L2") => Some(Phase::L2),
                Some("L2-N") => Some(Phase::L2N),
                Some("L3") => Some(Phase::L3),
                Some("L3-N") => Some(Phase::L3N),
                _ => None,
            };
            values.push(MeterValue {
                station_id: header.charge_box_identity.clone(),
                connector_id: 0,
                transaction_id: None,
                timestamp,
                context,
                format: MeterFormat::Raw,
                measurand,
                location: MeterLocation::Outlet,
                unit,
                phase,
                value,
            });
        }
    }
    Ok((Some(values), false))
}

fn map_connector_status(status: WireConnectorStatus) -> ConnectorStatus {
    match status {
        WireConnectorStatus::Available => ConnectorStatus::Available,
        WireConnectorStatus::Preparing => ConnectorStatus::Preparing,
        WireConnectorStatus::Charging => ConnectorStatus::Charging,
        WireConnectorStatus::SuspendedEV => ConnectorStatus::SuspendedEV,
        WireConnectorStatus::SuspendedEVSE => ConnectorStatus::SuspendedEVSE,
        WireConnectorStatus::Finishing => ConnectorStatus::Finishing,
        WireConnectorStatus::Reserved => ConnectorStatus::Reserved,
        WireConnectorStatus::Unavailable => ConnectorStatus::Unavailable,
        WireConnectorStatus::Faulted => ConnectorStatus::Faulted,
    }
}

fn map_measurand(m: WireMeasurand) -> Measurand {
    match m {
        WireMeasurand::EnergyActiveImportRegister => Measurand::EnergyActiveImportRegister,
        WireMeasurand::PowerActiveImport => Measurand::PowerActiveImport,
        WireMeasurand::CurrentImport => Measurand::CurrentImport,
        WireMeasurand::Voltage => Measurand::Voltage,
        WireMeasurand::SoC => Measurand::SoC,
        other => Measurand::Other(format!("{other:?}")),
    }
}

fn map_context(c: WireReadingContext) -> MeterContext {
    match c {
        WireReadingContext::SamplePeriodic => MeterContext::SamplePeriodic,
        WireReadingContext::SampleClock => MeterContext::SampleClock,
        WireReadingContext::TransactionBegin => MeterContext::TransactionBegin,
        WireReadingContext::TransactionEnd => MeterContext::TransactionEnd,
        WireReadingContext::InterruptionBegin => MeterContext::InterruptionBegin,
        WireReadingContext::InterruptionEnd => MeterContext::InterruptionEnd,
        WireReadingContext::Other => MeterContext::Other,
        #[allow(unreachable_patterns)]
        _ => MeterContext::Other,
    }
}

/// Phase-to-phase readings (L1-L2, L2-L3, L3-L1) and the bare neutral tap
/// have no slot in our phase-resolved model (only L1/L2/L3/DC are carried);
/// fold them to the nearest single-phase leg rather than dropping the value.
fn map_phase(p: WirePhase) -> Phase {
    match p {
        WirePhase::L1 => Phase::L1,
        WirePhase::L2 => Phase::L2,
        WirePhase::L3 => Phase::L3,
        WirePhase::L1N => Phase::L1N,
        WirePhase::L2N => Phase::L2N,
        WirePhase::L3N => Phase::L3N,
        WirePhase::N => Phase::L1N,
        WirePhase::L1L2 => Phase::L1,
        WirePhase::L2L3 => Phase::L2,
        WirePhase::L3L1 => Phase::L3,
        #[allow(unreachable_patterns)]
        _ => Phase::L1,
    }
}

fn map_unit(u: UnitOfMeasure) -> MeterUnit {
    match u {
        UnitOfMeasure::Wh => MeterUnit::Wh,
        UnitOfMeasure::KWh => MeterUnit::KWh,
        UnitOfMeasure::W => MeterUnit::W,
        UnitOfMeasure::Kw => MeterUnit::KW,
        UnitOfMeasure::V => MeterUnit::V,
        UnitOfMeasure::A => MeterUnit::A,
        UnitOfMeasure::Percent => MeterUnit::Percent,
        _ => MeterUnit::Other,
    }
}

/// Encode a normalized response back into the 1.6 JSON payload (the `[3,
/// uniqueId, payload]` wrapping is the WS ingress's job, not the
/// normalizer's).
pub fn encode_v16_json(response: &NormalizedResponse) -> serde_json::Value {
    use rust_ocpp::v1_6::messages::authorize::AuthorizeResponse as WireAuthorizeResponse;
    use rust_ocpp::v1_6::messages::boot_notification::BootNotificationResponse as WireBootResponse;
    use rust_ocpp::v1_6::messages::data_transfer::DataTransferResponse as WireDataTransferResponse;
    use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse as WireHeartbeatResponse;
    use rust_ocpp::v1_6::messages::meter_values::MeterValuesResponse as WireMeterValuesResponse;
    use rust_ocpp::v1_6::messages::start_transaction::StartTransactionResponse as WireStartTransactionResponse;
    use rust_ocpp::v1_6::messages::status_notification::StatusNotificationResponse as WireStatusResponse;
    use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionResponse as WireStopTransactionResponse;
    use rust_ocpp::v1_6::types::{DataTransferStatus, IdTagInfo, RegistrationStatus as WireRegistrationStatus};

    let status_to_wire = |s: IdTagStatus| match s {
        IdTagStatus::Accepted => AuthorizationStatus::Accepted,
        IdTagStatus::Invalid => AuthorizationStatus::Invalid,
        IdTagStatus::Blocked => AuthorizationStatus::Blocked,
        IdTagStatus::Expired => AuthorizationStatus::Expired,
        IdTagStatus::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
    };

    match response {
        NormalizedResponse::Boot(r) => {
            let status = match r.status {
                crate::domain::charge_point::RegistrationStatus::Accepted => WireRegistrationStatus::Accepted,
                crate::domain::charge_point::RegistrationStatus::Pending => WireRegistrationStatus::Pending,
                crate::domain::charge_point::RegistrationStatus::Rejected => WireRegistrationStatus::Rejected,
            };
            serde_json::to_value(WireBootResponse {
                current_time: r.current_time,
                interval: r.interval_secs as i64,
                status,
            })
            .unwrap_or_default()
        }
        NormalizedResponse::Heartbeat(r) => {
            serde_json::to_value(WireHeartbeatResponse { current_time: r.current_time }).unwrap_or_default()
        }
        NormalizedResponse::Status(_) => serde_json::to_value(WireStatusResponse {}).unwrap_or_default(),
        NormalizedResponse::MeterValues(_) => {
            serde_json::to_value(WireMeterValuesResponse {}).unwrap_or_default()
        }
        NormalizedResponse::Authorize(r) => serde_json::to_value(WireAuthorizeResponse {
            id_tag_info: IdTagInfo {
                status: status_to_wire(r.status),
                expiry_date: None,
                parent_id_tag: None,
            },
        })
        .unwrap_or_default(),
        NormalizedResponse::StartTx(r) => serde_json::to_value(WireStartTransactionResponse {
            transaction_id: r.transaction_id as i32,
            id_tag_info: IdTagInfo {
                status: status_to_wire(r.status),
                expiry_date: None,
                parent_id_tag: None,
            },
        })
        .unwrap_or_default(),
        NormalizedResponse::StopTx(r) => serde_json::to_value(WireStopTransactionResponse {
            id_tag_info: Some(IdTagInfo {
                status: status_to_wire(r.status),
                expiry_date: None,
                parent_id_tag: None,
            }),
        })
        .unwrap_or_default(),
        NormalizedResponse::DataTransfer(r) => serde_json::to_value(WireDataTransferResponse {
            status: match r.status.as_str() {
                "Accepted" => DataTransferStatus::Accepted,
                "UnknownMessageId" => DataTransferStatus::UnknownMessageId,
                "UnknownVendorId" => DataTransferStatus::UnknownVendorId,
                _ => DataTransferStatus::Rejected,
            },
            data: r.data.clone(),
        })
        .unwrap_or_default(),
        NormalizedResponse::Error(e) => serde_json::json!({ "code": e.code, "description": e.description }),
    }
}

// ── OCPP 1.5 / SOAP ──────────────────────────────────────────────

/// Minimal XSD-shaped structs for the handful of 1.5 message bodies this
/// core accepts. 1.5's `values[].value.$attributes / $value` flattening is
/// handled in [`decode_v15_soap`] directly rather than via serde, since the
/// attribute/value split doesn't map onto a single struct field.
mod soap_shapes {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BootNotificationRequest {
        pub charge_point_vendor: String,
        pub charge_point_model: String,
        pub charge_point_serial_number: Option<String>,
        pub firmware_version: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatusNotificationRequest {
        pub connector_id: u32,
        pub status: String,
        pub error_code: Option<String>,
        pub info: Option<String>,
        pub vendor_error_code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AuthorizeRequest {
        pub id_tag: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StartTransactionRequest {
        pub connector_id: u32,
        pub id_tag: String,
        pub meter_start: i64,
        pub timestamp: chrono::DateTime<chrono::Utc>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StopTransactionRequest {
        pub transaction_id: i64,
        pub id_tag: Option<String>,
        pub meter_stop: i64,
        pub timestamp: chrono::DateTime<chrono::Utc>,
        #[serde(default, rename = "transactionData")]
        pub transaction_data: Option<TransactionDataWrapper>,
    }

    /// The same core fields as [`StopTransactionRequest`], without a
    /// `transactionData` field at all, so a body whose `transactionData`
    /// is 1.6-shaped (and so won't deserialize into
    /// [`TransactionDataWrapper`]) can still be parsed for its other fields.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StopTransactionRequestCore {
        pub transaction_id: i64,
        pub id_tag: Option<String>,
        pub meter_stop: i64,
        pub timestamp: chrono::DateTime<chrono::Utc>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TransactionDataWrapper {
        #[serde(default, rename = "values")]
        pub values: Vec<TimestampedValues>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MeterValueAttribute {
        #[serde(rename = "@context", default)]
        pub context: Option<String>,
        #[serde(rename = "@format", default)]
        pub format: Option<String>,
        #[serde(rename = "@measurand", default)]
        pub measurand: Option<String>,
        #[serde(rename = "@location", default)]
        pub location: Option<String>,
        #[serde(rename = "@unit", default)]
        pub unit: Option<String>,
        #[serde(rename = "@phase", default)]
        pub phase: Option<String>,
        #[serde(rename = "$value", default)]
        pub value: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct TimestampedValues {
        pub timestamp: chrono::DateTime<chrono::Utc>,
        #[serde(default, rename = "value")]
        pub values: Vec<MeterValueAttribute>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MeterValuesRequest {
        pub connector_id: u32,
        pub transaction_id: Option<i64>,
        #[serde(default, rename = "values")]
        pub values: Vec<TimestampedValues>,
    }
}

/// A thin envelope the SOAP ingress hands to the normalizer after stripping
/// the `soap:Envelope`/`soap:Header`/`soap:Body` wrapping: the SOAPAction
/// name and the raw inner XML of the action element.
pub struct SoapFrame<'a> {
    pub action: &'a str,
    pub body_xml: &'a str,
}

pub fn decode_v15_soap(header: &InboundHeader, frame: &SoapFrame<'_>) -> CoreResult<NormalizedMessage> {
    use soap_shapes::*;

    let parse_xml = |xml: &str| -> CoreResult<_> {
        quick_xml::de::from_str(xml).map_err(|e| CoreError::protocol(format!("malformed SOAP body: {e}")))
    };

    match frame.action {
        "BootNotification" => {
            let req: BootNotificationRequest = parse_xml(frame.body_xml)?;
            Ok(NormalizedMessage::Boot(BootNotification {
                vendor: req.charge_point_vendor,
                model: req.charge_point_model,
                serial_number: req.charge_point_serial_number,
                firmware_version: req.firmware_version,
                timestamp: header.received_at,
            }))
        }
        "Heartbeat" => Ok(NormalizedMessage::Heartbeat(Heartbeat)),
        "StatusNotification" => {
            let req: StatusNotificationRequest = parse_xml(frame.body_xml)?;
            Ok(NormalizedMessage::Status(StatusNotification {
                connector_id: req.connector_id,
                status: map_wire_status_string(&req.status),
                error_code: req.error_code,
                info: req.info,
                vendor_error_code: req.vendor_error_code,
                timestamp: header.received_at,
            }))
        }
        "Authorize" => {
            let req: AuthorizeRequest = parse_xml(frame.body_xml)?;
            Ok(NormalizedMessage::Authorize(Authorize { id_tag: req.id_tag }))
        }
        "StartTransaction" => {
            let req: StartTransactionRequest = parse_xml(frame.body_xml)?;
            Ok(NormalizedMessage::StartTx(StartTransaction {
                connector_id: req.connector_id,
                id_tag: req.id_tag,
                meter_start: req.meter_start as f64,
                timestamp: req.timestamp,
            }))
        }
        "StopTransaction" => {
            // A 1.6-shaped `sampledValue` array under transactionData never
            // appears in a well-formed 1.5 body; its presence means a
            // station is talking 1.6 semantics over a 1.5 session. That's not
            // a malformed frame, so parse the core fields only (the full
            // `StopTransactionRequest` would fail to deserialize its
            // `transactionData` field against this shape) and let the
            // handler reject the stop with `Invalid`.
            if frame.body_xml.contains("sampledValue") {
                let req: StopTransactionRequestCore = parse_xml(frame.body_xml)?;
                return Ok(NormalizedMessage::StopTx(StopTransaction {
                    transaction_id: req.transaction_id,
                    id_tag: req.id_tag,
                    meter_stop: req.meter_stop as f64,
                    timestamp: req.timestamp,
                    transaction_data: None,
                    transaction_data_invalid: true,
                }));
            }
            let req: StopTransactionRequest = parse_xml(frame.body_xml)?;
            let tx_id = req.transaction_id;
            let transaction_data = req.transaction_data.map(|wrapper| {
                wrapper
                    .values
                    .into_iter()
                    .flat_map(|tv| {
                        let ts = tv.timestamp;
                        tv.values
                            .into_iter()
                            .map(move |attr| flatten_soap_attribute(header, 0, Some(tx_id), ts, attr))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            });
            Ok(NormalizedMessage::StopTx(StopTransaction {
                transaction_id: req.transaction_id,
                id_tag: req.id_tag,
                meter_stop: req.meter_stop as f64,
                timestamp: req.timestamp,
                transaction_data,
                transaction_data_invalid: false,
            }))
        }
        "MeterValues" => {
            let req: MeterValuesRequest = parse_xml(frame.body_xml)?;
            let connector_id = req.connector_id;
            let transaction_id = req.transaction_id;
            let mut values = Vec::new();
            for tv in req.values {
                for attr in tv.values {
                    values.push(flatten_soap_attribute(header, connector_id, transaction_id, tv.timestamp, attr));
                }
            }
            Ok(NormalizedMessage::MeterValues(MeterValues {
                connector_id,
                transaction_id,
                meter_values: values,
            }))
        }
        other => Err(CoreError::protocol(format!("unknown 1.5 action '{other}'"))),
    }
}

fn flatten_soap_attribute(
    header: &InboundHeader,
    connector_id: u32,
    transaction_id: Option<i64>,
    timestamp: DateTime<Utc>,
    attr: soap_shapes::MeterValueAttribute,
) -> MeterValue {
    let context = match attr.context.as_deref() {
        Some("Sample.Clock") => MeterContext::SampleClock,
        Some("Transaction.Begin") => MeterContext::TransactionBegin,
        Some("Transaction.End") => MeterContext::TransactionEnd,
        Some("Interruption.Begin") => MeterContext::InterruptionBegin,
        Some("Interruption.End") => MeterContext::InterruptionEnd,
        Some("Other") => MeterContext::Other,
        _ => MeterContext::SamplePeriodic,
    };
    let format = match attr.format.as_deref() {
        Some("SignedData") => MeterFormat::SignedData,
        _ => MeterFormat::Raw,
    };
    let measurand = attr
        .measurand
        .as_deref()
        .map(Measurand::from_wire)
        .unwrap_or(Measurand::EnergyActiveImportRegister);
    let location = match attr.location.as_deref() {
        Some("Inlet") => MeterLocation::Inlet,
        Some("Body") => MeterLocation::Body,
        Some("Cable") => MeterLocation::Cable,
        Some("EV") => MeterLocation::Ev,
        _ => MeterLocation::Outlet,
    };
    let unit = match attr.unit.as_deref() {
        Some("kWh") => MeterUnit::KWh,
        Some("W") => MeterUnit::W,
        Some("kW") => MeterUnit::KW,
        Some("V") => MeterUnit::V,
        Some("A") => MeterUnit::A,
        Some("Percent") => MeterUnit::Percent,
        _ => MeterUnit::Wh,
    };
    let value = match format {
        MeterFormat::SignedData => MeterValueData::Signed(attr.value.clone().into_bytes()),
        MeterFormat::Raw => match attr.value.parse::<f64>() {
            Ok(v) => MeterValueData::Numeric(v),
            Err(_) => MeterValueData::Signed(attr.value.into_bytes()),
        },
    };
    let phase = match attr.phase.as_deref() {
        Some("L1") => Some(Phase::L1),
        Some("L1-N") => Some(Phase::L1N),
        Some("L2") => Some(Phase::L2),
        Some("L2-N") => Some(Phase::L2N),
        Some("L3") => Some(Phase::L3),
        Some("L3-N") => Some(Phase::L3N),
        _ => None,
    };
    MeterValue {
        station_id: header.charge_box_identity.clone(),
        connector_id,
        transaction_id,
        timestamp,
        context,
        format,
        measurand,
        location,
        unit,
        phase,
        value,
    }
}

fn map_wire_status_string(s: &str) -> ConnectorStatus {
    match s {
        "Available" => ConnectorStatus::Available,
        "Preparing" => ConnectorStatus::Preparing,
        "Charging" => ConnectorStatus::Charging,
        "SuspendedEV" => ConnectorStatus::SuspendedEV,
        "SuspendedEVSE" => ConnectorStatus::SuspendedEVSE,
        "Finishing" => ConnectorStatus::Finishing,
        "Reserved" => ConnectorStatus::Reserved,
        "Faulted" => ConnectorStatus::Faulted,
        _ => ConnectorStatus::Unavailable,
    }
}

/// Wrap a normalized response in a minimal SOAP 1.1 envelope carrying the
/// body the OCPP 1.5 XSD names for that action's response.
pub fn encode_v15_soap(action: &str, body_xml: String) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
<soap:Header/>\
<soap:Body><{action}Response xmlns=\"urn://Ocpp/Cp/2012/06/\">{body_xml}</{action}Response></soap:Body>\
</soap:Envelope>"
    )
}
