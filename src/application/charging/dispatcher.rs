//! Top-level routing: one inbound [`NormalizedMessage`] in, one
//! [`NormalizedResponse`] out. No core handler is allowed to
//! propagate an unexpected error to the transport — `StopTransaction` is the
//! only handler that returns a `Result` to its caller, so this is the single
//! place that turns its `Err` into a protocol-shaped rejection.

use tracing::{info, warn};

use crate::support::errors::CoreError;

use super::engine::ChargingEngine;
use super::messages::{
    AuthorizeResponse, BootResponse, DataTransferResponse, ErrorResponse, HeartbeatResponse,
    InboundHeader, MeterValuesResponse, NormalizedMessage, NormalizedResponse, StartTransactionResponse,
    StatusResponse,
};

/// OCPP-J `CallError` codes — the closed set defined by the 1.6 JSON
/// protocol, not a core invention.
fn error_code(e: &CoreError) -> &'static str {
    match e {
        CoreError::Protocol(_) => "FormationViolation",
        CoreError::Resolution(_) => "SecurityError",
        CoreError::Authorization(_) => "GenericError",
        CoreError::State(_) => "GenericError",
        CoreError::Integration { .. } => "InternalError",
        CoreError::Infrastructure(_) => "InternalError",
    }
}

fn to_error_response(e: &CoreError) -> ErrorResponse {
    ErrorResponse { code: error_code(e).to_string(), description: e.to_string() }
}

pub async fn dispatch(
    engine: &ChargingEngine,
    header: &InboundHeader,
    msg: NormalizedMessage,
) -> NormalizedResponse {
    match msg {
        NormalizedMessage::Boot(m) => {
            let r: BootResponse = engine.handle_boot_notification(header, m).await;
            NormalizedResponse::Boot(r)
        }
        NormalizedMessage::Heartbeat(_) => {
            let r: HeartbeatResponse = engine.handle_heartbeat(header).await;
            NormalizedResponse::Heartbeat(r)
        }
        NormalizedMessage::Status(m) => {
            let r: StatusResponse = engine.handle_status_notification(header, m).await;
            NormalizedResponse::Status(r)
        }
        NormalizedMessage::MeterValues(m) => {
            let r: MeterValuesResponse = engine.handle_meter_values(header, m).await;
            NormalizedResponse::MeterValues(r)
        }
        NormalizedMessage::Authorize(m) => {
            let r: AuthorizeResponse = engine.handle_authorize(header, m).await;
            NormalizedResponse::Authorize(r)
        }
        NormalizedMessage::StartTx(m) => {
            let r: StartTransactionResponse = engine.handle_start_transaction(header, m).await;
            NormalizedResponse::StartTx(r)
        }
        NormalizedMessage::StopTx(m) => match engine.handle_stop_transaction(header, m).await {
            Ok(r) => NormalizedResponse::StopTx(r),
            Err(e) => {
                warn!(error = %e, station = %header.charge_box_identity, "StopTransaction rejected at the top level");
                NormalizedResponse::Error(to_error_response(&e))
            }
        },
        NormalizedMessage::DataTransfer(m) => {
            info!(station = %header.charge_box_identity, vendor_id = %m.vendor_id, "DataTransfer received, no vendor extension registered");
            NormalizedResponse::DataTransfer(DataTransferResponse { status: "UnknownVendorId".to_string(), data: None })
        }
        NormalizedMessage::FirmwareStatus(m) => {
            info!(station = %header.charge_box_identity, status = %m.status, "FirmwareStatusNotification received");
            NormalizedResponse::Status(StatusResponse)
        }
        NormalizedMessage::DiagnosticsStatus(m) => {
            info!(station = %header.charge_box_identity, status = %m.status, "DiagnosticsStatusNotification received");
            NormalizedResponse::Status(StatusResponse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::charging::test_support::{engine, MemRepos};
    use crate::domain::ocpp::{OcppTransport, OcppVersion};
    use crate::domain::tenant::TenantId;
    use chrono::Utc;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn heartbeat_routes_to_heartbeat_response() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let eng = engine(repos, Utc::now());
        let resp = dispatch(&eng, &header(tenant_id), NormalizedMessage::Heartbeat(super::super::messages::Heartbeat)).await;
        assert!(matches!(resp, NormalizedResponse::Heartbeat(_)));
    }

    #[tokio::test]
    async fn stop_transaction_error_is_surfaced_as_a_call_error() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let eng = engine(repos, Utc::now());
        let msg = NormalizedMessage::StopTx(super::super::messages::StopTransaction {
            transaction_id: 999,
            id_tag: None,
            meter_stop: 0.0,
            timestamp: Utc::now(),
            transaction_data: None,
            transaction_data_invalid: false,
        });
        let resp = dispatch(&eng, &header(tenant_id), msg).await;
        match resp {
            NormalizedResponse::Error(e) => assert_eq!(e.code, "GenericError"),
            other => panic!("expected an error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn data_transfer_is_acknowledged_as_unknown_vendor() {
        let repos = Arc::new(MemRepos::default());
        let tenant_id = TenantId::new();
        let eng = engine(repos, Utc::now());
        let msg = NormalizedMessage::DataTransfer(super::super::messages::DataTransfer {
            vendor_id: "com.example".to_string(),
            message_id: None,
            data: None,
        });
        let resp = dispatch(&eng, &header(tenant_id), msg).await;
        match resp {
            NormalizedResponse::DataTransfer(r) => assert_eq!(r.status, "UnknownVendorId"),
            other => panic!("expected a DataTransfer response, got {other:?}"),
        }
    }
}
