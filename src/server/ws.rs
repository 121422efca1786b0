//! OCPP 1.6 WebSocket ingress.
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{tenant}/{chargeBoxIdentity}`
//! (or the bare `/{chargeBoxIdentity}` form against a single default tenant,
//! for a deployment that doesn't split by tenant at the WS layer) and speaks
//! the OCPP-J `[messageTypeId, uniqueId, ...]` array framing directly on top
//! of `tokio-tungstenite`, rather than going through axum's WS upgrade.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::application::charging::{dispatch, normalizer};
use crate::application::charging::messages::InboundHeader;
use crate::application::charging::ChargingEngine;
use crate::domain::ocpp::{OcppTransport, OcppVersion};
use crate::domain::tenant::TenantId;
use crate::support::errors::CoreError;
use crate::support::shutdown::ShutdownSignal;

const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

const CALL: u64 = 2;
const CALL_RESULT: u64 = 3;
const CALL_ERROR: u64 = 4;

pub struct WsServer {
    engine: Arc<ChargingEngine>,
    shutdown: ShutdownSignal,
}

impl WsServer {
    pub fn new(engine: Arc<ChargingEngine>, shutdown: ShutdownSignal) -> Self {
        Self { engine, shutdown }
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("OCPP 1.6 WebSocket ingress listening on ws://{addr}");
        info!("charge points should connect to ws://{addr}/ocpp/{{tenant}}/{{chargeBoxIdentity}}");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!(error = %e, "failed to accept WebSocket connection"),
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("WebSocket ingress received shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let engine = self.engine.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, engine, shutdown).await {
                error!(peer = %peer, error = %e, "WebSocket connection ended with an error");
            }
        });
    }
}

/// `/ocpp/{tenant}/{chargeBoxIdentity}` or `/{chargeBoxIdentity}` against
/// the nil tenant, mirroring the bare-path fallback a station's firmware
/// commonly falls back to.
fn extract_identity(path: &str) -> (TenantId, String) {
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["ocpp", tenant, charge_box_id] => {
            let tenant_id = tenant.parse::<TenantId>().unwrap_or_default();
            (tenant_id, charge_box_id.to_string())
        }
        [charge_box_id] => (TenantId::default(), charge_box_id.to_string()),
        [first, rest @ ..] if !rest.is_empty() => (TenantId::default(), format!("{first}/{}", rest.join("/"))),
        _ => (TenantId::default(), "UNKNOWN".to_string()),
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<ChargingEngine>,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut identity: Option<(TenantId, String)> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();
            identity = Some(extract_identity(path));

            let requested = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if requested.split(',').map(str::trim).any(|p| p == OCPP_SUBPROTOCOL) {
                response.headers_mut().insert("Sec-WebSocket-Protocol", OCPP_SUBPROTOCOL.parse().unwrap());
            } else if !requested.is_empty() {
                warn!(peer = %peer, requested, "client did not offer the ocpp1.6 subprotocol");
            }
            Ok(response)
        },
    )
    .await?;

    let (tenant_id, charge_box_identity) = identity.unwrap_or((TenantId::default(), format!("CP_{}", peer.port())));
    info!(peer = %peer, station = %charge_box_identity, "WebSocket connection accepted");

    let (mut sender, mut receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text)).await {
                error!(error = %e, "failed to send WebSocket frame");
                break;
            }
        }
    });

    let recv_engine = engine.clone();
    let recv_tenant = tenant_id;
    let recv_station = charge_box_identity.clone();
    let recv_peer = peer;
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(reply) = handle_frame(&recv_engine, recv_tenant, &recv_station, &recv_peer, &text).await {
                        if tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!(station = %recv_station, ?frame, "station closed the connection");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Binary(data)) => {
                    warn!(station = %recv_station, bytes = data.len(), "ignoring unexpected binary frame");
                }
                Err(e) => {
                    error!(station = %recv_station, error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
        _ = shutdown.wait() => {
            info!(station = %charge_box_identity, "closing connection for server shutdown");
        }
    }

    info!(station = %charge_box_identity, "WebSocket connection closed");
    Ok(())
}

/// Unwrap the OCPP-J array framing, decode/dispatch/encode through the
/// core, and re-wrap the response. Returns `None` only when the inbound
/// frame isn't even a well-formed array (nothing sensible to reply with).
async fn handle_frame(
    engine: &ChargingEngine,
    tenant_id: TenantId,
    charge_box_identity: &str,
    peer: &SocketAddr,
    text: &str,
) -> Option<String> {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(station = charge_box_identity, error = %e, "dropping malformed JSON frame");
            return None;
        }
    };
    let array = frame.as_array()?;
    let message_type = array.first()?.as_u64()?;
    let unique_id = array.get(1)?.as_str()?.to_string();

    if message_type != CALL {
        // CallResult/CallError in reply to a server-initiated command; the
        // core never sends those, so there is nothing to correlate here.
        return None;
    }

    let action = array.get(2)?.as_str()?.to_string();
    let payload = array.get(3).cloned().unwrap_or(Value::Object(Default::default()));

    let header = InboundHeader {
        tenant_id,
        charge_box_identity: charge_box_identity.to_string(),
        client_ip: Some(peer.ip().to_string()),
        ocpp_version: OcppVersion::V16,
        ocpp_transport: OcppTransport::Json,
        token: None,
        soap_from: None,
        received_at: Utc::now(),
    };

    let reply = match normalizer::decode_v16_json(&header, &action, &payload) {
        Ok(msg) => {
            let response = dispatch(engine, &header, msg).await;
            let encoded = normalizer::encode_v16_json(&response);
            if matches!(response, crate::application::charging::NormalizedResponse::Error(_)) {
                let (code, description) = error_fields(&encoded);
                serde_json::json!([CALL_ERROR, unique_id, code, description, {}])
            } else {
                serde_json::json!([CALL_RESULT, unique_id, encoded])
            }
        }
        Err(e) => {
            warn!(station = charge_box_identity, action, error = %e, "rejecting malformed Call");
            serde_json::json!([CALL_ERROR, unique_id, protocol_error_code(&e), e.to_string(), {}])
        }
    };

    Some(reply.to_string())
}

fn protocol_error_code(e: &CoreError) -> &'static str {
    match e {
        CoreError::Protocol(_) => "FormationViolation",
        _ => "InternalError",
    }
}

fn error_fields(encoded: &Value) -> (String, String) {
    let code = encoded.get("code").and_then(Value::as_str).unwrap_or("InternalError").to_string();
    let description = encoded.get("description").and_then(Value::as_str).unwrap_or("").to_string();
    (code, description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tenant_scoped_path() {
        let tenant = TenantId::new();
        let (t, station) = extract_identity(&format!("/ocpp/{tenant}/CB-1"));
        assert_eq!(t, tenant);
        assert_eq!(station, "CB-1");
    }

    #[test]
    fn extracts_bare_path_against_default_tenant() {
        let (_, station) = extract_identity("/CB-1");
        assert_eq!(station, "CB-1");
    }
}
