//! HTTP ingress: the OCPP 1.5 SOAP endpoint, `/healthz`, and `/metrics`,
//! all on one `axum::Router` behind CORS, tracing, rate limiting, and the
//! request-metrics middleware.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::charging::{dispatch, normalizer};
use crate::application::charging::messages::InboundHeader;
use crate::application::charging::ChargingEngine;
use crate::config::{AppConfig, RateLimitConfig};
use crate::domain::ocpp::{OcppTransport, OcppVersion};
use crate::domain::tenant::TenantId;

use super::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use super::soap;

#[derive(Clone)]
struct SoapState {
    engine: Arc<ChargingEngine>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health_check(State(started_at): State<Instant>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started_at.elapsed().as_secs(),
    })
}

/// `POST /ocpp/soap/{tenant}/{chargeBoxIdentity}` — the OCPP 1.5 endpoint.
/// `SOAPAction` names the message; the body is the full SOAP envelope.
async fn handle_soap(
    State(state): State<SoapState>,
    Path((tenant, charge_box_identity)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let tenant_id = tenant.parse::<TenantId>().unwrap_or_default();
    let body_text = match std::str::from_utf8(&body) {
        Ok(s) => s,
        Err(_) => return (StatusCode::BAD_REQUEST, "request body is not valid UTF-8").into_response(),
    };

    let action = headers
        .get("SOAPAction")
        .and_then(|v| v.to_str().ok())
        .map(soap::action_from_header)
        .unwrap_or_default();

    let body_xml = match soap::extract_body_xml(body_text) {
        Ok(xml) => xml,
        Err(e) => {
            warn!(station = charge_box_identity, error = %e, "malformed SOAP envelope");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let header = InboundHeader {
        tenant_id,
        charge_box_identity: charge_box_identity.clone(),
        client_ip: None,
        ocpp_version: OcppVersion::V15,
        ocpp_transport: OcppTransport::Soap,
        token: None,
        soap_from: headers.get("From").and_then(|v| v.to_str().ok()).map(str::to_string),
        received_at: chrono::Utc::now(),
    };

    let frame = soap::parse_frame(&action, &body_xml);
    let response_xml = match normalizer::decode_v15_soap(&header, &frame) {
        Ok(msg) => {
            let response = dispatch(&state.engine, &header, msg).await;
            soap::encode_response(&action, &response)
        }
        Err(e) => {
            warn!(station = charge_box_identity, action, error = %e, "rejecting malformed SOAP Call");
            soap::encode_response(&action, &crate::application::charging::NormalizedResponse::Error(
                crate::application::charging::ErrorResponse { code: "FormationViolation".to_string(), description: e.to_string() },
            ))
        }
    };

    ([("content-type", "text/xml; charset=utf-8")], response_xml).into_response()
}

pub fn build_router(config: &AppConfig, engine: Arc<ChargingEngine>, prometheus_handle: PrometheusHandle) -> Router {
    let started_at = Instant::now();

    let soap_governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit.requests_per_second.max(1) as u64)
        .burst_size(config.rate_limit.burst_size.max(1))
        .use_headers()
        .finish()
        .expect("valid rate limiter configuration");

    let soap_routes = Router::new()
        .route("/ocpp/soap/{tenant}/{charge_box_identity}", post(handle_soap))
        .with_state(SoapState { engine })
        .layer(GovernorLayer::new(soap_governor_conf));

    let metrics_routes = Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(MetricsState { handle: prometheus_handle });

    let health_routes = Router::new().route("/healthz", get(health_check)).with_state(started_at);

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    info!(
        requests_per_second = config.rate_limit.requests_per_second,
        burst_size = config.rate_limit.burst_size,
        "SOAP ingress rate limit configured"
    );

    Router::new()
        .merge(soap_routes)
        .merge(metrics_routes)
        .merge(health_routes)
        .layer(axum::middleware::from_fn(http_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
