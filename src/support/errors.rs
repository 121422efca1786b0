//! Error taxonomy
//!
//! Six categories: protocol validation, tenant/station resolution,
//! authorization, state, integration, infrastructure. Categories 1-3 are
//! surfaced to the station via the protocol response; category 4 returns
//! whatever the OCPP spec requires for the anomalous case; categories 5-6
//! are logged and treated as soft failures that never fail the surrounding
//! handler.

use thiserror::Error;

/// Core error taxonomy. Every top-level handler returns `Result<_, CoreError>`;
/// the dispatch loop turns any `Err` into a protocol-shaped rejection instead
/// of ever propagating a panic to the transport.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// Category 1: malformed payload, missing required field, wrong type.
    #[error("protocol validation failed: {0}")]
    Protocol(String),

    /// Category 2: unknown tenant/station, bad registration token, attribute
    /// mismatch on re-boot.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// Category 3: invalid/blocked/expired tag, roaming tag on private
    /// station, tag rejected by site policy.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Category 4: transaction not found, already stopped, transactionId=0,
    /// duplicate end-frame.
    #[error("invalid state: {0}")]
    State(String),

    /// Category 5: pricing/billing/roaming/smart-charging/storage failure.
    /// Logged and soft — the handler that produced it has usually already
    /// committed its core effect.
    #[error("integration failure ({integration}): {message}")]
    Integration { integration: &'static str, message: String },

    /// Category 6: lock acquisition failure, timeout.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl CoreError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn integration(integration: &'static str, msg: impl Into<String>) -> Self {
        Self::Integration { integration, message: msg.into() }
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Whether this category is soft: logged, doesn't fail the handler's
    /// already-committed effect.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Integration { .. } | Self::Infrastructure(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
