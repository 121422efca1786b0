//! Protocol version and transport the station negotiated.
//!
//! OCPP 1.5 is carried over SOAP/XML; OCPP 1.6 is carried over a JSON array
//! framing on top of WebSocket. The pair travels together everywhere a
//! normalized message needs to know how to re-encode a response.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    V15,
    V16,
}

impl OcppVersion {
    pub const ALL: [OcppVersion; 2] = [OcppVersion::V15, OcppVersion::V16];

    /// The WebSocket subprotocol token a 1.6 station advertises during the
    /// upgrade handshake. 1.5 has no subprotocol since it never speaks
    /// WebSocket.
    pub fn subprotocol(&self) -> Option<&'static str> {
        match self {
            OcppVersion::V15 => None,
            OcppVersion::V16 => Some("ocpp1.6"),
        }
    }

    pub fn from_subprotocol(value: &str) -> Option<Self> {
        match value {
            "ocpp1.6" => Some(OcppVersion::V16),
            _ => None,
        }
    }

    pub fn version_string(&self) -> &'static str {
        match self {
            OcppVersion::V15 => "1.5",
            OcppVersion::V16 => "1.6",
        }
    }

    /// The transport this version is always carried over. 1.5 is SOAP-only
    /// and 1.6 is JSON-over-WebSocket-only; there is no mix-and-match.
    pub fn transport(&self) -> OcppTransport {
        match self {
            OcppVersion::V15 => OcppTransport::Soap,
            OcppVersion::V16 => OcppTransport::Json,
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version_string())
    }
}

/// Wire transport a message arrived/departs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppTransport {
    Soap,
    Json,
}

impl fmt::Display for OcppTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcppTransport::Soap => write!(f, "SOAP"),
            OcppTransport::Json => write!(f, "JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprotocol_round_trips_for_v16() {
        assert_eq!(OcppVersion::V16.subprotocol(), Some("ocpp1.6"));
        assert_eq!(OcppVersion::from_subprotocol("ocpp1.6"), Some(OcppVersion::V16));
    }

    #[test]
    fn v15_has_no_subprotocol_and_is_soap() {
        assert_eq!(OcppVersion::V15.subprotocol(), None);
        assert_eq!(OcppVersion::V15.transport(), OcppTransport::Soap);
    }
}
