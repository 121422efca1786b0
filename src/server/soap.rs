//! OCPP 1.5 SOAP ingress: strips a `soap:Envelope` down to the
//! `SoapFrame` the normalizer expects, and builds the matching SOAP
//! response envelope. `quick-xml`'s event reader does the envelope
//! stripping; there is no ecosystem crate that understands the OCPP 1.5
//! SOAP bindings themselves (see `normalizer::soap_shapes`).

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::application::charging::messages::{
    BootResponse, HeartbeatResponse, IdTagStatus, NormalizedResponse, StartTransactionResponse,
    StopTransactionResponse,
};
use crate::application::charging::normalizer::{encode_v15_soap, SoapFrame};
use crate::support::errors::CoreError;

/// Pull the action name out of a `SOAPAction` header value, which is
/// typically a quoted URN like `"urn://Ocpp/Cp/2012/06/BootNotification"`.
pub fn action_from_header(value: &str) -> String {
    value.trim_matches('"').rsplit(['/', '#']).next().unwrap_or(value).to_string()
}

/// Find the single element inside `<soap:Body>` and return its inner XML
/// verbatim, regardless of the namespace prefix in use (`soap:`, `SOAP-ENV:`,
/// unprefixed, ...).
pub fn extract_body_xml(xml: &str) -> Result<String, CoreError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_body = false;
    let mut action_start: Option<usize> = None;
    let mut action_depth: u32 = 0;

    loop {
        let pos_before = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if !in_body && name.eq_ignore_ascii_case("Body") {
                    in_body = true;
                } else if in_body && action_start.is_none() {
                    action_start = Some(reader.buffer_position());
                    action_depth = 1;
                } else if action_start.is_some() {
                    action_depth += 1;
                }
            }
            Ok(Event::Empty(_)) if action_start.is_none() && in_body => {
                // An empty action element (no body fields at all, e.g. a
                // bare `<heartbeatRequest/>`) — nothing to slice out.
                return Ok(String::new());
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if let Some(start) = action_start {
                    action_depth -= 1;
                    if action_depth == 0 {
                        return Ok(xml[start..pos_before].to_string());
                    }
                } else if in_body && name.eq_ignore_ascii_case("Body") {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CoreError::protocol(format!("malformed SOAP envelope: {e}"))),
            _ => {}
        }
    }

    Err(CoreError::protocol("SOAP envelope has no action element inside soap:Body"))
}

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    s.rsplit(':').next().unwrap_or(&s).to_string()
}

pub fn parse_frame<'a>(action: &'a str, body_xml: &'a str) -> SoapFrame<'a> {
    SoapFrame { action, body_xml }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Build the `{action}Response` body for every action this core accepts
/// over SOAP, and wrap it in a SOAP 1.1 envelope.
pub fn encode_response(action: &str, response: &NormalizedResponse) -> String {
    let body_xml = match response {
        NormalizedResponse::Boot(r) => boot_body(r),
        NormalizedResponse::Heartbeat(r) => heartbeat_body(r),
        NormalizedResponse::Status(_) => String::new(),
        NormalizedResponse::MeterValues(_) => String::new(),
        NormalizedResponse::Authorize(r) => id_tag_info_body(r.status),
        NormalizedResponse::StartTx(r) => start_transaction_body(r),
        NormalizedResponse::StopTx(r) => stop_transaction_body(r),
        NormalizedResponse::DataTransfer(r) => format!(
            "<data>{}</data>",
            r.data.as_deref().map(escape).unwrap_or_default()
        ),
        NormalizedResponse::Error(e) => return encode_fault(&e.code, &e.description),
    };
    encode_v15_soap(action, body_xml)
}

fn boot_body(r: &BootResponse) -> String {
    format!(
        "<currentTime>{}</currentTime><heartbeatInterval>{}</heartbeatInterval><status>{}</status>",
        r.current_time.to_rfc3339(),
        r.interval_secs,
        r.status,
    )
}

fn heartbeat_body(r: &HeartbeatResponse) -> String {
    format!("<currentTime>{}</currentTime>", r.current_time.to_rfc3339())
}

fn status_str(status: IdTagStatus) -> &'static str {
    match status {
        IdTagStatus::Accepted => "Accepted",
        IdTagStatus::Invalid => "Invalid",
        IdTagStatus::Blocked => "Blocked",
        IdTagStatus::Expired => "Expired",
        IdTagStatus::ConcurrentTx => "ConcurrentTx",
    }
}

fn id_tag_info_body(status: IdTagStatus) -> String {
    format!("<idTagInfo><status>{}</status></idTagInfo>", status_str(status))
}

fn start_transaction_body(r: &StartTransactionResponse) -> String {
    format!(
        "<transactionId>{}</transactionId>{}",
        r.transaction_id,
        id_tag_info_body(r.status)
    )
}

fn stop_transaction_body(r: &StopTransactionResponse) -> String {
    id_tag_info_body(r.status)
}

/// A SOAP 1.1 Fault, for a structurally invalid inbound frame.
fn encode_fault(code: &str, description: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
<soap:Header/>\
<soap:Body><soap:Fault><faultcode>soap:{}</faultcode><faultstring>{}</faultstring></soap:Fault></soap:Body>\
</soap:Envelope>",
        escape(code),
        escape(description),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_soap_action_urn() {
        assert_eq!(action_from_header("\"urn://Ocpp/Cp/2012/06/BootNotification\""), "BootNotification");
    }

    #[test]
    fn extracts_body_inner_xml() {
        let envelope = "<?xml version=\"1.0\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
<soap:Header/>\
<soap:Body><statusNotificationRequest><connectorId>1</connectorId><status>Available</status></statusNotificationRequest></soap:Body>\
</soap:Envelope>";
        let body = extract_body_xml(envelope).unwrap();
        assert!(body.contains("<connectorId>1</connectorId>"));
        assert!(body.contains("<status>Available</status>"));
    }

    #[test]
    fn builds_fault_for_error_response() {
        let xml = encode_fault("FormationViolation", "bad request");
        assert!(xml.contains("soap:FormationViolation"));
        assert!(xml.contains("bad request"));
    }
}
