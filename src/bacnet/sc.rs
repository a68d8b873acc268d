//! BACnet/SC gateway (spec §4.J): "Accept a WebSocket at a single endpoint;
//! each message carries a BACnet frame (BVLC replacement header + APDU).
//! Session establishment follows BACnet/SC specification: Connect-Request →
//! Connect-Accept, then normal NPDU/APDU exchange." Device-ID uniqueness is
//! trivial here since BASim's process holds exactly one device.
//!
//! BVLC-SC framing (ASHRAE 135 Annex AB.1): `<function:1><control:1>
//! <message-id:2 BE><payload>`. BASim implements the handshake pair
//! (Connect-Request/Connect-Accept) and Encapsulated-NPDU, the only
//! messages a single-device simulator needs.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};

use crate::bacnet::{npdu_to_apdu, process_apdu, wrap_npdu};
use crate::campus::CampusShared;

const BVLC_SC_RESULT: u8 = 0x00;
const BVLC_SC_ENCAPSULATED_NPDU: u8 = 0x01;
const BVLC_SC_CONNECT_REQUEST: u8 = 0x05;
const BVLC_SC_CONNECT_ACCEPT: u8 = 0x06;

/// Build a BVLC-SC frame: function, a zero control byte (no destination
/// options BASim implements), a message id, and the payload.
fn wrap_bvlc_sc(function: u8, message_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![function, 0x00];
    out.extend(message_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

struct ScFrame<'a> {
    function: u8,
    message_id: u16,
    payload: &'a [u8],
}

fn parse_bvlc_sc(buf: &[u8]) -> Option<ScFrame<'_>> {
    let function = *buf.first()?;
    let message_id = u16::from_be_bytes([*buf.get(2)?, *buf.get(3)?]);
    Some(ScFrame { function, message_id, payload: buf.get(4..).unwrap_or(&[]) })
}

/// Drive one BACnet/SC session over an already-upgraded WebSocket: wait for
/// Connect-Request, answer Connect-Accept, then exchange Encapsulated-NPDU
/// frames through the same service layer the IP gateway uses.
pub async fn run_session(mut socket: WebSocket, shared: Arc<CampusShared>) {
    tracing::info!(device_id = shared.device_id, "bacnet/sc session opened");

    loop {
        let message = match socket.recv().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!(?e, "bacnet/sc recv error");
                break;
            }
            None => break,
        };
        let Message::Binary(buf) = message else { continue };
        let Some(frame) = parse_bvlc_sc(&buf) else { continue };

        match frame.function {
            BVLC_SC_CONNECT_REQUEST => {
                let accept = wrap_bvlc_sc(BVLC_SC_CONNECT_ACCEPT, frame.message_id, &[]);
                if socket.send(Message::Binary(accept.into())).await.is_err() {
                    break;
                }
            }
            BVLC_SC_ENCAPSULATED_NPDU => {
                let Some(apdu) = npdu_to_apdu(frame.payload) else { continue };
                let Some(response_apdu) = process_apdu(&shared, apdu) else { continue };
                let npdu = wrap_npdu(&response_apdu);
                let reply = wrap_bvlc_sc(BVLC_SC_ENCAPSULATED_NPDU, frame.message_id, &npdu);
                if socket.send(Message::Binary(reply.into())).await.is_err() {
                    break;
                }
            }
            _ => {
                let result = wrap_bvlc_sc(BVLC_SC_RESULT, frame.message_id, &[0x01]);
                if socket.send(Message::Binary(result.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(device_id = shared.device_id, "bacnet/sc session closed");
}
