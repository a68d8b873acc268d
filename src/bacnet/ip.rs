//! BACnet/IP gateway (spec §4.I): "Listen on UDP/47808 ... Services:
//! ReadProperty / ReadPropertyMultiple / WriteProperty / WhoIs / IAm."
//!
//! BVLC (BACnet Virtual Link Layer, Annex J) framing: `0x81 <function>
//! <length u16 BE> <NPDU><APDU>`. BASim only implements the two functions a
//! single-device simulator needs to speak to: Original-Unicast-NPDU and
//! Original-Broadcast-NPDU (Who-Is is typically broadcast).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use crate::bacnet::{npdu_to_apdu, process_apdu, wrap_npdu};
use crate::campus::CampusShared;

const BVLC_TYPE: u8 = 0x81;
const BVLC_ORIGINAL_UNICAST_NPDU: u8 = 0x0A;
const BVLC_ORIGINAL_BROADCAST_NPDU: u8 = 0x0B;

fn wrap_bvlc(function: u8, npdu_and_apdu: &[u8]) -> Vec<u8> {
    let len = (4 + npdu_and_apdu.len()) as u16;
    let mut out = vec![BVLC_TYPE, function];
    out.extend(len.to_be_bytes());
    out.extend_from_slice(npdu_and_apdu);
    out
}

/// Strip the BVLC+NPDU envelope and return the raw APDU, if this is a
/// unicast or broadcast NPDU frame we understand.
fn unwrap_to_apdu(buf: &[u8]) -> Option<&[u8]> {
    if buf.first() != Some(&BVLC_TYPE) {
        return None;
    }
    let function = *buf.get(1)?;
    if function != BVLC_ORIGINAL_UNICAST_NPDU && function != BVLC_ORIGINAL_BROADCAST_NPDU {
        return None;
    }
    npdu_to_apdu(buf.get(4..)?)
}

pub async fn run_server(addr: SocketAddr, shared: Arc<CampusShared>) -> std::io::Result<()> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true).ok();
    tracing::info!(%addr, device_id = shared.device_id, "bacnet/ip gateway listening");

    let mut buf = [0u8; 1500];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(?e, "bacnet/ip recv error");
                continue;
            }
        };
        let Some(apdu) = unwrap_to_apdu(&buf[..len]) else { continue };
        let Some(response_apdu) = process_apdu(&shared, apdu) else { continue };

        let frame = wrap_bvlc(BVLC_ORIGINAL_UNICAST_NPDU, &wrap_npdu(&response_apdu));
        if let Err(e) = socket.send_to(&frame, peer).await {
            tracing::warn!(%peer, ?e, "bacnet/ip send error");
        }
    }
}
