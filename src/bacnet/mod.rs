//! BACnet protocol support (spec §4.I–§4.J): a shared tag/APDU codec and
//! service layer in [`apdu`] and [`service`], and two gateways built on top
//! of them — [`ip`] (BACnet/IP over UDP) and [`sc`] (BACnet/SC over
//! WebSocket). Both gateways exchange the identical NPDU/APDU payload; only
//! the outer framing differs, so that exchange lives here once.

pub mod apdu;
pub mod ip;
pub mod sc;
pub mod service;

use crate::bacnet::apdu::*;
use crate::campus::CampusShared;

/// Strip an NPDU header down to its carried APDU, skipping the optional
/// destination/source network fields per clause 6.2 if present. `npdu` is
/// everything after the outer link-layer header (BVLC-IP or BVLC-SC).
pub(crate) fn npdu_to_apdu(npdu: &[u8]) -> Option<&[u8]> {
    let control = *npdu.get(1)?;
    let mut offset = 2;
    if control & 0x20 != 0 {
        // destination present: DNET(2) DLEN(1) DADR(DLEN) HOPCOUNT(1)
        let dlen = *npdu.get(offset + 2)? as usize;
        offset += 3 + dlen + 1;
    }
    if control & 0x08 != 0 {
        // source present: SNET(2) SLEN(1) SADR(SLEN)
        let slen = *npdu.get(offset + 2)? as usize;
        offset += 3 + slen;
    }
    npdu.get(offset..)
}

/// Wrap an APDU in the plain NPDU header (version 1, no dest/src, no reply
/// expected) both gateways use for their replies.
pub(crate) fn wrap_npdu(apdu: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01, 0x00];
    out.extend_from_slice(apdu);
    out
}

/// Dispatch a decoded APDU to the service layer and return the reply APDU,
/// if the request calls for one (Who-Is replies are sent; I-Am has none).
pub(crate) fn process_apdu(shared: &CampusShared, apdu: &[u8]) -> Option<Vec<u8>> {
    let pdu_type = apdu.first()? & 0xF0;
    match pdu_type {
        PDU_UNCONFIRMED_REQUEST => {
            let service_choice = *apdu.get(1)?;
            if service_choice == SERVICE_WHO_IS {
                Some(service::build_i_am(shared))
            } else {
                None
            }
        }
        PDU_CONFIRMED_REQUEST => {
            let invoke_id = *apdu.get(2)?;
            let service_choice = *apdu.get(3)?;
            let body = apdu.get(4..).unwrap_or(&[]);
            Some(match service_choice {
                SERVICE_READ_PROPERTY => service::handle_read_property(shared, invoke_id, body),
                SERVICE_WRITE_PROPERTY => service::handle_write_property(shared, invoke_id, body),
                SERVICE_READ_PROPERTY_MULTIPLE => service::handle_read_property_multiple(shared, invoke_id, body),
                _ => build_error(invoke_id, service_choice, "device", "operationalProblem"),
            })
        }
        _ => None,
    }
}
