//! BACnet tag/value codec and APDU framing (spec §4.I/§4.J). There is no
//! BACnet crate in the dependency graph, so this hand-rolls the subset of
//! ASHRAE 135 clause 20 (application/context tag encoding) and clause 21
//! (APDU PDU types) both gateways need, mirroring the teacher's approach of
//! hand-encoding a wire format in `modbus_server.rs` rather than reaching
//! for a crate that doesn't exist for this protocol.
//!
//! Scope: application tags Null/Boolean/Unsigned/Real/Enumerated/
//! ObjectIdentifier/CharacterString, constructed context tags (open/close),
//! and the five PDU types BASim answers (Unconfirmed-Request,
//! Confirmed-Request, SimpleACK, ComplexACK, Error). No segmentation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    AnalogValue,
    BinaryValue,
    MultiStateValue,
    Device,
}

impl ObjectType {
    pub fn code(&self) -> u32 {
        match self {
            ObjectType::AnalogValue => 2,
            ObjectType::BinaryValue => 5,
            ObjectType::MultiStateValue => 19,
            ObjectType::Device => 8,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            2 => ObjectType::AnalogValue,
            5 => ObjectType::BinaryValue,
            19 => ObjectType::MultiStateValue,
            8 => ObjectType::Device,
            _ => return None,
        })
    }
}

/// BACnet `object-identifier` is a packed 32-bit value: 10 bits object
/// type, 22 bits instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId {
    pub object_type: u32,
    pub instance: u32,
}

impl ObjectId {
    pub fn pack(&self) -> u32 {
        (self.object_type << 22) | (self.instance & 0x3FFFFF)
    }

    pub fn unpack(v: u32) -> Self {
        Self { object_type: v >> 22, instance: v & 0x3FFFFF }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyIdentifier {
    ObjectIdentifier,
    ObjectName,
    ObjectType,
    PresentValue,
    All,
    Other(u32),
}

impl PropertyIdentifier {
    pub fn code(&self) -> u32 {
        match self {
            PropertyIdentifier::ObjectIdentifier => 75,
            PropertyIdentifier::ObjectName => 77,
            PropertyIdentifier::ObjectType => 79,
            PropertyIdentifier::PresentValue => 85,
            PropertyIdentifier::All => 8,
            PropertyIdentifier::Other(c) => *c,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            75 => PropertyIdentifier::ObjectIdentifier,
            77 => PropertyIdentifier::ObjectName,
            79 => PropertyIdentifier::ObjectType,
            85 => PropertyIdentifier::PresentValue,
            8 => PropertyIdentifier::All,
            other => PropertyIdentifier::Other(other),
        }
    }
}

/// A decoded/encoded BACnet primitive value (clause 20.2).
#[derive(Debug, Clone, PartialEq)]
pub enum BacnetValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Real(f32),
    Enumerated(u32),
    ObjectIdentifier(ObjectId),
    CharacterString(String),
}

// ─── Tag encoding (clause 20.2.1) ──────────────────────────────────────────

/// Encode an application-tagged primitive.
pub fn encode_application(value: &BacnetValue) -> Vec<u8> {
    match value {
        BacnetValue::Null => vec![tag_byte(0, false, 0)],
        BacnetValue::Boolean(b) => vec![tag_byte(1, false, if *b { 1 } else { 0 })],
        BacnetValue::Unsigned(v) => {
            let bytes = minimal_unsigned_bytes(*v);
            let mut out = vec![tag_byte(2, false, bytes.len() as u8)];
            out.extend(bytes);
            out
        }
        BacnetValue::Real(v) => {
            let mut out = vec![tag_byte(4, false, 4)];
            out.extend(v.to_be_bytes());
            out
        }
        BacnetValue::Enumerated(v) => {
            let bytes = minimal_unsigned_bytes(*v);
            let mut out = vec![tag_byte(9, false, bytes.len() as u8)];
            out.extend(bytes);
            out
        }
        BacnetValue::ObjectIdentifier(id) => {
            let mut out = vec![tag_byte(12, false, 4)];
            out.extend(id.pack().to_be_bytes());
            out
        }
        BacnetValue::CharacterString(s) => {
            let mut body = vec![0u8]; // ANSI X3.4 (UTF-8/ASCII) character set
            body.extend(s.as_bytes());
            encode_tagged(7, false, &body)
        }
    }
}

/// Encode a context-tagged primitive at `tag_number` (used for service
/// parameters, e.g. `objectIdentifier [0]`).
pub fn encode_context(tag_number: u8, value: &BacnetValue) -> Vec<u8> {
    match value {
        BacnetValue::Null => vec![tag_byte(tag_number, true, 0)],
        BacnetValue::Boolean(b) => {
            encode_tagged(tag_number, true, &[if *b { 1 } else { 0 }])
        }
        BacnetValue::Unsigned(v) => encode_tagged(tag_number, true, &minimal_unsigned_bytes(*v)),
        BacnetValue::Real(v) => encode_tagged(tag_number, true, &v.to_be_bytes()),
        BacnetValue::Enumerated(v) => encode_tagged(tag_number, true, &minimal_unsigned_bytes(*v)),
        BacnetValue::ObjectIdentifier(id) => encode_tagged(tag_number, true, &id.pack().to_be_bytes()),
        BacnetValue::CharacterString(s) => {
            let mut body = vec![0u8];
            body.extend(s.as_bytes());
            encode_tagged(tag_number, true, &body)
        }
    }
}

/// Opening context tag, e.g. `propertyValue [3] {`.
pub fn open_context(tag_number: u8) -> u8 {
    tag_byte(tag_number, true, 6)
}

/// Closing context tag, e.g. `}` for `propertyValue [3]`.
pub fn close_context(tag_number: u8) -> u8 {
    tag_byte(tag_number, true, 7)
}

fn tag_byte(tag_number: u8, context: bool, length_value_type: u8) -> u8 {
    let high = if tag_number < 15 { tag_number << 4 } else { 0xF0 };
    let class_bit = if context { 0x08 } else { 0x00 };
    high | class_bit | (length_value_type & 0x07)
}

fn encode_tagged(tag_number: u8, context: bool, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 2);
    if body.len() < 5 {
        out.push(tag_byte(tag_number, context, body.len() as u8));
    } else {
        out.push(tag_byte(tag_number, context, 5));
        if body.len() < 254 {
            out.push(body.len() as u8);
        } else {
            out.push(254);
            out.extend((body.len() as u16).to_be_bytes());
        }
    }
    out.extend_from_slice(body);
    out
}

fn minimal_unsigned_bytes(v: u32) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    bytes[first_nonzero..].to_vec()
}

/// A decoded tag header: tag number, whether it's context-class, whether
/// it's an opening/closing construct tag, and the length of the value that
/// follows (0 for opening/closing tags).
struct TagHeader {
    tag_number: u8,
    context: bool,
    is_opening: bool,
    is_closing: bool,
    value_len: usize,
    header_len: usize,
}

fn parse_tag(buf: &[u8]) -> Option<TagHeader> {
    let first = *buf.first()?;
    let mut tag_number = (first & 0xF0) >> 4;
    let context = first & 0x08 != 0;
    let lvt = first & 0x07;
    let mut header_len = 1;

    if tag_number == 0x0F {
        tag_number = *buf.get(1)?;
        header_len += 1;
    }

    if context && lvt == 6 {
        return Some(TagHeader { tag_number, context, is_opening: true, is_closing: false, value_len: 0, header_len });
    }
    if context && lvt == 7 {
        return Some(TagHeader { tag_number, context, is_opening: false, is_closing: true, value_len: 0, header_len });
    }

    let value_len = if lvt < 5 {
        lvt as usize
    } else {
        let len_byte = *buf.get(header_len)? as usize;
        if len_byte < 254 {
            header_len += 1;
            len_byte
        } else if len_byte == 254 {
            let hi = *buf.get(header_len + 1)? as usize;
            let lo = *buf.get(header_len + 2)? as usize;
            header_len += 3;
            (hi << 8) | lo
        } else {
            return None; // 255: 32-bit extended length, not needed on this wire
        }
    };

    Some(TagHeader { tag_number, context, is_opening: false, is_closing: false, value_len, header_len })
}

/// Decode one application-tagged primitive starting at `buf[0]`. Returns
/// the value and the number of bytes consumed.
pub fn decode_application(buf: &[u8]) -> Option<(BacnetValue, usize)> {
    let h = parse_tag(buf)?;
    if h.context {
        return None;
    }
    let total = h.header_len + h.value_len;
    let body = buf.get(h.header_len..total)?;
    let value = match h.tag_number {
        0 => BacnetValue::Null,
        1 => BacnetValue::Boolean(body.first().copied().unwrap_or(0) != 0),
        2 => BacnetValue::Unsigned(decode_unsigned(body)),
        4 => BacnetValue::Real(f32::from_be_bytes(body.get(0..4)?.try_into().ok()?)),
        9 => BacnetValue::Enumerated(decode_unsigned(body)),
        12 => BacnetValue::ObjectIdentifier(ObjectId::unpack(u32::from_be_bytes(body.get(0..4)?.try_into().ok()?))),
        7 => BacnetValue::CharacterString(String::from_utf8_lossy(body.get(1..)?).into_owned()),
        _ => return None,
    };
    Some((value, total))
}

/// Decode one context-tagged primitive at context tag `expected_tag`,
/// interpreting its body as `as_application_tag` (context tags carry no
/// type info of their own; the caller already knows what's expected).
pub fn decode_context_as(buf: &[u8], expected_tag: u8, as_application_tag: u8) -> Option<(BacnetValue, usize)> {
    let h = parse_tag(buf)?;
    if !h.context || h.tag_number != expected_tag || h.is_opening || h.is_closing {
        return None;
    }
    let total = h.header_len + h.value_len;
    let body = buf.get(h.header_len..total)?;
    let value = match as_application_tag {
        2 => BacnetValue::Unsigned(decode_unsigned(body)),
        4 => BacnetValue::Real(f32::from_be_bytes(body.get(0..4)?.try_into().ok()?)),
        9 => BacnetValue::Enumerated(decode_unsigned(body)),
        12 => BacnetValue::ObjectIdentifier(ObjectId::unpack(u32::from_be_bytes(body.get(0..4)?.try_into().ok()?))),
        7 => BacnetValue::CharacterString(String::from_utf8_lossy(body.get(1..)?).into_owned()),
        1 => BacnetValue::Boolean(body.first().copied().unwrap_or(0) != 0),
        _ => BacnetValue::Null,
    };
    Some((value, total))
}

/// True if `buf[0]` opens context tag `tag_number`.
pub fn is_opening(buf: &[u8], tag_number: u8) -> bool {
    parse_tag(buf).is_some_and(|h| h.context && h.is_opening && h.tag_number == tag_number)
}

/// True if `buf[0]` closes context tag `tag_number`.
pub fn is_closing(buf: &[u8], tag_number: u8) -> bool {
    parse_tag(buf).is_some_and(|h| h.context && h.is_closing && h.tag_number == tag_number)
}

/// Byte length of the opening/closing construct tag at `buf[0]` (always 1
/// unless the tag number is >= 15, which this wire never uses).
pub fn construct_tag_len(buf: &[u8]) -> usize {
    parse_tag(buf).map(|h| h.header_len).unwrap_or(1)
}

fn decode_unsigned(body: &[u8]) -> u32 {
    body.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

// ─── APDU PDU types (clause 20.1) ──────────────────────────────────────────

pub const PDU_UNCONFIRMED_REQUEST: u8 = 0x10;
pub const PDU_CONFIRMED_REQUEST: u8 = 0x00;
pub const PDU_SIMPLE_ACK: u8 = 0x20;
pub const PDU_COMPLEX_ACK: u8 = 0x30;
pub const PDU_ERROR: u8 = 0x50;

pub const SERVICE_WHO_IS: u8 = 8;
pub const SERVICE_I_AM: u8 = 0;
pub const SERVICE_READ_PROPERTY: u8 = 12;
pub const SERVICE_READ_PROPERTY_MULTIPLE: u8 = 14;
pub const SERVICE_WRITE_PROPERTY: u8 = 15;

pub fn build_unconfirmed(service_choice: u8, service_data: &[u8]) -> Vec<u8> {
    let mut out = vec![PDU_UNCONFIRMED_REQUEST, service_choice];
    out.extend_from_slice(service_data);
    out
}

pub fn build_complex_ack(invoke_id: u8, service_choice: u8, service_data: &[u8]) -> Vec<u8> {
    let mut out = vec![PDU_COMPLEX_ACK, invoke_id, service_choice];
    out.extend_from_slice(service_data);
    out
}

pub fn build_simple_ack(invoke_id: u8, service_choice: u8) -> Vec<u8> {
    vec![PDU_SIMPLE_ACK, invoke_id, service_choice]
}

pub fn build_error(invoke_id: u8, service_choice: u8, error_class: &str, error_code: &str) -> Vec<u8> {
    let mut out = vec![PDU_ERROR, invoke_id, service_choice];
    let (class, code) = error_choice_codes(error_class, error_code);
    out.extend(encode_application(&BacnetValue::Enumerated(class)));
    out.extend(encode_application(&BacnetValue::Enumerated(code)));
    out
}

/// Map BASim's error class/code strings (as returned by
/// [`crate::error::BasimError::bacnet_error`]) to the numeric error-class
/// and error-code enumerations clause 21 uses on the wire.
pub fn error_choice_codes(error_class: &str, error_code: &str) -> (u32, u32) {
    let class = match error_class {
        "device" => 0,
        "object" => 1,
        "property" => 2,
        "security" => 7,
        _ => 9, // "other"
    };
    let code = match error_code {
        "unknownObject" => 31,
        "writeAccessDenied" => 40,
        "invalidArrayIndex" => 42,
        "invalidDataType" => 9,
        "accessDenied" => 85,
        "unknownProperty" => 32,
        _ => 0, // "operationalProblem" and anything else unmapped
    };
    (class, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_round_trips() {
        let encoded = encode_application(&BacnetValue::Real(45.5));
        let (decoded, len) = decode_application(&encoded).unwrap();
        assert_eq!(decoded, BacnetValue::Real(45.5));
        assert_eq!(len, encoded.len());
    }

    #[test]
    fn object_identifier_round_trips() {
        let id = ObjectId { object_type: ObjectType::AnalogValue.code(), instance: 1234 };
        let encoded = encode_application(&BacnetValue::ObjectIdentifier(id));
        let (decoded, _) = decode_application(&encoded).unwrap();
        assert_eq!(decoded, BacnetValue::ObjectIdentifier(id));
    }

    #[test]
    fn small_unsigned_uses_minimal_length() {
        let encoded = encode_application(&BacnetValue::Unsigned(5));
        assert_eq!(encoded.len(), 2); // tag byte + 1 value byte
    }

    #[test]
    fn context_open_close_round_trip_positions() {
        let open = open_context(3);
        let close = close_context(3);
        assert!(is_opening(&[open], 3));
        assert!(is_closing(&[close], 3));
        assert!(!is_opening(&[close], 3));
    }

    #[test]
    fn context_unsigned_decodes_with_expected_tag() {
        let encoded = encode_context(1, &BacnetValue::Unsigned(85));
        let (decoded, len) = decode_context_as(&encoded, 1, 2).unwrap();
        assert_eq!(decoded, BacnetValue::Unsigned(85));
        assert_eq!(len, encoded.len());
    }
}
