//! BACnet service handling shared by the IP and SC transports (spec §4.I:
//! "WriteProperty `present_value` with priority P maps to `override(...)`;
//! writing `null` at priority P is `release(...); this is the canonical
//! semantic the rest of the system mirrors" — §4.J: "same semantics ...
//! framed over a ... WebSocket").

use crate::bacnet::apdu::*;
use crate::campus::CampusShared;
use crate::registry::{PointId, PointKind, Snapshot, Value};

const BACNET_OVERRIDE_SOURCE: &str = "bacnet";
const VENDOR_ID: u32 = 999;

fn object_type_for_kind(kind: PointKind) -> Option<ObjectType> {
    match kind {
        PointKind::Analog => Some(ObjectType::AnalogValue),
        PointKind::Binary => Some(ObjectType::BinaryValue),
        PointKind::MultiState => Some(ObjectType::MultiStateValue),
        PointKind::String => None,
    }
}

/// `snapshot`, when given, is the campus-wide cross-point-consistent view
/// published at the last tick boundary (spec §4.F) — `ReadPropertyMultiple`
/// passes one down so every object in the request reads off the same
/// consistent view, rather than each racing the tick driver independently.
/// A plain `ReadProperty` for a single object has no such requirement and
/// reads the live point directly.
fn present_value_for(shared: &CampusShared, instance: u32, snapshot: Option<&Snapshot>) -> Option<BacnetValue> {
    let point = PointId(instance);
    if point.0 as usize >= shared.registry.len() {
        return None;
    }
    let effective_value = match snapshot {
        Some(snap) => snap.get(&shared.registry.meta(point).path)?.effective_value.clone(),
        None => shared.registry.read_by_id(point).effective_value,
    };
    Some(match effective_value {
        Value::Analog(v) => BacnetValue::Real(v as f32),
        Value::Binary(b) => BacnetValue::Enumerated(if b { 1 } else { 0 }),
        Value::MultiState(n) => BacnetValue::Unsigned(n),
        Value::Text(_) => return None,
    })
}

/// Who-Is / I-Am (unconfirmed, clause 16.9/16.10). BASim always answers —
/// it doesn't implement the optional device-instance-range filter.
pub fn build_i_am(shared: &CampusShared) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(encode_application(&BacnetValue::ObjectIdentifier(ObjectId {
        object_type: ObjectType::Device.code(),
        instance: shared.device_id,
    })));
    body.extend(encode_application(&BacnetValue::Unsigned(1476)));
    body.extend(encode_application(&BacnetValue::Enumerated(3))); // segmentation-supported: no-segmentation
    body.extend(encode_application(&BacnetValue::Unsigned(VENDOR_ID)));
    build_unconfirmed(SERVICE_I_AM, &body)
}

/// Decode a ReadProperty-Request and build either a ComplexACK or an Error
/// APDU. `apdu` is the body after the PDU/invoke-id/service-choice header.
pub fn handle_read_property(shared: &CampusShared, invoke_id: u8, apdu: &[u8]) -> Vec<u8> {
    let Some(req) = decode_read_property_request(apdu) else {
        return build_error(invoke_id, SERVICE_READ_PROPERTY, "property", "invalidDataType");
    };
    match read_one_property(shared, req.object, req.property, None) {
        Ok(value) => {
            let mut body = Vec::new();
            body.extend_from_slice(&encode_context(0, &BacnetValue::ObjectIdentifier(req.object)));
            body.extend_from_slice(&encode_context(1, &BacnetValue::Enumerated(req.property.code())));
            body.push(open_context(3));
            body.extend(encode_application(&value));
            body.push(close_context(3));
            build_complex_ack(invoke_id, SERVICE_READ_PROPERTY, &body)
        }
        Err((class, code)) => build_error(invoke_id, SERVICE_READ_PROPERTY, class, code),
    }
}

struct ReadPropertyRequest {
    object: ObjectId,
    property: PropertyIdentifier,
}

fn decode_read_property_request(buf: &[u8]) -> Option<ReadPropertyRequest> {
    let (object_val, n1) = decode_context_as(buf, 0, 12)?;
    let BacnetValue::ObjectIdentifier(object) = object_val else { return None };
    let (prop_val, _n2) = decode_context_as(&buf[n1..], 1, 9)?;
    let BacnetValue::Enumerated(code) = prop_val else { return None };
    Some(ReadPropertyRequest { object, property: PropertyIdentifier::from_code(code) })
}

fn resolve_object(shared: &CampusShared, object: ObjectId) -> Option<(PointKind, u32)> {
    let object_type = ObjectType::from_code(object.object_type)?;
    if object_type == ObjectType::Device {
        return None;
    }
    let point = PointId(object.instance);
    if point.0 as usize >= shared.registry.len() {
        return None;
    }
    let meta = shared.registry.meta(point);
    if object_type_for_kind(meta.kind)? != object_type {
        return None;
    }
    Some((meta.kind, object.instance))
}

fn read_one_property(
    shared: &CampusShared,
    object: ObjectId,
    property: PropertyIdentifier,
    snapshot: Option<&Snapshot>,
) -> Result<BacnetValue, (&'static str, &'static str)> {
    if ObjectType::from_code(object.object_type) == Some(ObjectType::Device) {
        return read_device_property(shared, property);
    }
    let Some((kind, instance)) = resolve_object(shared, object) else {
        return Err(("object", "unknownObject"));
    };
    match property {
        PropertyIdentifier::PresentValue => {
            present_value_for(shared, instance, snapshot).ok_or(("object", "unknownObject"))
        }
        PropertyIdentifier::ObjectIdentifier => Ok(BacnetValue::ObjectIdentifier(object)),
        PropertyIdentifier::ObjectType => Ok(BacnetValue::Enumerated(object.object_type)),
        PropertyIdentifier::ObjectName => {
            let point = PointId(instance);
            Ok(BacnetValue::CharacterString(shared.registry.meta(point).path.clone()))
        }
        _ => {
            let _ = kind;
            Err(("property", "unknownProperty"))
        }
    }
}

fn read_device_property(
    shared: &CampusShared,
    property: PropertyIdentifier,
) -> Result<BacnetValue, (&'static str, &'static str)> {
    match property {
        PropertyIdentifier::ObjectIdentifier => Ok(BacnetValue::ObjectIdentifier(ObjectId {
            object_type: ObjectType::Device.code(),
            instance: shared.device_id,
        })),
        PropertyIdentifier::ObjectType => Ok(BacnetValue::Enumerated(ObjectType::Device.code())),
        PropertyIdentifier::ObjectName => Ok(BacnetValue::CharacterString("BASim".to_string())),
        _ => Err(("property", "unknownProperty")),
    }
}

/// Decode a WriteProperty-Request and apply it to the registry, returning
/// either a SimpleACK or an Error APDU.
pub fn handle_write_property(shared: &CampusShared, invoke_id: u8, apdu: &[u8]) -> Vec<u8> {
    let Some(req) = decode_write_property_request(apdu) else {
        return build_error(invoke_id, SERVICE_WRITE_PROPERTY, "property", "invalidDataType");
    };
    if req.property != PropertyIdentifier::PresentValue {
        return build_error(invoke_id, SERVICE_WRITE_PROPERTY, "property", "writeAccessDenied");
    }
    let Some((kind, instance)) = resolve_object(shared, req.object) else {
        return build_error(invoke_id, SERVICE_WRITE_PROPERTY, "object", "unknownObject");
    };
    let point = PointId(instance);
    let path = shared.registry.meta(point).path.clone();
    let priority = req.priority.unwrap_or(16).clamp(1, 16) as u8;
    let now = shared.clock.sim_now();

    let result = match req.value {
        BacnetValue::Null => shared.registry.release(&path, Some(priority)),
        other => match decode_value_for_kind(other, kind) {
            Some(value) => shared.registry.override_point(&path, value, priority, BACNET_OVERRIDE_SOURCE, now, None),
            None => {
                return build_error(invoke_id, SERVICE_WRITE_PROPERTY, "property", "invalidDataType");
            }
        },
    };

    match result {
        Ok(()) => build_simple_ack(invoke_id, SERVICE_WRITE_PROPERTY),
        Err(e) => {
            let (class, code) = e.bacnet_error();
            build_error(invoke_id, SERVICE_WRITE_PROPERTY, class, code)
        }
    }
}

/// ReadPropertyMultiple (clause 15.7): a sequence of `ReadAccessSpecification`s,
/// each an object id plus a list of property identifiers. BASim answers
/// `present-value`/`object-name`/`object-type`/`all` (treated as
/// present-value only) and returns a per-property error for anything else,
/// rather than rejecting the whole request.
pub fn handle_read_property_multiple(shared: &CampusShared, invoke_id: u8, apdu: &[u8]) -> Vec<u8> {
    let mut offset = 0;
    let mut response = Vec::new();
    let snapshot = shared.published_snapshot();

    while offset < apdu.len() {
        let Some((object_val, n)) = decode_context_as(&apdu[offset..], 0, 12) else { break };
        let BacnetValue::ObjectIdentifier(object) = object_val else { break };
        offset += n;

        if !is_opening(&apdu[offset..], 1) {
            break;
        }
        offset += construct_tag_len(&apdu[offset..]);

        let mut properties = Vec::new();
        while !is_closing(&apdu[offset..], 1) {
            let Some((prop_val, n)) = decode_context_as(&apdu[offset..], 0, 9) else { break };
            let BacnetValue::Enumerated(code) = prop_val else { break };
            offset += n;
            if is_context_tag(&apdu[offset..], 1) {
                let Some((_, n)) = decode_context_as(&apdu[offset..], 1, 2) else { break };
                offset += n;
            }
            properties.push(PropertyIdentifier::from_code(code));
        }
        offset += construct_tag_len(&apdu[offset..]);

        response.extend(encode_context(0, &BacnetValue::ObjectIdentifier(object)));
        response.push(open_context(1));
        for property in properties {
            response.extend(encode_context(2, &BacnetValue::Enumerated(property.code())));
            match read_one_property(shared, object, property, Some(snapshot.as_ref())) {
                Ok(value) => {
                    response.push(open_context(4));
                    response.extend(encode_application(&value));
                    response.push(close_context(4));
                }
                Err((class, code)) => {
                    let (class_code, error_code) = error_choice_codes(class, code);
                    response.push(open_context(5));
                    response.extend(encode_application(&BacnetValue::Enumerated(class_code)));
                    response.extend(encode_application(&BacnetValue::Enumerated(error_code)));
                    response.push(close_context(5));
                }
            }
        }
        response.push(close_context(1));
    }

    build_complex_ack(invoke_id, SERVICE_READ_PROPERTY_MULTIPLE, &response)
}

fn decode_value_for_kind(value: BacnetValue, kind: PointKind) -> Option<Value> {
    match (value, kind) {
        (BacnetValue::Real(v), PointKind::Analog) => Some(Value::Analog(v as f64)),
        (BacnetValue::Enumerated(v), PointKind::Binary) => Some(Value::Binary(v != 0)),
        (BacnetValue::Boolean(b), PointKind::Binary) => Some(Value::Binary(b)),
        (BacnetValue::Unsigned(v), PointKind::MultiState) => Some(Value::MultiState(v)),
        (BacnetValue::Enumerated(v), PointKind::MultiState) => Some(Value::MultiState(v)),
        _ => None,
    }
}

struct WritePropertyRequest {
    object: ObjectId,
    property: PropertyIdentifier,
    value: BacnetValue,
    priority: Option<u32>,
}

fn decode_write_property_request(buf: &[u8]) -> Option<WritePropertyRequest> {
    let (object_val, n1) = decode_context_as(buf, 0, 12)?;
    let BacnetValue::ObjectIdentifier(object) = object_val else { return None };
    let rest = &buf[n1..];
    let (prop_val, n2) = decode_context_as(rest, 1, 9)?;
    let BacnetValue::Enumerated(prop_code) = prop_val else { return None };
    let mut offset = n2;

    // Optional propertyArrayIndex [2] — BASim has no array properties, skip over it.
    if is_context_tag(&rest[offset..], 2) {
        let (_, consumed) = decode_context_as(&rest[offset..], 2, 2)?;
        offset += consumed;
    }

    if !is_opening(&rest[offset..], 3) {
        return None;
    }
    offset += construct_tag_len(&rest[offset..]);
    let (value, consumed) = decode_application(&rest[offset..])?;
    offset += consumed;
    if !is_closing(&rest[offset..], 3) {
        return None;
    }
    offset += construct_tag_len(&rest[offset..]);

    let priority = if offset < rest.len() && is_context_tag(&rest[offset..], 4) {
        let (p, _consumed) = decode_context_as(&rest[offset..], 4, 2)?;
        match p {
            BacnetValue::Unsigned(v) => Some(v),
            _ => None,
        }
    } else {
        None
    };

    Some(WritePropertyRequest { object, property: PropertyIdentifier::from_code(prop_code), value, priority })
}

fn is_context_tag(buf: &[u8], tag_number: u8) -> bool {
    buf.first().is_some_and(|&b| (b & 0x08 != 0) && (b & 0x07) < 6 && (b >> 4) == tag_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn write_then_read_present_value_round_trips() {
        let campus = crate::campus::Campus::assemble(&Config::default()).unwrap();
        let shared = campus.shared();
        let path = "CentralPlant.Chiller_1.chw_supply_temp_setpoint";
        let point = shared.registry.resolve(path).unwrap();
        let object = ObjectId { object_type: ObjectType::AnalogValue.code(), instance: point.0 };

        let mut write_body = Vec::new();
        write_body.extend(encode_context(0, &BacnetValue::ObjectIdentifier(object)));
        write_body.extend(encode_context(1, &BacnetValue::Enumerated(PropertyIdentifier::PresentValue.code())));
        write_body.push(open_context(3));
        write_body.extend(encode_application(&BacnetValue::Real(45.0)));
        write_body.push(close_context(3));
        write_body.extend(encode_context(4, &BacnetValue::Unsigned(8)));

        let ack = handle_write_property(&shared, 1, &write_body);
        assert_eq!(ack[0], PDU_SIMPLE_ACK);

        let reading = shared.registry.read(path).unwrap();
        assert_eq!(reading.effective_value, Value::Analog(45.0));
    }

    #[test]
    fn read_present_value_returns_real_for_analog_point() {
        let campus = crate::campus::Campus::assemble(&Config::default()).unwrap();
        let shared = campus.shared();
        let path = "CentralPlant.CHW_supply_temp";
        let point = shared.registry.resolve(path).unwrap();
        let object = ObjectId { object_type: ObjectType::AnalogValue.code(), instance: point.0 };

        let mut req_body = Vec::new();
        req_body.extend(encode_context(0, &BacnetValue::ObjectIdentifier(object)));
        req_body.extend(encode_context(1, &BacnetValue::Enumerated(PropertyIdentifier::PresentValue.code())));

        let ack = handle_read_property(&shared, 7, &req_body);
        assert_eq!(ack[0], PDU_COMPLEX_ACK);
        assert_eq!(ack[1], 7);
    }

    #[test]
    fn write_null_releases_override() {
        let campus = crate::campus::Campus::assemble(&Config::default()).unwrap();
        let shared = campus.shared();
        let path = "CentralPlant.Chiller_1.chw_supply_temp_setpoint";
        let point = shared.registry.resolve(path).unwrap();
        shared.registry.override_point(path, Value::Analog(50.0), 8, "test", 0.0, None).unwrap();

        let object = ObjectId { object_type: ObjectType::AnalogValue.code(), instance: point.0 };
        let mut write_body = Vec::new();
        write_body.extend(encode_context(0, &BacnetValue::ObjectIdentifier(object)));
        write_body.extend(encode_context(1, &BacnetValue::Enumerated(PropertyIdentifier::PresentValue.code())));
        write_body.push(open_context(3));
        write_body.extend(encode_application(&BacnetValue::Null));
        write_body.push(close_context(3));
        write_body.extend(encode_context(4, &BacnetValue::Unsigned(8)));

        let ack = handle_write_property(&shared, 2, &write_body);
        assert_eq!(ack[0], PDU_SIMPLE_ACK);
        assert!(shared.registry.overrides(path).unwrap().is_empty());
    }
}
