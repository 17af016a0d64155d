//! Object streams (`/Type /ObjStm`).
//!
//! The decoded stream starts with `/N` pairs of integers (object number,
//! offset relative to `/First`) followed by the object bodies:
//!
//! ```text
//! 10 0 11 15 12 28
//! << /FT /Sig ... >> [ 0 0 612 792 ] ...
//! ```
//!
//! Signature fields and widgets written by modern producers frequently live
//! here, so field discovery depends on it.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::{describe_nom_error, parse_object, trim_start};
use std::collections::HashMap;

/// Parse an object stream into its contained objects, keyed by object number.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    if let Some(kind) = dict.get("Type").and_then(|o| o.as_name()) {
        if kind != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /Type /{}", kind)));
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| (0..=1_000_000).contains(n))
        .ok_or_else(|| Error::InvalidPdf("object stream has no valid /N".to_string()))?
        as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|f| *f >= 0)
        .ok_or_else(|| Error::InvalidPdf("object stream has no valid /First".to_string()))?
        as usize;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream data too short: {} bytes, /First is {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_object_number_pairs(&decoded[..first], n)?;
    let bodies = &decoded[first..];
    let mut objects = HashMap::with_capacity(pairs.len());

    for (obj_num, offset) in pairs {
        let Some(body) = bodies.get(offset..) else {
            log::warn!("Object {} offset {} is beyond object stream data", obj_num, offset);
            continue;
        };
        match parse_object(body) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!(
                "Failed to parse object {} from object stream: {}",
                obj_num,
                describe_nom_error(&e)
            ),
        }
    }

    Ok(objects)
}

fn parse_object_number_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;

    for i in 0..count {
        let (obj_num, rest) = read_unsigned(trim_start(remaining)).ok_or_else(|| Error::ParseError {
            offset: data.len() - remaining.len(),
            reason: format!("object number of pair {}", i),
        })?;
        let (offset, rest) = read_unsigned(trim_start(rest)).ok_or_else(|| Error::ParseError {
            offset: data.len() - rest.len(),
            reason: format!("offset of pair {}", i),
        })?;
        let obj_num = u32::try_from(obj_num).map_err(|_| Error::ParseError {
            offset: 0,
            reason: format!("object number {} out of range", obj_num),
        })?;
        pairs.push((obj_num, offset as usize));
        remaining = rest;
    }

    Ok(pairs)
}

fn read_unsigned(data: &[u8]) -> Option<(u64, &[u8])> {
    let len = data.iter().take_while(|c| c.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    let value = std::str::from_utf8(&data[..len]).ok()?.parse().ok()?;
    Some((value, &data[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;
    use bytes::Bytes;

    fn object_stream(n: i64, first: i64, body: &'static [u8]) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Object::Stream {
            dict,
            data: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_parse_object_number_pairs() {
        let pairs = parse_object_number_pairs(b"10 0 11 15\n12 28", 3).unwrap();
        assert_eq!(pairs, vec![(10, 0), (11, 15), (12, 28)]);
    }

    #[test]
    fn test_parse_object_number_pairs_too_few() {
        assert!(parse_object_number_pairs(b"10 0", 2).is_err());
    }

    #[test]
    fn test_parse_object_stream() {
        // "5 0 6 21 " is 9 bytes; the first body is 21 bytes long
        let stream = object_stream(2, 9, b"5 0 6 21 << /FT /Sig /T (A) >>[1 2 3]");
        let objects = parse_object_stream(&stream).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(
            objects[&5].as_dict().unwrap().get("FT").unwrap().as_name(),
            Some("Sig")
        );
        assert_eq!(objects[&6].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_offset_beyond_data_is_skipped() {
        let stream = object_stream(2, 8, b"5 0 6 99 << >>");
        let objects = parse_object_stream(&stream).unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key(&5));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut stream = object_stream(0, 0, b"");
        if let Object::Stream { dict, .. } = &mut stream {
            dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        }
        assert!(parse_object_stream(&stream).is_err());
    }

    #[test]
    fn test_not_a_stream() {
        assert!(matches!(
            parse_object_stream(&Object::Null),
            Err(Error::InvalidObjectType { .. })
        ));
    }
}
