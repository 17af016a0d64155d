//! PDF object serialization.
//!
//! Objects are written into an in-memory buffer, so serialization itself
//! cannot fail. Dictionary keys are sorted for deterministic output, which
//! keeps signed bytes reproducible across runs with identical inputs.

use crate::object::{Dictionary, Object};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a serializer that puts each dictionary entry on its own line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for logging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Append the serialized form of `obj` to `out`.
    pub fn write_object(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(out, *r),
            Object::String(s) => write_string(out, s),
            Object::Name(n) => write_name(out, n),
            Object::Array(arr) => self.write_array(out, arr),
            Object::Dictionary(dict) => self.write_dictionary(out, dict),
            Object::Stream { dict, data } => self.write_stream(out, dict, data),
            Object::Reference(r) => out.extend_from_slice(format!("{} {} R", r.id, r.gen).as_bytes()),
        }
    }

    fn write_array(&self, out: &mut Vec<u8>, arr: &[Object]) {
        out.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            self.write_object(out, obj);
        }
        out.push(b']');
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, dict: &Dictionary) {
        out.extend_from_slice(b"<<");

        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            let Some(value) = dict.get(key) else {
                continue;
            };
            out.extend_from_slice(if self.compact { b" " } else { b"\n  " });
            write_name(out, key);
            out.push(b' ');
            self.write_object(out, value);
        }

        out.extend_from_slice(if self.compact || dict.is_empty() { b" >>" } else { b"\n>>" });
    }

    /// /Length always reflects `data`; a stale value from a parsed stream is replaced.
    fn write_stream(&self, out: &mut Vec<u8>, dict: &Dictionary, data: &[u8]) {
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(out, &dict);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\nendstream");
    }
}

/// Write a real number with at most five decimal places.
fn write_real(out: &mut Vec<u8>, value: f64) {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        out.extend_from_slice((value as i64).to_string().as_bytes());
    } else {
        let formatted = format!("{:.5}", value);
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        out.extend_from_slice(trimmed.as_bytes());
    }
}

/// Literal `(...)` for printable ASCII, hex `<...>` for anything else.
fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if !printable {
        out.push(b'<');
        out.extend_from_slice(crate::decoders::encode_hex_upper(data).as_bytes());
        out.push(b'>');
        return;
    }

    out.push(b'(');
    for &byte in data {
        match byte {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

/// Names start with `/`; delimiters, whitespace and non-ASCII bytes become `#xx`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for byte in name.bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && !crate::lexer::is_delimiter(byte)
            && byte != b'#';
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use crate::parser::parse_object;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-42)), "-42");
        assert_eq!(s.serialize_to_string(&Object::Real(3.0)), "3");
        assert_eq!(s.serialize_to_string(&Object::Real(0.125)), "0.125");
    }

    #[test]
    fn test_serialize_strings() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::String(b"a(b)\\".to_vec())), "(a\\(b\\)\\\\)");
        assert_eq!(s.serialize_to_string(&Object::String(vec![0xFE, 0xFF, 0x00, 0x41])), "<FEFF0041>");
    }

    #[test]
    fn test_serialize_name_escapes() {
        let s = ObjectSerializer::compact();
        assert_eq!(s.serialize_to_string(&Object::Name("Adobe.PPKLite".into())), "/Adobe.PPKLite");
        assert_eq!(s.serialize_to_string(&Object::Name("A B#".into())), "/A#20B#23");
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let mut dict = Dictionary::new();
        dict.insert("T".to_string(), Object::String(b"Signature1".to_vec()));
        dict.insert("FT".to_string(), Object::Name("Sig".to_string()));
        dict.insert("P".to_string(), Object::Reference(ObjectRef::new(3, 0)));
        let s = ObjectSerializer::compact();
        assert_eq!(
            s.serialize_to_string(&Object::Dictionary(dict)),
            "<< /FT /Sig /P 3 0 R /T (Signature1) >>"
        );
    }

    #[test]
    fn test_serialize_indirect() {
        let s = ObjectSerializer::compact();
        let bytes = s.serialize_indirect(7, 0, &Object::Array(vec![Object::Integer(0); 4]));
        assert_eq!(bytes, b"7 0 obj\n[0 0 0 0]\nendobj\n");
    }

    #[test]
    fn test_stream_length_is_rewritten() {
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"abc"),
        };
        let text = ObjectSerializer::compact().serialize_to_string(&obj);
        assert!(text.starts_with("<< /Length 3 >>\nstream\nabc\nendstream"));
    }

    #[test]
    fn test_serialized_output_reparses() {
        let mut dict = Dictionary::new();
        dict.insert("Fields".to_string(), Object::Array(vec![Object::Reference(ObjectRef::new(9, 0))]));
        dict.insert("SigFlags".to_string(), Object::Integer(3));
        let original = Object::Dictionary(dict);

        for serializer in [ObjectSerializer::new(), ObjectSerializer::compact()] {
            let bytes = serializer.serialize(&original);
            let (_, reparsed) = parse_object(&bytes).unwrap();
            assert_eq!(reparsed, original);
        }
    }
}
