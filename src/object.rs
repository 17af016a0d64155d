//! In-memory PDF objects as read by the parser and written by the
//! incremental writer.

use crate::decoders::DecodeParams;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and streams.
pub type Dictionary = HashMap<String, Object>;

/// A parsed PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// Literal or hex string, as raw bytes
    String(Vec<u8>),
    /// Name without the leading slash
    Name(String),
    /// Array
    Array(Vec<Object>),
    /// Dictionary
    Dictionary(Dictionary),
    /// Stream: its dictionary and the still-encoded data
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Encoded stream data
        data: bytes::Bytes,
    },
    /// `id gen R`
    Reference(ObjectRef),
}

/// Object number and generation of an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Reference to object `id` at generation `gen`.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Variant name, used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Integer value, if any.
    pub fn as_integer(&self) -> Option<i64> {
        if let Object::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Name value, if any.
    pub fn as_name(&self) -> Option<&str> {
        if let Object::Name(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// Dictionary of a dictionary or of a stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) | Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Array items, if any.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        if let Object::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Indirect reference, if any.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        if let Object::Reference(r) = self {
            Some(*r)
        } else {
            None
        }
    }

    /// Raw bytes of a string object.
    pub fn as_string(&self) -> Option<&[u8]> {
        if let Object::String(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// A string object decoded as a PDF text string.
    pub fn as_text(&self) -> Option<String> {
        self.as_string().map(decode_text_string)
    }

    /// Whether this is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Stream data with its `/Filter` chain and predictor undone.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        let Object::Stream { dict, data } = self else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            });
        };
        let filters: Vec<String> = match dict.get("Filter") {
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|o| o.as_name().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if filters.is_empty() {
            return Ok(data.to_vec());
        }
        let params = extract_decode_params(dict.get("DecodeParms"));
        crate::decoders::decode_stream_with_params(data, &filters, params.as_ref())
    }
}

/// Decode a PDF text string: UTF-16BE or UTF-8 when a byte-order mark is
/// present, Latin-1 otherwise.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text for `/T`, `/Reason` and friends: ASCII as is, anything
/// else as UTF-16BE with a byte-order mark.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Predictor parameters from `/DecodeParms`, which is a dictionary or an
/// array with one entry per filter.
pub(crate) fn extract_decode_params(params: Option<&Object>) -> Option<DecodeParams> {
    let dict = match params? {
        Object::Dictionary(d) => d,
        Object::Array(items) => items.iter().find_map(|o| o.as_dict())?,
        _ => return None,
    };
    let int_or = |key: &str, default: i64| dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default);

    Some(DecodeParams {
        predictor: int_or("Predictor", 1),
        columns: int_or("Columns", 1).max(1) as usize,
        colors: int_or("Colors", 1).max(1) as usize,
        bits_per_component: int_or("BitsPerComponent", 8).max(1) as usize,
    })
}
