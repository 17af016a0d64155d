//! ASCIIHexDecode and the hex helpers shared with signature handling.
//!
//! Whitespace is ignored, `>` ends the data, and an odd trailing digit is
//! padded with an implicit '0'.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&c| c == b'>').unwrap_or(input.len());
        decode_hex_digits(&input[..end])
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Decode hex digits, skipping whitespace and padding an odd tail with '0'.
pub fn decode_hex_digits(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() / 2 + 1);
    let mut digits = input.iter().filter(|c| !c.is_ascii_whitespace());

    while let Some(&high) = digits.next() {
        let low = digits.next().copied().unwrap_or(b'0');
        let high = hex_value(high)
            .ok_or_else(|| Error::Decode(format!("invalid hex digit '{}'", high as char)))?;
        let low = hex_value(low)
            .ok_or_else(|| Error::Decode(format!("invalid hex digit '{}'", low as char)))?;
        output.push((high << 4) | low);
    }

    Ok(output)
}

/// Encode bytes as uppercase hex.
pub fn encode_hex_upper(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}
