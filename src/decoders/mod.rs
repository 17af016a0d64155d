//! Stream decoders for the filters found in signature-bearing structure.
//!
//! Cross-reference streams and object streams are almost always
//! FlateDecode with an optional PNG predictor; ASCIIHexDecode shows up in
//! hand-written files. Image and font filters are never needed to locate
//! signature fields, so they are rejected as unsupported.

use crate::error::{Error, Result};

mod ascii_hex;
mod flate;
mod predictor;

pub use ascii_hex::{decode_hex_digits, encode_hex_upper, AsciiHexDecoder};
pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on decoded structure streams.
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in /Filter (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

fn decoder_for(filter_name: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter_name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Decode stream data using a filter pipeline.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}

/// Decode stream data, then undo the predictor described by `params`.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder = decoder_for(filter_name)?;
        current = decoder.decode(&current)?;
        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "{} output of {} bytes exceeds limit {}",
                decoder.name(),
                current.len(),
                MAX_DECODED_SIZE
            )));
        }
    }

    if let Some(params) = params {
        if params.predictor > 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}
