//! FlateDecode (zlib/deflate) implementation backed by flate2.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let zlib_err = match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => return Ok(output),
            Err(e) => e,
        };

        // Truncated streams still carry complete xref rows up to the break
        if !output.is_empty() {
            log::warn!(
                "FlateDecode recovered {} bytes before corruption: {}",
                output.len(),
                zlib_err
            );
            return Ok(output);
        }

        // Some writers omit the zlib wrapper
        log::debug!("Zlib decode failed ({}), trying raw deflate", zlib_err);
        output.clear();
        match DeflateDecoder::new(input).read_to_end(&mut output) {
            Ok(_) if !output.is_empty() => Ok(output),
            Ok(_) => Err(Error::Decode(format!(
                "FlateDecode produced no data: zlib error {}",
                zlib_err
            ))),
            Err(deflate_err) => Err(Error::Decode(format!(
                "FlateDecode decompression failed: zlib error {}, deflate error {} ({} bytes)",
                zlib_err,
                deflate_err,
                input.len()
            ))),
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_flate_decode_simple() {
        let original = b"1 0 obj << /Type /Catalog >> endobj";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_flate_decode_raw_deflate() {
        let original = b"raw deflate without zlib header";
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), original);
    }

    #[test]
    fn test_flate_decode_invalid_data() {
        let result = FlateDecoder.decode(b"This is not zlib compressed data");
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
