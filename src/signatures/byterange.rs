//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of the revision
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//! Both the ByteRange array and the `/Contents` string are written as
//! fixed-width placeholders first and overwritten in place, so no offset in
//! the revision moves once the signature is known.

use crate::error::{Error, Result};

/// Width of the `/ByteRange` array placeholder, brackets included.
pub const BYTE_RANGE_WIDTH: usize = 64;

/// Calculator for PDF signature byte ranges.
#[derive(Debug)]
pub struct ByteRangeCalculator {
    /// Size of the placeholder for the signature value (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator reserving `estimated_signature_size` DER bytes.
    ///
    /// The placeholder holds twice as many hex digits plus the two angle
    /// brackets.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            placeholder_size: estimated_signature_size * 2 + 2,
        }
    }

    /// Create a ByteRange calculator with a specific placeholder size.
    pub fn with_placeholder_size(placeholder_size: usize) -> Self {
        Self { placeholder_size }
    }

    /// Get the placeholder size (for the /Contents value).
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// `<000...000>` filling the whole placeholder.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.placeholder_size.saturating_sub(2)))
    }

    /// Fixed-width ByteRange placeholder, overwritten by [`Self::format_byte_range`].
    pub fn byte_range_placeholder() -> String {
        format!("[0 0 0 0{}]", " ".repeat(BYTE_RANGE_WIDTH - 9))
    }

    /// Calculate the ByteRange array given the position of the /Contents value.
    ///
    /// `contents_offset` is the offset of the opening `<`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Format a ByteRange array padded to [`BYTE_RANGE_WIDTH`] bytes.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> Result<String> {
        let body = format!("[{} {} {} {}", byte_range[0], byte_range[1], byte_range[2], byte_range[3]);
        if body.len() + 1 > BYTE_RANGE_WIDTH {
            return Err(Error::InvalidPdf(format!("ByteRange {} does not fit its placeholder", body)));
        }
        Ok(format!("{:<width$}]", body, width = BYTE_RANGE_WIDTH - 1))
    }

    /// Concatenate the two covered ranges of `pdf_data`.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        let (first, second) = Self::ranges(byte_range, pdf_data.len())?;
        let mut signed_bytes = Vec::with_capacity(first.len() + second.len());
        signed_bytes.extend_from_slice(&pdf_data[first]);
        signed_bytes.extend_from_slice(&pdf_data[second]);
        Ok(signed_bytes)
    }

    /// Check that a ByteRange is well formed for `pdf_data`.
    ///
    /// Both ranges must lie inside the data, the first must start at 0 and
    /// the gap between them must be exactly one hex string (`<...>`), the
    /// signature value itself. A range ending before the end of the data is
    /// well formed: later revisions may follow it.
    pub fn validate_byte_range(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<()> {
        if byte_range[0] != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", byte_range[0])));
        }
        let (first, second) = Self::ranges(byte_range, pdf_data.len())?;
        if first.end >= second.start {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                first.end, second.start
            )));
        }

        let gap = &pdf_data[first.end..second.start];
        let is_hex_string = gap.len() >= 2
            && gap[0] == b'<'
            && gap[gap.len() - 1] == b'>'
            && gap[1..gap.len() - 1]
                .iter()
                .all(|b| b.is_ascii_hexdigit() || crate::lexer::is_whitespace(*b));
        if !is_hex_string {
            return Err(Error::InvalidPdf(
                "ByteRange gap is not exactly the signature value".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `byte_range` is well formed and reaches the end of `pdf_data`.
    pub fn covers_whole_document(pdf_data: &[u8], byte_range: &[i64; 4]) -> bool {
        Self::validate_byte_range(pdf_data, byte_range).is_ok()
            && byte_range[2].checked_add(byte_range[3]) == Some(pdf_data.len() as i64)
    }

    /// Bounds-checked ranges; negative values are rejected.
    fn ranges(
        byte_range: &[i64; 4],
        len: usize,
    ) -> Result<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let to_usize = |v: i64| {
            usize::try_from(v)
                .map_err(|_| Error::InvalidPdf(format!("negative ByteRange value {}", v)))
        };
        let [o1, l1, o2, l2] = [
            to_usize(byte_range[0])?,
            to_usize(byte_range[1])?,
            to_usize(byte_range[2])?,
            to_usize(byte_range[3])?,
        ];
        let end1 = o1.checked_add(l1).filter(|e| *e <= len).ok_or_else(|| {
            Error::InvalidPdf(format!("ByteRange first range exceeds file size: {} + {} > {}", o1, l1, len))
        })?;
        let end2 = o2.checked_add(l2).filter(|e| *e <= len).ok_or_else(|| {
            Error::InvalidPdf(format!("ByteRange second range exceeds file size: {} + {} > {}", o2, l2, len))
        })?;
        Ok((o1..end1, o2..end2))
    }

    /// Replace the placeholder in the PDF with the actual signature.
    ///
    /// The hex value is right-padded with zeros to fill the placeholder.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature_hex: &str,
    ) -> Result<()> {
        let sig_len = signature_hex.len() + 2;
        if sig_len > self.placeholder_size {
            return Err(Error::Crypto(format!(
                "signature needs {} bytes but only {} are reserved; increase the signature size",
                signature_hex.len() / 2,
                (self.placeholder_size - 2) / 2
            )));
        }

        let end = contents_offset + self.placeholder_size;
        let target = pdf_data.get_mut(contents_offset..end).ok_or_else(|| {
            Error::InvalidPdf("Signature insertion would exceed file bounds".to_string())
        })?;
        if target.first() != Some(&b'<') || target.last() != Some(&b'>') {
            return Err(Error::InvalidPdf("no signature placeholder at the given offset".to_string()));
        }

        let padding = (self.placeholder_size - 2) - signature_hex.len();
        target[1..1 + signature_hex.len()].copy_from_slice(signature_hex.as_bytes());
        target[1 + signature_hex.len()..1 + signature_hex.len() + padding].fill(b'0');
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SIGNATURE_SIZE)
    }
}
