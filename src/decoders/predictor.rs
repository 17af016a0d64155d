//! PNG and TIFF predictors for decoded structure streams.
//!
//! Cross-reference streams are usually written with `/Predictor 12`
//! (PNG Up) over rows of `/Columns` bytes.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding the PNG tag byte.
    pub fn row_len(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per complete sample, at least one.
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_len();
    let bpp = params.bytes_per_pixel();
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_len();
    let stride = row_len + 1;
    let bpp = params.bytes_per_pixel();

    if data.len() % stride != 0 {
        log::warn!(
            "PNG predictor data length {} is not a multiple of row size {}; dropping tail",
            data.len(),
            stride
        );
    }

    let mut output: Vec<u8> = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for encoded in data.chunks_exact(stride) {
        let tag = encoded[0];
        let mut row = encoded[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            row[i] = row[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&row);
        prev = row;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (ia, ib, ic) = (a as i16, b as i16, c as i16);
    let p = ia + ib - ic;
    let (pa, pb, pc) = ((p - ia).abs(), (p - ib).abs(), (p - ic).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(columns: usize) -> DecodeParams {
        DecodeParams {
            predictor: 12,
            columns,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_predictor() {
        let data = b"xref rows";
        assert_eq!(decode_predictor(data, &DecodeParams::default()).unwrap(), data);
    }

    #[test]
    fn test_png_up_predictor() {
        let encoded = vec![
            2, 10, 20, 30, 40, 50, // row 0
            2, 5, 5, 5, 5, 5, // row 1
        ];
        let result = decode_predictor(&encoded, &png(5)).unwrap();
        assert_eq!(result, vec![10, 20, 30, 40, 50, 15, 25, 35, 45, 55]);
    }

    #[test]
    fn test_png_sub_and_paeth_rows() {
        let encoded = vec![
            1, 1, 1, 1, // sub: 1 2 3
            4, 1, 1, 1, // paeth over previous row
        ];
        let result = decode_predictor(&encoded, &png(3)).unwrap();
        assert_eq!(&result[..3], &[1, 2, 3]);
        assert_eq!(&result[3..], &[2, 3, 4]);
    }

    #[test]
    fn test_png_invalid_tag() {
        let encoded = vec![9, 0, 0];
        assert!(decode_predictor(&encoded, &png(2)).is_err());
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 3,
            ..Default::default()
        };
        let result = decode_predictor(&[1, 1, 1, 5, 1, 1], &params).unwrap();
        assert_eq!(result, vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn test_row_len() {
        assert_eq!(png(5).row_len(), 5);
        let params = DecodeParams {
            columns: 4,
            bits_per_component: 4,
            ..Default::default()
        };
        assert_eq!(params.row_len(), 2);
    }
}
