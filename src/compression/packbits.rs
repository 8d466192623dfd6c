//! PackBits run-length codec (compression code 32773)
//!
//! No teacher precedent; this is Apple's classic RLE scheme used widely in
//! TIFF. A control byte `n` is followed either by `n+1` literal bytes
//! (`0 <= n <= 127`) or by one byte repeated `257-n` times (`-127 <= n <=
//! -1`, i.e. control byte `129..=255`); control byte `128` is a no-op,
//! skipped by encoders and tolerated by decoders.

use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;

pub struct PackBitsHandler;

impl CompressionHandler for PackBitsHandler {
    fn decompress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < data.len() {
            let control = data[i] as i8;
            i += 1;
            if control >= 0 {
                let count = control as usize + 1;
                let end = i + count;
                if end > data.len() {
                    return Err(TiffError::CorruptedData(
                        "PackBits literal run extends past end of stream".to_string(),
                    ));
                }
                out.extend_from_slice(&data[i..end]);
                i = end;
            } else if control != -128 {
                let count = 257 - (control as i16 + 256) as usize;
                if i >= data.len() {
                    return Err(TiffError::CorruptedData(
                        "PackBits replicate run missing its byte".to_string(),
                    ));
                }
                let byte = data[i];
                i += 1;
                out.extend(std::iter::repeat(byte).take(count));
            }
            // control == -128 (0x80): no-op control byte, skip.
        }
        Ok(out)
    }

    fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < data.len() {
            // Look for a run of identical bytes.
            let mut run_len = 1;
            while i + run_len < data.len() && data[i + run_len] == data[i] && run_len < 128 {
                run_len += 1;
            }

            if run_len >= 2 {
                out.push((257 - run_len) as u8);
                out.push(data[i]);
                i += run_len;
                continue;
            }

            // Otherwise accumulate a literal run, stopping before any run of >=2.
            let literal_start = i;
            let mut literal_len = 1;
            i += 1;
            while i < data.len() && literal_len < 128 {
                let remaining_run = {
                    let mut r = 1;
                    while i + r < data.len() && data[i + r] == data[i] && r < 128 {
                        r += 1;
                    }
                    r
                };
                if remaining_run >= 2 {
                    break;
                }
                literal_len += 1;
                i += 1;
            }
            out.push((literal_len - 1) as u8);
            out.extend_from_slice(&data[literal_start..literal_start + literal_len]);
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "PackBits"
    }

    fn code(&self) -> u64 {
        crate::tiff::constants::compression::PACKBITS as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_runs_and_literals() {
        let original = vec![1, 1, 1, 1, 2, 3, 4, 5, 5, 5, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9];
        let codec = PackBitsHandler;
        let packed = codec.compress(&original).unwrap();
        let unpacked = codec.decompress(&packed).unwrap();
        assert_eq!(unpacked, original);
    }

    #[test]
    fn round_trips_all_literal() {
        let original: Vec<u8> = (0..200u16).map(|x| (x % 251) as u8).collect();
        let codec = PackBitsHandler;
        let packed = codec.compress(&original).unwrap();
        assert_eq!(codec.decompress(&packed).unwrap(), original);
    }

    #[test]
    fn decode_rejects_truncated_literal_run() {
        let codec = PackBitsHandler;
        assert!(codec.decompress(&[2, 0xAA]).is_err());
    }
}
