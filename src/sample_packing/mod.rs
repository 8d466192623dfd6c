//! Sample packing: bit unpacking, predictor reversal, YCbCr conversion, and
//! unusual-precision widening, parameterized by `ImageLayout`.
//!
//! `unpack_tile`/`pack_tile` orchestrate the per-tile pipeline, dispatching
//! to the submodules below. Reader and Writer each call one of these once
//! per tile rather than re-deriving the pipeline.

pub mod bitpack;
pub mod layout;
pub mod precision;
pub mod predictor;
pub mod ycbcr;

pub use bitpack::{invert_if_needed, pack_row, packed_row_stride, scale_to_width, unpack_row, unscale_from_width};
pub use layout::{ImageLayout, PlanarConfig, SampleFormat};
pub use predictor::{apply_horizontal, unapply_floating_point, unapply_horizontal, validate_predictor_codec};
pub use ycbcr::{ycbcr_to_rgb, YCbCrParams};

use crate::tiff::constants::predictor as predictor_tag;
use crate::tiff::errors::TiffResult;

/// Decoded-tile byte layout `unpack_tile` produces: one byte per sample,
/// chunky-interleaved, row-major, for 8-bit-and-narrower samples. A uniform
/// 16-bit non-float sample passes through at its native 2-byte width.
/// A 3-byte integer, a 16-bit float, or a 24-bit float is widened to a
/// 4-byte host-native sample (`u32`/`f32` bits via `precision`) since none
/// of those widths are otherwise addressable a whole byte at a time.
pub fn unpack_tile(raw: &[u8], layout: &ImageLayout, tile_width: u32, tile_height: u32, little_endian: bool) -> TiffResult<Vec<u8>> {
    if layout.is_ycbcr() {
        let params = layout.ycbcr.unwrap_or_default();
        return ycbcr_to_rgb(raw, tile_width, tile_height, &params);
    }

    let channels = layout.samples_per_pixel as usize;
    let uniform_bits = layout.uniform_bit_depth();
    let byte_aligned = uniform_bits.map(|b| b % 8 == 0 && b > 0).unwrap_or(false);

    if byte_aligned {
        let bits = uniform_bits.unwrap();
        let bytes_per_sample = (bits / 8) as usize;
        let mut data = raw.to_vec();

        match layout.predictor {
            p if p == predictor_tag::HORIZONTAL_DIFFERENCING => {
                unapply_horizontal(&mut data, tile_width as usize, tile_height as usize, channels, bytes_per_sample, little_endian)
            }
            p if p == predictor_tag::FLOATING_POINT => {
                unapply_floating_point(&mut data, tile_width as usize, tile_height as usize, channels, bytes_per_sample)?
            }
            _ => {}
        }

        if bits == 8 {
            for v in data.iter_mut() {
                *v = invert_if_needed(*v as u32, 8, layout) as u8;
            }
            return Ok(data);
        }

        if bits == 24 {
            let mut out = Vec::with_capacity((data.len() / 3) * 4);
            for chunk in data.chunks_exact(3) {
                let bytes = [chunk[0], chunk[1], chunk[2]];
                let widened = if layout.sample_format == SampleFormat::Float {
                    precision::float24_to_f32_bits(bytes, little_endian)
                } else {
                    precision::widen_u24(bytes, little_endian, true)
                };
                out.extend_from_slice(&widened.to_ne_bytes());
            }
            return Ok(out);
        }

        if bits == 16 && layout.sample_format == SampleFormat::Float {
            let mut out = Vec::with_capacity((data.len() / 2) * 4);
            for chunk in data.chunks_exact(2) {
                let half = if little_endian { u16::from_le_bytes([chunk[0], chunk[1]]) } else { u16::from_be_bytes([chunk[0], chunk[1]]) };
                let widened = precision::float16_to_f32_bits(half);
                out.extend_from_slice(&widened.to_ne_bytes());
            }
            return Ok(out);
        }

        Ok(data)
    } else {
        let stride = packed_row_stride(&layout.bits_per_sample, tile_width);
        let mut out = Vec::with_capacity(tile_width as usize * tile_height as usize * channels);
        for row in 0..tile_height as usize {
            let row_start = row * stride;
            let row_end = (row_start + stride).min(raw.len());
            let packed_row = &raw[row_start..row_end];
            let samples = unpack_row(packed_row, &layout.bits_per_sample, tile_width)?;
            for (i, &s) in samples.iter().enumerate() {
                let bits = layout.bits_per_sample[i % channels];
                let scaled = scale_to_width(s, bits, 8, layout.photometric);
                out.push(invert_if_needed(scaled, 8, layout) as u8);
            }
        }
        Ok(out)
    }
}

/// Inverse of `unpack_tile`, for the writer's pack path: one byte per
/// sample, chunky-interleaved, row-major, goes back to the packed
/// on-disk representation. Widened 4-byte samples (see `unpack_tile`) are
/// narrowed back to their on-disk width before the predictor is reapplied.
pub fn pack_tile(pixels: &[u8], layout: &ImageLayout, tile_width: u32, tile_height: u32, little_endian: bool) -> TiffResult<Vec<u8>> {
    let channels = layout.samples_per_pixel as usize;
    let uniform_bits = layout.uniform_bit_depth();
    let byte_aligned = uniform_bits.map(|b| b % 8 == 0 && b > 0).unwrap_or(false);

    if byte_aligned {
        let bits = uniform_bits.unwrap();
        let bytes_per_sample = (bits / 8) as usize;

        let mut data = if bits == 24 {
            let mut narrowed = Vec::with_capacity((pixels.len() / 4) * 3);
            for chunk in pixels.chunks_exact(4) {
                let wide = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let bytes = if layout.sample_format == SampleFormat::Float {
                    precision::f32_bits_to_float24(wide, little_endian)
                } else {
                    precision::narrow_u24(wide, little_endian, true)
                };
                narrowed.extend_from_slice(&bytes);
            }
            narrowed
        } else if bits == 16 && layout.sample_format == SampleFormat::Float {
            let mut narrowed = Vec::with_capacity((pixels.len() / 4) * 2);
            for chunk in pixels.chunks_exact(4) {
                let wide = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let half = precision::f32_bits_to_float16(wide);
                let bytes = if little_endian { half.to_le_bytes() } else { half.to_be_bytes() };
                narrowed.extend_from_slice(&bytes);
            }
            narrowed
        } else {
            pixels.to_vec()
        };

        if bits == 8 {
            for v in data.iter_mut() {
                *v = invert_if_needed(*v as u32, 8, layout) as u8;
            }
        }

        if layout.predictor == predictor_tag::HORIZONTAL_DIFFERENCING {
            apply_horizontal(&mut data, tile_width as usize, tile_height as usize, channels, bytes_per_sample, little_endian);
        }

        Ok(data)
    } else {
        let row_len = tile_width as usize * channels;
        let mut out = Vec::new();
        for row in 0..tile_height as usize {
            let row_start = row * row_len;
            let row_end = (row_start + row_len).min(pixels.len());
            let row_pixels = &pixels[row_start..row_end];

            let mut samples = Vec::with_capacity(row_len);
            for (i, &v) in row_pixels.iter().enumerate() {
                let bits = layout.bits_per_sample[i % channels];
                // Mirrors unpack_tile's scale-then-invert, in reverse: undo
                // the 8-bit-width inversion first, then unscale back to N bits.
                let restored = invert_if_needed(v as u32, 8, layout);
                samples.push(unscale_from_width(restored, bits, 8, layout.photometric));
            }
            out.extend(pack_row(&samples, &layout.bits_per_sample, tile_width));
        }
        Ok(out)
    }
}
