//! ImageLayout: the IFD-derived parameters every sample-packing operation is
//! parameterized by.

use super::ycbcr::YCbCrParams;
use crate::tiff::constants::{photometric, planar_config, predictor, sample_format, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanarConfig {
    Chunky,
    Planar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Unsigned,
    Signed,
    Float,
}

#[derive(Debug, Clone)]
pub struct ImageLayout {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub bits_per_sample: Vec<u32>,
    pub sample_format: SampleFormat,
    pub planar_config: PlanarConfig,
    pub photometric: u16,
    pub compression: u64,
    pub predictor: u16,
    pub fill_order: u16,
    /// Subsampling/reference/coefficient parameters for YCbCr conversion,
    /// present only when `photometric == YCBCR`.
    pub ycbcr: Option<YCbCrParams>,
}

impl ImageLayout {
    pub fn from_ifd(ifd: &IFD) -> TiffResult<Self> {
        let width = ifd.get_tag_value(tags::IMAGE_WIDTH).ok_or(TiffError::MissingDimensions)? as u32;
        let height = ifd.get_tag_value(tags::IMAGE_LENGTH).ok_or(TiffError::MissingDimensions)? as u32;
        let samples_per_pixel = ifd.get_samples_per_pixel() as u32;

        let bits_per_sample = ifd
            .get_entry(tags::BITS_PER_SAMPLE)
            .and_then(|e| e.typed_value())
            .and_then(|v| v.as_u64_vec())
            .map(|v| v.into_iter().map(|b| b as u32).collect::<Vec<_>>())
            .unwrap_or_else(|| vec![1; samples_per_pixel as usize]);

        if bits_per_sample.len() < samples_per_pixel as usize {
            return Err(TiffError::MalformedIFD(
                "SamplesPerPixel exceeds the length of BitsPerSample".to_string(),
            ));
        }

        let sample_format_tag = ifd.get_tag_value(tags::SAMPLE_FORMAT).unwrap_or(sample_format::UNSIGNED as u64);
        let sample_format = match sample_format_tag as u16 {
            sample_format::SIGNED => SampleFormat::Signed,
            sample_format::IEEEFP => SampleFormat::Float,
            _ => SampleFormat::Unsigned,
        };

        let planar = ifd.get_tag_value(tags::PLANAR_CONFIGURATION).unwrap_or(planar_config::CHUNKY as u64);
        let planar_config = if planar as u16 == planar_config::PLANAR { PlanarConfig::Planar } else { PlanarConfig::Chunky };

        let photometric_value = ifd.get_tag_value(tags::PHOTOMETRIC_INTERPRETATION).unwrap_or(photometric::BLACK_IS_ZERO as u64) as u16;
        let compression = ifd.get_tag_value(tags::COMPRESSION).unwrap_or(1);
        let predictor_value = ifd.get_tag_value(tags::PREDICTOR).unwrap_or(predictor::NONE as u64) as u16;
        let fill_order = ifd.get_tag_value(tags::FILL_ORDER).unwrap_or(1) as u16;

        let ycbcr = if photometric_value == photometric::YCBCR {
            let mut params = YCbCrParams::default();
            if let Some(sub) = ifd.get_entry(tags::YCBCR_SUBSAMPLING).and_then(|e| e.typed_value()).and_then(|v| v.as_u64_vec()) {
                if sub.len() >= 2 {
                    params.h_sub = sub[0] as u32;
                    params.v_sub = sub[1] as u32;
                }
            }
            if let Some(rbw) = ifd.get_entry(tags::REFERENCE_BLACK_WHITE).and_then(|e| e.typed_value()).and_then(|v| v.as_f64_vec()) {
                if rbw.len() >= 6 {
                    for i in 0..6 {
                        params.reference_black_white[i] = rbw[i] as f32;
                    }
                }
            }
            if let Some(coef) = ifd.get_entry(tags::YCBCR_COEFFICIENTS).and_then(|e| e.typed_value()).and_then(|v| v.as_f64_vec()) {
                if coef.len() >= 3 {
                    for i in 0..3 {
                        params.coefficients[i] = coef[i] as f32;
                    }
                }
            }
            Some(params)
        } else {
            None
        };

        Ok(ImageLayout {
            width,
            height,
            samples_per_pixel,
            bits_per_sample,
            sample_format,
            planar_config,
            photometric: photometric_value,
            compression,
            predictor: predictor_value,
            fill_order,
            ycbcr,
        })
    }

    /// All channels share the same bits-per-sample.
    pub fn uniform_bit_depth(&self) -> Option<u32> {
        let first = *self.bits_per_sample.first()?;
        if self.bits_per_sample.iter().all(|&b| b == first) {
            Some(first)
        } else {
            None
        }
    }

    pub fn requires_inversion(&self) -> bool {
        matches!(self.photometric, photometric::WHITE_IS_ZERO | photometric::CMYK | photometric::TRANSPARENCY_MASK)
    }

    pub fn is_ycbcr(&self) -> bool {
        self.photometric == photometric::YCBCR
    }
}
