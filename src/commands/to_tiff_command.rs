//! `to-tiff` subcommand: decodes a JPEG/PNG/BMP source image with the
//! `image` crate and encodes it as a single-IFD TIFF via `Writer`.

use std::path::PathBuf;

use image::{DynamicImage, GenericImageView};

use crate::commands::command_traits::Command;
use crate::io::stream::ByteStream;
use crate::sample_packing::{ImageLayout, PlanarConfig, SampleFormat};
use crate::tiff::constants::{compression, photometric, predictor, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::{IFDEntry, IFDValue};
use crate::writer::{Writer, WriterOptions};

pub struct ToTiffCommand {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub big_tiff: bool,
    /// Reserved for codecs that honor a quality knob; the built-in lossless
    /// codecs ignore it.
    pub quality: Option<u8>,
}

impl Command for ToTiffCommand {
    fn execute(&self) -> TiffResult<()> {
        let image = image::open(&self.src).map_err(|e| TiffError::UnsupportedFormat(format!("cannot decode {}: {}", self.src.display(), e)))?;
        let (image_width, image_height) = image.dimensions();

        let (samples_per_pixel, bits_per_sample, photometric_code, raw): (u32, Vec<u32>, u16, Vec<u8>) = match image {
            DynamicImage::ImageLuma8(buf) => (1, vec![8], photometric::BLACK_IS_ZERO, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (3, vec![8, 8, 8], photometric::RGB, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (4, vec![8, 8, 8, 8], photometric::RGB, buf.into_raw()),
            other => {
                let buf = other.to_rgb8();
                (3, vec![8, 8, 8], photometric::RGB, buf.into_raw())
            }
        };

        let layout = ImageLayout {
            width: image_width,
            height: image_height,
            samples_per_pixel,
            bits_per_sample,
            sample_format: SampleFormat::Unsigned,
            planar_config: PlanarConfig::Chunky,
            photometric: photometric_code,
            compression: compression::DEFLATE as u64,
            predictor: predictor::NONE,
            fill_order: 1,
            ycbcr: None,
        };

        let mut options = WriterOptions::default();
        options.big_tiff = self.big_tiff;
        options.compression = compression::DEFLATE as u64;
        options.compression_quality = self.quality;

        let stream = ByteStream::create(&self.dst)?;
        let mut writer = Writer::create(stream, options)?;
        writer.new_map(layout, image_width, image_height, false)?;

        if samples_per_pixel == 4 {
            writer.set_extra_tag(IFDEntry::with_value(tags::EXTRA_SAMPLES, 0, IFDValue::Short(vec![2])))?;
        }

        writer.write_tile(0, 0, 0, &raw)?;
        writer.complete_writing()?;
        writer.finish()?;

        println!("wrote {}x{} TIFF to {}", image_width, image_height, self.dst.display());
        Ok(())
    }
}
