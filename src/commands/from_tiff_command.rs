//! `from-tiff` subcommand: decodes one IFD of a TIFF/BigTIFF file into a
//! JPEG/PNG/BMP raster, built on `Reader::read_region` and the `image`
//! crate's encoders.

use std::path::PathBuf;

use image::{GrayImage, RgbImage, RgbaImage};

use crate::commands::command_traits::Command;
use crate::io::stream::ByteStream;
use crate::reader::{Reader, ReaderOptions};
use crate::sample_packing::ImageLayout;
use crate::tiff::constants::photometric;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::tile_map::Region;

pub struct FromTiffCommand {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub ifd_index: usize,
}

impl Command for FromTiffCommand {
    fn execute(&self) -> TiffResult<()> {
        let stream = ByteStream::open_read_only(&self.src)?;
        let mut reader = Reader::open(stream, ReaderOptions::default())?;

        let ifd = reader
            .all_ifds()
            .get(self.ifd_index)
            .ok_or_else(|| TiffError::GenericError(format!("no IFD #{} in {}", self.ifd_index, self.src.display())))?
            .clone();
        let layout = ImageLayout::from_ifd(&ifd)?;

        if layout.bits_per_sample.iter().any(|&b| b != 8) {
            return Err(TiffError::UnsupportedFormat(
                "from-tiff only supports 8-bit-per-sample IFDs".to_string(),
            ));
        }

        let pixels = reader.read_region(self.ifd_index, Region::new(0, 0, layout.width, layout.height))?;

        match layout.samples_per_pixel {
            1 => {
                let buf = GrayImage::from_raw(layout.width, layout.height, pixels)
                    .ok_or_else(|| TiffError::CorruptedData("decoded buffer does not match declared dimensions".to_string()))?;
                buf.save(&self.dst)
            }
            3 if layout.photometric == photometric::RGB => {
                let buf = RgbImage::from_raw(layout.width, layout.height, pixels)
                    .ok_or_else(|| TiffError::CorruptedData("decoded buffer does not match declared dimensions".to_string()))?;
                buf.save(&self.dst)
            }
            4 if layout.photometric == photometric::RGB => {
                let buf = RgbaImage::from_raw(layout.width, layout.height, pixels)
                    .ok_or_else(|| TiffError::CorruptedData("decoded buffer does not match declared dimensions".to_string()))?;
                buf.save(&self.dst)
            }
            n => {
                return Err(TiffError::UnsupportedFormat(format!(
                    "from-tiff does not support {} channels with photometric code {}",
                    n, layout.photometric
                )))
            }
        }
        .map_err(|e| TiffError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

        println!("wrote IFD #{} of {} to {}", self.ifd_index, self.src.display(), self.dst.display());
        Ok(())
    }
}
