//! Copies a range of IFDs from a source `Reader` to a destination `Writer`,
//! walking each IFD's tiles and either copying encoded bytes straight
//! through or repacking them when source and destination compression
//! differ. Progress is reported through a plain callback rather than
//! owning any progress bars directly — the CLI layer decides how to
//! render progress.

use crate::reader::Reader;
use crate::sample_packing::ImageLayout;
use crate::tiff::constants::tags;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFDEntry;
use crate::tiff::tile_map::TileMap;
use crate::writer::Writer;

/// `(image_index, image_count, tile_index, tile_count, last_tile)`, called
/// once per tile copied.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize, usize, usize, bool) + 'a;

/// Tags the destination IFD already gets from `ImageLayout`/tile geometry;
/// copying them again as "extra" tags would just duplicate what
/// `Writer::build_entries` derives itself.
const LAYOUT_DERIVED_TAGS: &[u16] = &[
    tags::IMAGE_WIDTH,
    tags::IMAGE_LENGTH,
    tags::BITS_PER_SAMPLE,
    tags::COMPRESSION,
    tags::PHOTOMETRIC_INTERPRETATION,
    tags::SAMPLES_PER_PIXEL,
    tags::PLANAR_CONFIGURATION,
    tags::PREDICTOR,
    tags::SAMPLE_FORMAT,
    tags::FILL_ORDER,
    tags::YCBCR_SUBSAMPLING,
    tags::YCBCR_COEFFICIENTS,
    tags::REFERENCE_BLACK_WHITE,
    tags::TILE_WIDTH,
    tags::TILE_LENGTH,
    tags::TILE_OFFSETS,
    tags::TILE_BYTE_COUNTS,
    tags::ROWS_PER_STRIP,
    tags::STRIP_OFFSETS,
    tags::STRIP_BYTE_COUNTS,
];

pub struct CopierOptions {
    /// Recompress to this code; `None` keeps each source IFD's own
    /// compression (enabling the direct-copy fast path for every tile).
    pub target_compression: Option<u64>,
    /// `0` keeps each source IFD's own predictor.
    pub predictor: u16,
    pub missing_tiles_allowed: bool,
}

impl Default for CopierOptions {
    fn default() -> Self {
        CopierOptions { target_compression: None, predictor: 0, missing_tiles_allowed: false }
    }
}

pub struct Copier;

impl Copier {
    /// Copies `ifd_count` IFDs starting at `ifd_start` from `reader` into
    /// `writer`, one `new_map`/`complete_writing` cycle per IFD.
    pub fn copy_range(
        reader: &mut Reader,
        writer: &mut Writer,
        ifd_start: usize,
        ifd_count: usize,
        options: &CopierOptions,
        mut progress: Option<&mut ProgressCallback>,
    ) -> TiffResult<()> {
        for i in 0..ifd_count {
            let ifd_index = ifd_start + i;
            Self::copy_one(reader, writer, ifd_index, i, ifd_count, options, progress.as_deref_mut())?;
        }
        Ok(())
    }

    fn copy_one(
        reader: &mut Reader,
        writer: &mut Writer,
        ifd_index: usize,
        image_index: usize,
        image_count: usize,
        options: &CopierOptions,
        mut progress: Option<&mut ProgressCallback>,
    ) -> TiffResult<()> {
        let ifd = reader
            .all_ifds()
            .get(ifd_index)
            .ok_or_else(|| TiffError::GenericError(format!("no source IFD #{}", ifd_index)))?
            .clone();

        let source_layout = ImageLayout::from_ifd(&ifd)?;
        let source_map = TileMap::from_ifd(&ifd)?;
        let is_tiled = ifd.has_tag(tags::TILE_WIDTH);

        let target_compression = options.target_compression.unwrap_or(source_layout.compression);
        let codec_unchanged = target_compression == source_layout.compression;

        let mut dest_layout = source_layout.clone();
        dest_layout.compression = target_compression;
        if options.predictor != 0 {
            dest_layout.predictor = options.predictor;
        }
        let predictor_unchanged = dest_layout.predictor == source_layout.predictor;

        writer.new_map(dest_layout.clone(), source_map.tile_width, source_map.tile_height, is_tiled)?;

        let tile_count = source_map.tile_count();
        let channels = dest_layout.samples_per_pixel as usize;
        for (tile_index, tile) in source_map.tiles().iter().enumerate() {
            let direct_copy = codec_unchanged && predictor_unchanged;
            let source_missing = tile.offset.is_none() || tile.byte_count == Some(0);

            if source_missing {
                if !options.missing_tiles_allowed {
                    return Err(TiffError::CorruptedData(format!(
                        "source tile ({},{},{}) is missing and missing tiles are not allowed",
                        tile.plane, tile.tile_x, tile.tile_y
                    )));
                }
                let filler = vec![0u8; tile.width as usize * tile.height as usize * channels];
                writer.write_tile(tile.plane, tile.tile_x, tile.tile_y, &filler)?;
            } else if direct_copy {
                match reader.read_tile_encoded(ifd_index, tile.plane, tile.tile_x, tile.tile_y)? {
                    Some(encoded) => writer.write_tile_encoded(tile.plane, tile.tile_x, tile.tile_y, &encoded)?,
                    None => {
                        let pixels = reader.read_tile(ifd_index, tile.plane, tile.tile_x, tile.tile_y)?;
                        writer.write_tile(tile.plane, tile.tile_x, tile.tile_y, &pixels)?;
                    }
                }
            } else {
                let pixels = reader.read_tile(ifd_index, tile.plane, tile.tile_x, tile.tile_y)?;
                writer.write_tile(tile.plane, tile.tile_x, tile.tile_y, &pixels)?;
            }

            if let Some(cb) = progress.as_deref_mut() {
                let last_tile = tile_index + 1 == tile_count;
                cb(image_index, image_count, tile_index, tile_count, last_tile);
            }
        }

        for entry in ifd.get_entries() {
            if LAYOUT_DERIVED_TAGS.contains(&entry.tag) {
                continue;
            }
            // Undesirable tags on copy: JPEGTables and ICCProfile
            // only make sense alongside the codec/profile they were built
            // for, so drop them whenever compression actually changes.
            if !codec_unchanged && (entry.tag == tags::JPEG_TABLES || entry.tag == tags::ICC_PROFILE) {
                continue;
            }
            writer.set_extra_tag(clone_preserving_entry(entry))?;
        }

        writer.complete_writing()?;
        Ok(())
    }
}

fn clone_preserving_entry(entry: &IFDEntry) -> IFDEntry {
    match entry.typed_value() {
        Some(value) => IFDEntry::with_value(entry.tag, entry.value_offset, value.clone()),
        None => entry.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::byte_order::ByteOrder;
    use crate::io::stream::ByteStream;
    use crate::reader::ReaderOptions;
    use crate::sample_packing::{PlanarConfig, SampleFormat};
    use crate::tiff::constants::photometric;
    use crate::writer::WriterOptions;

    fn build_source_tiff() -> Vec<u8> {
        let stream = ByteStream::from_memory(Vec::new());
        let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
        let layout = ImageLayout {
            width: 4,
            height: 2,
            samples_per_pixel: 1,
            bits_per_sample: vec![8],
            sample_format: SampleFormat::Unsigned,
            planar_config: PlanarConfig::Chunky,
            photometric: photometric::BLACK_IS_ZERO,
            compression: 1,
            predictor: crate::tiff::constants::predictor::NONE,
            fill_order: 1,
            ycbcr: None,
        };
        writer.new_map(layout, 4, 2, true).unwrap();
        writer.write_tile(0, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        writer.complete_writing().unwrap();
        let stream = writer.finish().unwrap();
        stream.into_memory().unwrap()
    }

    #[test]
    fn copies_a_single_ifd_with_matching_pixel_content() {
        let source_bytes = build_source_tiff();
        let mut reader = Reader::open(ByteStream::from_memory(source_bytes), ReaderOptions::default()).unwrap();

        let mut dest_writer = {
            let mut opts = WriterOptions::default();
            opts.byte_order = ByteOrder::LittleEndian;
            Writer::create(ByteStream::from_memory(Vec::new()), opts).unwrap()
        };

        let mut calls = Vec::new();
        Copier::copy_range(
            &mut reader,
            &mut dest_writer,
            0,
            1,
            &CopierOptions::default(),
            Some(&mut |img, imgs, tile, tiles, last| calls.push((img, imgs, tile, tiles, last))),
        )
        .unwrap();

        assert_eq!(calls, vec![(0, 1, 0, 1, true)]);

        let dest_bytes = dest_writer.finish().unwrap().into_memory().unwrap();
        let mut dest_reader = Reader::open(ByteStream::from_memory(dest_bytes), ReaderOptions::default()).unwrap();
        assert_eq!(dest_reader.read_tile(0, 0, 0, 0).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
