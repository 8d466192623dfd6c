//! Geometric index of tiles/strips for an IFD
//!
//! `TileMap` derives, from an `IFD`'s offset/byte-count tags, the per-tile
//! `(plane, x, y) -> (offset, length)` addressing that the Reader and
//! Writer use to locate encoded tile bytes. Stripped layouts are modeled as
//! tiles whose width equals the image width and whose height equals
//! RowsPerStrip, so tiled and stripped images share one addressing scheme
//! instead of two.

use crate::tiff::constants::tags;
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;

/// A rectangular region of an image, in pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Region { x, y, width, height }
    }

    pub fn end_x(&self) -> u32 {
        self.x + self.width
    }

    pub fn end_y(&self) -> u32 {
        self.y + self.height
    }

    fn intersects(&self, other: &Region) -> bool {
        self.x < other.end_x() && other.x < self.end_x() && self.y < other.end_y() && other.y < self.end_y()
    }
}

/// One addressable chunk of image data: a tile if the IFD is tiled, or a
/// strip treated as a tile whose width is the full image width.
#[derive(Debug, Clone, Copy)]
pub struct TileLocation {
    pub plane: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    /// File offset of the encoded chunk, `None` if the chunk has never been
    /// written (a writer may leave tiles unwritten until their content is
    /// available).
    pub offset: Option<u64>,
    pub byte_count: Option<u64>,
    /// Actual pixel width/height of this chunk: equal to the nominal tile
    /// geometry except for edge tiles/the last strip, which are clipped to
    /// the image boundary. The writer stores the *actual* last-strip
    /// height, not the nominal RowsPerStrip.
    pub width: u32,
    pub height: u32,
}

impl TileLocation {
    /// This tile's pixel rectangle. `nominal_tile_width`/`nominal_tile_height`
    /// must be the map's uniform tile geometry (`TileMap::tile_width`/
    /// `tile_height`), not this tile's own (possibly-clipped) dimensions --
    /// an edge tile's origin is still `index * nominal`, only its extent is
    /// clipped.
    pub fn region(&self, nominal_tile_width: u32, nominal_tile_height: u32) -> Region {
        Region::new(self.tile_x * nominal_tile_width, self.tile_y * nominal_tile_height, self.width, self.height)
    }
}

/// Geometric index over an IFD's tiles or strips.
pub struct TileMap {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_across: u32,
    pub tiles_down: u32,
    pub planes: u32,
    tiles: Vec<TileLocation>,
}

impl TileMap {
    /// Builds the tile/strip index for an IFD. `planes` is 1 for chunky
    /// planar configuration, or SamplesPerPixel for planar configuration 2
    /// (each sample plane addressed independently).
    pub fn from_ifd(ifd: &IFD) -> TiffResult<Self> {
        let image_width = ifd
            .get_tag_value(tags::IMAGE_WIDTH)
            .ok_or_else(|| TiffError::MalformedIFD("missing ImageWidth".to_string()))? as u32;
        let image_height = ifd
            .get_tag_value(tags::IMAGE_LENGTH)
            .ok_or_else(|| TiffError::MalformedIFD("missing ImageLength".to_string()))? as u32;

        let is_tiled = ifd.has_tag(tags::TILE_WIDTH);
        let planar_config = ifd.get_tag_value(tags::PLANAR_CONFIGURATION).unwrap_or(1);
        let samples_per_pixel = ifd.get_samples_per_pixel() as u32;
        let planes = if planar_config == 2 { samples_per_pixel.max(1) } else { 1 };

        let (tile_width, tile_height) = if is_tiled {
            let w = ifd
                .get_tag_value(tags::TILE_WIDTH)
                .ok_or_else(|| TiffError::MalformedIFD("missing TileWidth".to_string()))? as u32;
            let h = ifd
                .get_tag_value(tags::TILE_LENGTH)
                .ok_or_else(|| TiffError::MalformedIFD("missing TileLength".to_string()))? as u32;
            (w, h)
        } else {
            let rows_per_strip = ifd.get_tag_value(tags::ROWS_PER_STRIP).unwrap_or(image_height as u64) as u32;
            (image_width, rows_per_strip.max(1))
        };

        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::MalformedIFD("tile/strip dimensions must be positive".to_string()));
        }

        let tiles_across = div_ceil(image_width, tile_width);
        let tiles_down = div_ceil(image_height, tile_height);

        let (offset_tag, count_tag) = if is_tiled {
            (tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
        } else {
            (tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };

        let offsets = read_u64_array(ifd, offset_tag);
        let byte_counts = read_u64_array(ifd, count_tag);

        let expected = (planes * tiles_across * tiles_down) as usize;
        if !offsets.is_empty() && offsets.len() != expected {
            return Err(TiffError::MalformedIFD(format!(
                "{} entries ({}) does not match plane/tile grid size ({})",
                if is_tiled { "TileOffsets" } else { "StripOffsets" },
                offsets.len(),
                expected
            )));
        }
        if !byte_counts.is_empty() && byte_counts.len() != offsets.len() {
            return Err(TiffError::MalformedIFD(
                "offsets and byte-count arrays must have identical length".to_string(),
            ));
        }

        let mut tiles = Vec::with_capacity(expected);
        let mut index = 0usize;
        for plane in 0..planes {
            for ty in 0..tiles_down {
                for tx in 0..tiles_across {
                    let w = clipped(tile_width, tx, tiles_across, image_width);
                    let h = clipped(tile_height, ty, tiles_down, image_height);
                    let (offset, byte_count) = if index < offsets.len() {
                        (Some(offsets[index]), byte_counts.get(index).copied())
                    } else {
                        (None, None)
                    };
                    tiles.push(TileLocation {
                        plane,
                        tile_x: tx,
                        tile_y: ty,
                        offset,
                        byte_count,
                        width: w,
                        height: h,
                    });
                    index += 1;
                }
            }
        }

        Ok(TileMap {
            image_width,
            image_height,
            tile_width,
            tile_height,
            tiles_across,
            tiles_down,
            planes,
            tiles,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> &[TileLocation] {
        &self.tiles
    }

    pub fn tile_at(&self, plane: u32, tile_x: u32, tile_y: u32) -> Option<&TileLocation> {
        if tile_x >= self.tiles_across || tile_y >= self.tiles_down || plane >= self.planes {
            return None;
        }
        let index = (plane * self.tiles_down * self.tiles_across + tile_y * self.tiles_across + tile_x) as usize;
        self.tiles.get(index)
    }

    /// Tiles whose region overlaps `region`, for a single plane.
    pub fn tiles_intersecting(&self, plane: u32, region: Region) -> Vec<&TileLocation> {
        self.tiles
            .iter()
            .filter(|t| t.plane == plane && t.region(self.tile_width, self.tile_height).intersects(&region))
            .collect()
    }

    /// The pixel rectangle of a tile belonging to this map (see
    /// `TileLocation::region`'s note on nominal-vs-clipped geometry).
    pub fn tile_region(&self, tile: &TileLocation) -> Region {
        tile.region(self.tile_width, self.tile_height)
    }
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// The actual width/height of the tile at grid position `index` along an
/// axis of `count` tiles covering `total` pixels at `nominal` tile size: the
/// last tile along each axis is clipped to what remains.
fn clipped(nominal: u32, index: u32, count: u32, total: u32) -> u32 {
    if index + 1 == count {
        total - nominal * index
    } else {
        nominal
    }
}

fn read_u64_array(ifd: &IFD, tag: u16) -> Vec<u64> {
    match ifd.get_entry(tag).and_then(|e| e.typed_value()) {
        Some(v) => v.as_u64_vec().unwrap_or_default(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::ifd::{IFDEntry, IFDValue};

    fn entry(tag: u16, value: IFDValue) -> IFDEntry {
        IFDEntry::with_value(tag, 0, value)
    }

    fn tiled_ifd(width: u32, height: u32, tile_width: u32, tile_height: u32, offsets: Vec<u64>, byte_counts: Vec<u64>) -> IFD {
        let mut ifd = IFD::new(0, 0);
        ifd.add_entry(entry(tags::IMAGE_WIDTH, IFDValue::Long(vec![width as u64])));
        ifd.add_entry(entry(tags::IMAGE_LENGTH, IFDValue::Long(vec![height as u64])));
        ifd.add_entry(entry(tags::TILE_WIDTH, IFDValue::Long(vec![tile_width as u64])));
        ifd.add_entry(entry(tags::TILE_LENGTH, IFDValue::Long(vec![tile_height as u64])));
        ifd.add_entry(entry(tags::TILE_OFFSETS, IFDValue::Long(offsets)));
        ifd.add_entry(entry(tags::TILE_BYTE_COUNTS, IFDValue::Long(byte_counts)));
        ifd
    }

    fn stripped_ifd(width: u32, height: u32, rows_per_strip: u32, offsets: Vec<u64>, byte_counts: Vec<u64>) -> IFD {
        let mut ifd = IFD::new(0, 0);
        ifd.add_entry(entry(tags::IMAGE_WIDTH, IFDValue::Long(vec![width as u64])));
        ifd.add_entry(entry(tags::IMAGE_LENGTH, IFDValue::Long(vec![height as u64])));
        ifd.add_entry(entry(tags::ROWS_PER_STRIP, IFDValue::Long(vec![rows_per_strip as u64])));
        ifd.add_entry(entry(tags::STRIP_OFFSETS, IFDValue::Long(offsets)));
        ifd.add_entry(entry(tags::STRIP_BYTE_COUNTS, IFDValue::Long(byte_counts)));
        ifd
    }

    #[test]
    fn tiled_grid_clips_edge_tiles_to_image_bounds() {
        // 100x100 image, 64x64 tiles: a 2x2 grid with the right/bottom edge clipped.
        let ifd = tiled_ifd(100, 100, 64, 64, vec![0, 64, 128, 192], vec![64, 64, 64, 64]);
        let map = TileMap::from_ifd(&ifd).unwrap();

        assert_eq!(map.tiles_across, 2);
        assert_eq!(map.tiles_down, 2);
        assert_eq!(map.tile_count(), 4);

        let top_left = map.tile_at(0, 0, 0).unwrap();
        assert_eq!((top_left.width, top_left.height), (64, 64));

        let bottom_right = map.tile_at(0, 1, 1).unwrap();
        assert_eq!((bottom_right.width, bottom_right.height), (36, 36));
        // Origin is still grid-index * nominal tile size, only the extent is clipped.
        let region = map.tile_region(bottom_right);
        assert_eq!((region.x, region.y), (64, 64));
        assert_eq!((region.width, region.height), (36, 36));
    }

    #[test]
    fn stripped_layout_models_strips_as_full_width_tiles() {
        let ifd = stripped_ifd(200, 50, 20, vec![0, 1000, 2000], vec![1000, 1000, 1000]);
        let map = TileMap::from_ifd(&ifd).unwrap();

        assert_eq!(map.tile_width, 200);
        assert_eq!(map.tiles_across, 1);
        assert_eq!(map.tiles_down, 3);

        let last_strip = map.tile_at(0, 0, 2).unwrap();
        assert_eq!(last_strip.height, 10);
        assert_eq!(last_strip.width, 200);
    }

    #[test]
    fn missing_tile_offsets_yield_none_location() {
        let ifd = tiled_ifd(64, 64, 64, 64, Vec::new(), Vec::new());
        let map = TileMap::from_ifd(&ifd).unwrap();

        let tile = map.tile_at(0, 0, 0).unwrap();
        assert!(tile.offset.is_none());
        assert!(tile.byte_count.is_none());
    }

    #[test]
    fn mismatched_offset_count_is_malformed() {
        let ifd = tiled_ifd(100, 100, 64, 64, vec![0, 64, 128], vec![64, 64, 64]);
        let err = TileMap::from_ifd(&ifd).unwrap_err();
        assert!(matches!(err, TiffError::MalformedIFD(_)));
    }

    #[test]
    fn tiles_intersecting_returns_only_overlapping_tiles_in_plane() {
        let ifd = tiled_ifd(128, 128, 64, 64, vec![0, 64, 128, 192], vec![64, 64, 64, 64]);
        let map = TileMap::from_ifd(&ifd).unwrap();

        let hits = map.tiles_intersecting(0, Region::new(70, 0, 10, 10));
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].tile_x, hits[0].tile_y), (1, 0));
    }

    #[test]
    fn tile_at_out_of_range_returns_none() {
        let ifd = tiled_ifd(64, 64, 64, 64, vec![0], vec![64]);
        let map = TileMap::from_ifd(&ifd).unwrap();
        assert!(map.tile_at(0, 5, 0).is_none());
        assert!(map.tile_at(1, 0, 0).is_none());
    }
}
