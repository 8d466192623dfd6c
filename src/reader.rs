//! Random-access TIFF/BigTIFF reader: IFD enumeration, tile decode
//! orchestration, optional tile cache, region assembly.
//!
//! Built on `ByteStream`/`IFDCodec`/`TileMap` rather than per-layout
//! readers, so tiled and stripped images share one code path. The LRU
//! tile cache uses the `lru` crate.

use std::collections::HashMap;

use log::{debug, trace, warn};
use lru::LruCache;

use crate::compression::CodecRegistry;
use crate::io::byte_order::ByteOrder;
use crate::io::stream::ByteStream;
use crate::sample_packing::{self, ImageLayout};
use crate::tiff::constants::{compression, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;
use crate::tiff::ifd_codec::IFDCodec;
use crate::tiff::tile_map::{Region, TileMap};

/// Header-validation strictness for `Reader::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// A non-matching magic/version is a fatal `NotTiff` error.
    Strict,
    /// A non-matching magic/version is recorded (`Reader::open_error`)
    /// rather than propagated; the reader opens with an empty IFD chain.
    AllowNonTiff,
    /// Skip header validation: assume classic little-endian, first IFD at
    /// byte 8, and proceed even if the magic doesn't match.
    NoChecks,
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub open_mode: OpenMode,
    /// Whether a tile with a zero offset/byte-count yields filler bytes
    /// (`true`) or `CorruptedData` (`false`).
    pub missing_tiles_allowed: bool,
    pub byte_filler: u8,
    /// Tile cache capacity in bytes. `None` disables caching.
    pub cache_bytes: Option<usize>,
    /// Apply WhiteIsZero/CMYK/TransparencyMask brightness inversion during
    /// decode.
    pub correct_inverted_brightness: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            open_mode: OpenMode::Strict,
            missing_tiles_allowed: false,
            byte_filler: 0,
            cache_bytes: Some(64 * 1024 * 1024),
            correct_inverted_brightness: true,
        }
    }
}

/// A simple byte-bounded LRU cache keyed by `(ifd_index, tile_index)`.
/// Clones are handed out on `get`: cached tiles are never the live buffer
///.
struct TileCache {
    entries: LruCache<(usize, usize), Vec<u8>>,
    max_bytes: usize,
    current_bytes: usize,
}

impl TileCache {
    fn new(max_bytes: usize) -> Self {
        TileCache {
            entries: LruCache::unbounded(),
            max_bytes,
            current_bytes: 0,
        }
    }

    fn get(&mut self, key: (usize, usize)) -> Option<Vec<u8>> {
        self.entries.get(&key).cloned()
    }

    fn put(&mut self, key: (usize, usize), data: Vec<u8>) {
        let size = data.len();
        if let Some(old) = self.entries.put(key, data) {
            self.current_bytes = self.current_bytes.saturating_sub(old.len());
        }
        self.current_bytes += size;
        while self.current_bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.current_bytes = self.current_bytes.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }
}

/// Reader for TIFF/BigTIFF files: owns its `ByteStream` exclusively in read
/// mode.
pub struct Reader {
    stream: ByteStream,
    is_big_tiff: bool,
    ifds: Vec<IFD>,
    options: ReaderOptions,
    registry: CodecRegistry,
    tile_maps: HashMap<usize, TileMap>,
    cache: Option<TileCache>,
    /// Set by `AllowNonTiff` when the header didn't validate; surfaced via
    /// `open_error()` instead of failing `open`.
    open_error: Option<String>,
    /// First fatal error's message, once poisoned; every subsequent
    /// operation returns a `GenericError` wrapping it. `TiffError` isn't
    /// `Clone` (it wraps `io::Error`), so the
    /// rendered message is what's retained rather than the original value.
    poisoned: Option<String>,
}

impl Reader {
    /// Opens `stream` with the default codec registry (None/Deflate/PackBits).
    pub fn open(stream: ByteStream, options: ReaderOptions) -> TiffResult<Self> {
        Self::open_with_registry(stream, options, CodecRegistry::new())
    }

    /// Opens `stream` with a caller-supplied registry, letting a caller
    /// inject codecs before any tile is read.
    pub fn open_with_registry(mut stream: ByteStream, options: ReaderOptions, registry: CodecRegistry) -> TiffResult<Self> {
        let (is_big_tiff, first_ifd_offset, open_error) = match options.open_mode {
            OpenMode::Strict => {
                let header = IFDCodec::parse_header(&mut stream)?;
                (header.is_big_tiff, header.first_ifd_offset, None)
            }
            OpenMode::AllowNonTiff => match IFDCodec::parse_header(&mut stream) {
                Ok(header) => (header.is_big_tiff, header.first_ifd_offset, None),
                Err(e) => {
                    warn!("header validation failed in AllowNonTiff mode: {}", e);
                    (false, 0, Some(e.to_string()))
                }
            },
            OpenMode::NoChecks => match IFDCodec::parse_header(&mut stream) {
                Ok(header) => (header.is_big_tiff, header.first_ifd_offset, None),
                Err(_) => {
                    debug!("NoChecks mode: header didn't validate, assuming classic little-endian at offset 8");
                    stream.set_byte_order(crate::io::byte_order::ByteOrder::LittleEndian);
                    (false, 8, None)
                }
            },
        };

        let ifds = if first_ifd_offset == 0 {
            Vec::new()
        } else {
            IFDCodec::parse_chain(&mut stream, first_ifd_offset, is_big_tiff)?
        };

        let cache = options.cache_bytes.map(TileCache::new);

        Ok(Reader {
            stream,
            is_big_tiff,
            ifds,
            options,
            registry,
            tile_maps: HashMap::new(),
            cache,
            open_error,
            poisoned: None,
        })
    }

    /// The header-validation failure recorded in `AllowNonTiff` mode, if any.
    pub fn open_error(&self) -> Option<&str> {
        self.open_error.as_deref()
    }

    pub fn is_big_tiff(&self) -> bool {
        self.is_big_tiff
    }

    /// All parsed IFDs, in chain order.
    pub fn all_ifds(&self) -> &[IFD] {
        &self.ifds
    }

    fn check_poisoned(&self) -> TiffResult<()> {
        match &self.poisoned {
            Some(msg) => Err(TiffError::GenericError(format!("reader poisoned by earlier error: {}", msg))),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: TiffError) -> TiffError {
        if self.poisoned.is_none() {
            self.poisoned = Some(err.to_string());
        }
        err
    }

    /// Builds (or returns the cached) `TileMap` for `ifd_index`.
    pub fn map(&mut self, ifd_index: usize) -> TiffResult<&TileMap> {
        self.check_poisoned()?;
        if !self.tile_maps.contains_key(&ifd_index) {
            let ifd = self.ifds.get(ifd_index).ok_or_else(|| TiffError::GenericError(format!("no IFD #{}", ifd_index)))?;
            let map = TileMap::from_ifd(ifd).map_err(|e| self.poison(e))?;
            self.tile_maps.insert(ifd_index, map);
        }
        Ok(&self.tile_maps[&ifd_index])
    }

    /// Decodes one tile: fetch encoded bytes, decode via the codec chosen
    /// from the Compression tag, splice JPEGTables for JPEG-family tiles,
    /// then run the sample-packing pipeline.
    pub fn read_tile(&mut self, ifd_index: usize, plane: u32, tile_x: u32, tile_y: u32) -> TiffResult<Vec<u8>> {
        self.check_poisoned()?;

        let layout = {
            let ifd = self.ifds.get(ifd_index).ok_or_else(|| TiffError::GenericError(format!("no IFD #{}", ifd_index)))?;
            ImageLayout::from_ifd(ifd)?
        };
        let jpeg_tables: Option<Vec<u8>> = {
            let ifd = &self.ifds[ifd_index];
            ifd.get_entry(tags::JPEG_TABLES)
                .and_then(|e| e.typed_value())
                .and_then(|v| v.as_bytes())
                .map(|b| b.to_vec())
        };
        let compression_code = layout.compression;

        let (tiles_across, tiles_down, location) = {
            let map = self.map(ifd_index)?;
            let loc = *map
                .tile_at(plane, tile_x, tile_y)
                .ok_or_else(|| TiffError::GenericError(format!("no tile at ({},{},{})", plane, tile_x, tile_y)))?;
            (map.tiles_across, map.tiles_down, loc)
        };
        let tile_index = (plane * tiles_down * tiles_across + tile_y * tiles_across + tile_x) as usize;

        if let Some(cache) = &mut self.cache {
            if let Some(hit) = cache.get((ifd_index, tile_index)) {
                trace!("tile cache hit: ifd {} tile {}", ifd_index, tile_index);
                return Ok(hit);
            }
        }

        let nominal_bytes = location.width as usize * location.height as usize * layout.samples_per_pixel as usize
            * (layout.uniform_bit_depth().unwrap_or(8).max(8) / 8) as usize;

        let offset_ok = matches!(location.offset, Some(o) if o != 0);
        let count_ok = matches!(location.byte_count, Some(c) if c != 0);

        let (offset, byte_count) = if offset_ok && count_ok {
            (location.offset.unwrap(), location.byte_count.unwrap())
        } else {
            if self.options.missing_tiles_allowed {
                let filler = vec![self.options.byte_filler; nominal_bytes];
                if let Some(cache) = &mut self.cache {
                    cache.put((ifd_index, tile_index), filler.clone());
                }
                return Ok(filler);
            }
            return Err(self.poison(TiffError::CorruptedData(format!(
                "tile ({},{},{}) has no offset/byte-count and missing tiles are not allowed",
                plane, tile_x, tile_y
            ))));
        };

        let mut encoded = self.stream.read_at(offset, byte_count as usize)?;

        if compression_code as u16 == compression::JPEG_OLD || compression_code as u16 == compression::JPEG {
            if let Some(tables) = &jpeg_tables {
                encoded = splice_jpeg_tables(tables, &encoded);
            }
        }

        let decoded = self.registry.decompress(compression_code, &encoded).map_err(|e| self.poison(e))?;

        let is_jpeg_family = matches!(compression_code as u16, compression::JPEG_OLD | compression::JPEG);
        if is_jpeg_family && decoded.len() > nominal_bytes {
            return Err(self.poison(TiffError::CorruptedData(format!(
                "decoded tile ({} bytes) exceeds nominal size ({} bytes) under a JPEG-family codec",
                decoded.len(),
                nominal_bytes
            ))));
        }

        let little_endian = self.stream.byte_order() == ByteOrder::LittleEndian;
        let mut unpacked = sample_packing::unpack_tile(&decoded, &layout, location.width, location.height, little_endian)?;
        if !self.options.correct_inverted_brightness && layout.requires_inversion() && layout.uniform_bit_depth() == Some(8) {
            // Undo the 8-bit inversion unpack_tile always applies, when the
            // caller asked for raw (uncorrected) samples. Only 8-bit uniform
            // layouts are inverted by unpack_tile in the first place.
            for v in unpacked.iter_mut() {
                *v = 255u8.wrapping_sub(*v);
            }
        }

        if let Some(cache) = &mut self.cache {
            cache.put((ifd_index, tile_index), unpacked.clone());
        }

        Ok(unpacked)
    }

    /// Fetches a tile's encoded bytes as stored on disk, with no decode or
    /// sample-packing pass — the Copier's direct-copy path uses this to
    /// carry tiles across unchanged when the destination keeps the same
    /// compression code.
    pub fn read_tile_encoded(&mut self, ifd_index: usize, plane: u32, tile_x: u32, tile_y: u32) -> TiffResult<Option<Vec<u8>>> {
        self.check_poisoned()?;
        let location = {
            let map = self.map(ifd_index)?;
            *map.tile_at(plane, tile_x, tile_y)
                .ok_or_else(|| TiffError::GenericError(format!("no tile at ({},{},{})", plane, tile_x, tile_y)))?
        };
        let offset_ok = matches!(location.offset, Some(o) if o != 0);
        let count_ok = matches!(location.byte_count, Some(c) if c != 0);
        if !(offset_ok && count_ok) {
            return Ok(None);
        }
        let encoded = self.stream.read_at(location.offset.unwrap(), location.byte_count.unwrap() as usize)?;
        Ok(Some(encoded))
    }

    /// Assembles `(x, y, w, h)` out of whichever tiles intersect it,
    /// filling any uncovered area with `byte_filler`.
    pub fn read_region(&mut self, ifd_index: usize, region: Region) -> TiffResult<Vec<u8>> {
        self.check_poisoned()?;
        let layout = {
            let ifd = self.ifds.get(ifd_index).ok_or_else(|| TiffError::GenericError(format!("no IFD #{}", ifd_index)))?;
            ImageLayout::from_ifd(ifd)?
        };
        let channels = layout.samples_per_pixel as usize;

        let mut out = vec![self.options.byte_filler; region.width as usize * region.height as usize * channels];

        let plane = 0u32;
        let (nominal_tile_width, nominal_tile_height, tile_locations) = {
            let map = self.map(ifd_index)?;
            let locations: Vec<_> = map.tiles_intersecting(plane, region).into_iter().copied().collect();
            (map.tile_width, map.tile_height, locations)
        };

        for tile in tile_locations {
            let decoded = self.read_tile(ifd_index, tile.plane, tile.tile_x, tile.tile_y)?;
            let tile_region = tile.region(nominal_tile_width, nominal_tile_height);

            let overlap_x0 = region.x.max(tile_region.x);
            let overlap_y0 = region.y.max(tile_region.y);
            let overlap_x1 = region.end_x().min(tile_region.end_x());
            let overlap_y1 = region.end_y().min(tile_region.end_y());

            for y in overlap_y0..overlap_y1 {
                let tile_row = (y - tile_region.y) as usize;
                let out_row = (y - region.y) as usize;
                for x in overlap_x0..overlap_x1 {
                    let tile_col = (x - tile_region.x) as usize;
                    let out_col = (x - region.x) as usize;
                    let src_idx = (tile_row * tile.width as usize + tile_col) * channels;
                    let dst_idx = (out_row * region.width as usize + out_col) * channels;
                    if src_idx + channels <= decoded.len() && dst_idx + channels <= out.len() {
                        out[dst_idx..dst_idx + channels].copy_from_slice(&decoded[src_idx..src_idx + channels]);
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Splices a stored JPEGTables "abbreviated" header into a JPEG tile's
/// stream between the SOI marker and the rest of the scan data.
/// `tables` already omits SOI/EOI; its payload is inserted
/// right after the 2-byte SOI marker of `tile_data`.
fn splice_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Vec<u8> {
    if tile_data.len() < 2 {
        return tile_data.to_vec();
    }
    let mut out = Vec::with_capacity(tile_data.len() + tables.len());
    out.extend_from_slice(&tile_data[0..2]);
    out.extend_from_slice(tables);
    out.extend_from_slice(&tile_data[2..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::byte_order::ByteOrder;
    use crate::tiff::constants::{header as header_const, photometric};
    use crate::tiff::ifd::{IFDEntry, IFDValue};

    /// Builds a minimal classic little-endian TIFF with one 4x2 uncompressed
    /// 8-bit grayscale strip image in memory.
    fn build_single_strip_tiff() -> Vec<u8> {
        let pixels: Vec<u8> = vec![10, 20, 30, 40, 50, 60, 70, 80];

        let mut stream = ByteStream::from_memory(Vec::new());
        stream.set_byte_order(ByteOrder::LittleEndian);
        stream.seek(0).unwrap();
        stream.write_bytes(b"II").unwrap();
        stream.write_u16(header_const::TIFF_VERSION).unwrap();
        stream.write_u32(0).unwrap(); // first-IFD offset placeholder

        let strip_offset = stream.position().unwrap();
        stream.write_bytes(&pixels).unwrap();

        let entries = vec![
            IFDEntry::with_value(tags::IMAGE_WIDTH, 0, IFDValue::Long(vec![4])),
            IFDEntry::with_value(tags::IMAGE_LENGTH, 0, IFDValue::Long(vec![2])),
            IFDEntry::with_value(tags::BITS_PER_SAMPLE, 0, IFDValue::Short(vec![8])),
            IFDEntry::with_value(tags::COMPRESSION, 0, IFDValue::Short(vec![compression::NONE])),
            IFDEntry::with_value(tags::PHOTOMETRIC_INTERPRETATION, 0, IFDValue::Short(vec![photometric::BLACK_IS_ZERO])),
            IFDEntry::with_value(tags::STRIP_OFFSETS, 0, IFDValue::Long(vec![strip_offset as u32])),
            IFDEntry::with_value(tags::SAMPLES_PER_PIXEL, 0, IFDValue::Short(vec![1])),
            IFDEntry::with_value(tags::ROWS_PER_STRIP, 0, IFDValue::Long(vec![2])),
            IFDEntry::with_value(tags::STRIP_BYTE_COUNTS, 0, IFDValue::Long(vec![pixels.len() as u32])),
        ];

        let (ifd_offset, _next_ptr) = IFDCodec::write_ifd(&mut stream, &entries, false).unwrap();
        IFDCodec::patch_pointer(&mut stream, 4, ifd_offset, false).unwrap();

        stream.into_memory().unwrap()
    }

    #[test]
    fn opens_and_reads_single_tile() {
        let bytes = build_single_strip_tiff();
        let stream = ByteStream::from_memory(bytes);
        let mut reader = Reader::open(stream, ReaderOptions::default()).unwrap();
        assert_eq!(reader.all_ifds().len(), 1);

        let map = reader.map(0).unwrap();
        assert_eq!(map.tile_count(), 1);

        let tile = reader.read_tile(0, 0, 0, 0).unwrap();
        assert_eq!(tile, vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn missing_tile_policy_controls_filler_vs_error() {
        let mut entries_stream = ByteStream::from_memory(Vec::new());
        entries_stream.set_byte_order(ByteOrder::LittleEndian);
        entries_stream.seek(0).unwrap();
        entries_stream.write_bytes(b"II").unwrap();
        entries_stream.write_u16(header_const::TIFF_VERSION).unwrap();
        entries_stream.write_u32(0).unwrap();

        let entries = vec![
            IFDEntry::with_value(tags::IMAGE_WIDTH, 0, IFDValue::Long(vec![2])),
            IFDEntry::with_value(tags::IMAGE_LENGTH, 0, IFDValue::Long(vec![2])),
            IFDEntry::with_value(tags::BITS_PER_SAMPLE, 0, IFDValue::Short(vec![8])),
            IFDEntry::with_value(tags::COMPRESSION, 0, IFDValue::Short(vec![compression::NONE])),
            IFDEntry::with_value(tags::PHOTOMETRIC_INTERPRETATION, 0, IFDValue::Short(vec![photometric::BLACK_IS_ZERO])),
            IFDEntry::with_value(tags::STRIP_OFFSETS, 0, IFDValue::Long(vec![0])),
            IFDEntry::with_value(tags::SAMPLES_PER_PIXEL, 0, IFDValue::Short(vec![1])),
            IFDEntry::with_value(tags::ROWS_PER_STRIP, 0, IFDValue::Long(vec![2])),
            IFDEntry::with_value(tags::STRIP_BYTE_COUNTS, 0, IFDValue::Long(vec![0])),
        ];
        let (ifd_offset, _) = IFDCodec::write_ifd(&mut entries_stream, &entries, false).unwrap();
        IFDCodec::patch_pointer(&mut entries_stream, 4, ifd_offset, false).unwrap();
        let bytes = entries_stream.into_memory().unwrap();

        let mut disallowed = Reader::open(ByteStream::from_memory(bytes.clone()), ReaderOptions::default()).unwrap();
        assert!(disallowed.read_tile(0, 0, 0, 0).is_err());

        let mut options = ReaderOptions::default();
        options.missing_tiles_allowed = true;
        options.byte_filler = 9;
        let mut allowed = Reader::open(ByteStream::from_memory(bytes), options).unwrap();
        let filler = allowed.read_tile(0, 0, 0, 0).unwrap();
        assert!(filler.iter().all(|&b| b == 9));
    }
}
