//! Incremental TIFF/BigTIFF writer.
//!
//! Builds one IFD's worth of tiles at a time, writing each tile's encoded
//! bytes to the stream as soon as it is packed, rather than buffering a
//! whole image in memory. Header/IFD/external-data placement uses
//! `write_utils::get_unique_sorted_entries` to sort and de-duplicate tags
//! before serializing. The create/open/map/write_tile/complete_writing
//! cycle is incremental rather than a one-shot whole-file pass, which is
//! what the partial-tile and append scenarios need.

use log::{debug, trace};

use crate::compression::CodecRegistry;
use crate::io::byte_order::ByteOrder;
use crate::io::stream::ByteStream;
use crate::sample_packing::{self, ImageLayout, PlanarConfig};
use crate::tiff::constants::{header, planar_config, predictor as predictor_tag, sample_format, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::{IFDEntry, IFDValue, IFD};
use crate::tiff::ifd_codec::IFDCodec;
use crate::tiff::tile_map::{Region, TileMap};

/// Where a freshly-opened `Writer` sits in its state machine. Tracked
/// as a plain field rather than encoded in the type, in the same flat,
/// assert-then-proceed style the rest of this crate's builders use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Created,
    Appending,
    Rewriting,
    Mapped,
    Closed,
}

/// Callback invoked for a tile that was never explicitly written via
/// `write_tile`/`write_region`, to seed its content instead of plain
/// filler bytes. Takes the tile's grid position, returns unpacked pixel
/// bytes in the shape `sample_packing::pack_tile` expects: one byte per
/// sample, chunky, row-major, except for the widened 4-byte samples
/// `pack_tile` narrows (16-bit float, 24-bit float/integer).
pub type TileInitializer = Box<dyn Fn(u32, u32) -> Vec<u8> + Send + Sync>;

pub struct WriterOptions {
    pub big_tiff: bool,
    pub byte_order: ByteOrder,
    /// Compression code (tag 259) tiles are encoded with.
    pub compression: u64,
    /// Forwarded to codecs that support a quality knob; the built-in
    /// lossless codecs (None/Deflate/PackBits) ignore it.
    pub compression_quality: Option<u8>,
    pub predictor: u16,
    pub tile_initializer: Option<TileInitializer>,
    pub missing_tiles_allowed: bool,
    pub byte_filler: u8,
    /// Always append new/rewritten tile data at EOF rather than reusing a
    /// vacated in-place slot, trading file growth for never touching bytes
    /// a concurrent reader might still be using.
    pub always_write_to_file_end: bool,
    /// Clamp a few structurally-inconsistent values (RowsPerStrip taller
    /// than the image) while building the IFD, instead of writing them
    /// as-is.
    pub smart_format_correction: bool,
    /// Incoming pixel buffers passed to `write_region` are plane-separated
    /// and must be interleaved to chunky order before packing.
    pub auto_interleave_source: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            big_tiff: false,
            byte_order: ByteOrder::LittleEndian,
            compression: 1,
            compression_quality: None,
            predictor: predictor_tag::NONE,
            tile_initializer: None,
            missing_tiles_allowed: false,
            byte_filler: 0,
            always_write_to_file_end: false,
            smart_format_correction: true,
            auto_interleave_source: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TileSlot {
    offset: Option<u64>,
    byte_count: Option<u64>,
}

pub struct Writer {
    stream: ByteStream,
    registry: CodecRegistry,
    options: WriterOptions,
    is_big_tiff: bool,
    state: WriterState,
    /// Offset of the pointer that must be patched to point at the next IFD
    /// this writer produces: the header's first-IFD slot until the first
    /// `complete_writing`, then that IFD's own trailing next-pointer slot.
    next_pointer_slot: u64,

    // Rewrite-mode bookkeeping: the IFD chain as it existed on open, and
    // which entry `open_rewrite` targeted, so `new_map` can carry forward
    // tiles the caller never touches.
    existing_ifds: Vec<IFD>,
    rewrite_index: Option<usize>,

    // Current MAPPED-cycle state.
    layout: Option<ImageLayout>,
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
    tiles_across: u32,
    tiles_down: u32,
    planes: u32,
    is_tiled: bool,
    slots: Vec<TileSlot>,
    extra_entries: Vec<IFDEntry>,
}

impl Writer {
    /// UNOPENED -> CREATED: writes a fresh header with a zeroed first-IFD
    /// pointer, to be patched by the first `complete_writing`.
    pub fn create(mut stream: ByteStream, options: WriterOptions) -> TiffResult<Self> {
        let is_big_tiff = options.big_tiff;
        let next_pointer_slot = write_header(&mut stream, is_big_tiff, options.byte_order)?;
        Ok(Writer::new(stream, options, is_big_tiff, WriterState::Created, next_pointer_slot, Vec::new(), None))
    }

    /// UNOPENED -> APPENDING: parses the existing chain and positions the
    /// writer to append a new IFD after the last one.
    pub fn open_append(mut stream: ByteStream, options: WriterOptions) -> TiffResult<Self> {
        let header_info = IFDCodec::parse_header(&mut stream)?;
        let is_big_tiff = header_info.is_big_tiff;
        let ifds = IFDCodec::parse_chain(&mut stream, header_info.first_ifd_offset, is_big_tiff)?;
        let next_pointer_slot = match ifds.last() {
            Some(last) => last_ifd_next_pointer_slot(last, is_big_tiff),
            None => header_first_ifd_slot(is_big_tiff),
        };
        Ok(Writer::new(stream, options, is_big_tiff, WriterState::Appending, next_pointer_slot, ifds, None))
    }

    /// UNOPENED -> REWRITING: parses the existing chain and targets
    /// `ifd_index` for replacement. The pointer leading into that IFD
    /// (the header slot, or the previous IFD's next-pointer) is what gets
    /// patched once the replacement is written.
    pub fn open_rewrite(mut stream: ByteStream, options: WriterOptions, ifd_index: usize) -> TiffResult<Self> {
        let header_info = IFDCodec::parse_header(&mut stream)?;
        let is_big_tiff = header_info.is_big_tiff;
        let ifds = IFDCodec::parse_chain(&mut stream, header_info.first_ifd_offset, is_big_tiff)?;
        if ifd_index >= ifds.len() {
            return Err(TiffError::MalformedIFD(format!("no IFD #{} to rewrite ({} present)", ifd_index, ifds.len())));
        }
        let next_pointer_slot = if ifd_index == 0 {
            header_first_ifd_slot(is_big_tiff)
        } else {
            last_ifd_next_pointer_slot(&ifds[ifd_index - 1], is_big_tiff)
        };
        Ok(Writer::new(stream, options, is_big_tiff, WriterState::Rewriting, next_pointer_slot, ifds, Some(ifd_index)))
    }

    fn new(
        stream: ByteStream,
        options: WriterOptions,
        is_big_tiff: bool,
        state: WriterState,
        next_pointer_slot: u64,
        existing_ifds: Vec<IFD>,
        rewrite_index: Option<usize>,
    ) -> Self {
        Writer {
            stream,
            registry: CodecRegistry::new(),
            options,
            is_big_tiff,
            state,
            next_pointer_slot,
            existing_ifds,
            rewrite_index,
            layout: None,
            image_width: 0,
            image_height: 0,
            tile_width: 0,
            tile_height: 0,
            tiles_across: 0,
            tiles_down: 0,
            planes: 0,
            is_tiled: true,
            slots: Vec::new(),
            extra_entries: Vec::new(),
        }
    }

    /// Lets a caller register codecs beyond the built-in None/Deflate/
    /// PackBits set (mirrors `Reader::open_with_registry`).
    pub fn set_registry(&mut self, registry: CodecRegistry) {
        self.registry = registry;
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// CREATED/APPENDING/REWRITING/CLOSED -> MAPPED: begins a new image,
    /// described by `layout`, tiled (or stripped, when `tile_height` equals
    /// `image_height` and `is_tiled` is false) into `tile_width`x
    /// `tile_height` chunks. In REWRITING mode, tiles whose geometry
    /// matches the targeted IFD are pre-filled with that IFD's existing
    /// offsets, so a caller only has to call `write_tile`/`write_region`
    /// for the tiles it actually changed.
    pub fn new_map(&mut self, layout: ImageLayout, tile_width: u32, tile_height: u32, is_tiled: bool) -> TiffResult<()> {
        if !matches!(self.state, WriterState::Created | WriterState::Appending | WriterState::Rewriting | WriterState::Closed) {
            return Err(TiffError::MalformedIFD(format!("new_map is not valid from state {:?}", self.state)));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(TiffError::MalformedIFD("tile/strip dimensions must be positive".to_string()));
        }

        let tiles_across = div_ceil(layout.width, tile_width);
        let tiles_down = div_ceil(layout.height, tile_height);
        let planes = if layout.planar_config == PlanarConfig::Planar { layout.samples_per_pixel.max(1) } else { 1 };
        let total = (planes * tiles_across * tiles_down) as usize;

        let mut slots = vec![TileSlot::default(); total];
        if self.state == WriterState::Rewriting {
            if let Some(idx) = self.rewrite_index {
                if let Ok(old_map) = TileMap::from_ifd(&self.existing_ifds[idx]) {
                    if old_map.image_width == layout.width
                        && old_map.image_height == layout.height
                        && old_map.tile_width == tile_width
                        && old_map.tile_height == tile_height
                        && old_map.planes == planes
                    {
                        for (i, tile) in old_map.tiles().iter().enumerate() {
                            slots[i] = TileSlot { offset: tile.offset, byte_count: tile.byte_count };
                        }
                        debug!("new_map: carried forward {} existing tile slots from IFD #{}", old_map.tile_count(), idx);
                    }
                }
            }
        }

        self.layout = Some(layout);
        self.image_width = self.layout.as_ref().unwrap().width;
        self.image_height = self.layout.as_ref().unwrap().height;
        self.tile_width = tile_width;
        self.tile_height = tile_height;
        self.tiles_across = tiles_across;
        self.tiles_down = tiles_down;
        self.planes = planes;
        self.is_tiled = is_tiled;
        self.slots = slots;
        self.extra_entries = Vec::new();
        self.state = WriterState::Mapped;
        Ok(())
    }

    /// Adds a tag that isn't otherwise derived from `ImageLayout` (e.g.
    /// ImageDescription, ICCProfile) to the IFD the next `complete_writing`
    /// produces.
    pub fn set_extra_tag(&mut self, entry: IFDEntry) -> TiffResult<()> {
        if self.state != WriterState::Mapped {
            return Err(TiffError::MalformedIFD("set_extra_tag requires an open map".to_string()));
        }
        self.extra_entries.retain(|e| e.tag != entry.tag);
        self.extra_entries.push(entry);
        Ok(())
    }

    fn slot_index(&self, plane: u32, tile_x: u32, tile_y: u32) -> TiffResult<usize> {
        if plane >= self.planes || tile_x >= self.tiles_across || tile_y >= self.tiles_down {
            return Err(TiffError::MalformedIFD(format!("tile ({},{},{}) is outside the mapped grid", plane, tile_x, tile_y)));
        }
        Ok((plane * self.tiles_down * self.tiles_across + tile_y * self.tiles_across + tile_x) as usize)
    }

    fn clipped_tile_size(&self, tile_x: u32, tile_y: u32) -> (u32, u32) {
        let w = if tile_x + 1 == self.tiles_across { self.image_width - self.tile_width * tile_x } else { self.tile_width };
        let h = if tile_y + 1 == self.tiles_down { self.image_height - self.tile_height * tile_y } else { self.tile_height };
        (w, h)
    }

    /// Writes one tile's worth of unpacked pixels, in `sample_packing::unpack_tile`'s
    /// output shape (chunky-interleaved, row-major). Packs, encodes, and
    /// places the bytes immediately.
    pub fn write_tile(&mut self, plane: u32, tile_x: u32, tile_y: u32, pixels: &[u8]) -> TiffResult<()> {
        if self.state != WriterState::Mapped {
            return Err(TiffError::MalformedIFD("write_tile requires an open map".to_string()));
        }
        let index = self.slot_index(plane, tile_x, tile_y)?;
        let (w, h) = self.clipped_tile_size(tile_x, tile_y);
        let layout = self.layout.as_ref().expect("MAPPED state always carries a layout");

        let little_endian = self.options.byte_order == ByteOrder::LittleEndian;
        let raw = sample_packing::pack_tile(pixels, layout, w, h, little_endian)?;
        let encoded = self.registry.compress(self.options.compression, &raw)?;
        self.place_tile_bytes(index, &encoded)
    }

    /// Places an already-encoded tile's bytes verbatim, skipping pack/
    /// compress — the Copier's direct-copy path when source and
    /// destination share a compression code.
    pub fn write_tile_encoded(&mut self, plane: u32, tile_x: u32, tile_y: u32, encoded: &[u8]) -> TiffResult<()> {
        if self.state != WriterState::Mapped {
            return Err(TiffError::MalformedIFD("write_tile_encoded requires an open map".to_string()));
        }
        let index = self.slot_index(plane, tile_x, tile_y)?;
        self.place_tile_bytes(index, encoded)
    }

    fn place_tile_bytes(&mut self, index: usize, encoded: &[u8]) -> TiffResult<()> {
        let slot = self.slots[index];
        let reuse_in_place = !self.options.always_write_to_file_end
            && slot.offset.is_some()
            && slot.byte_count.map(|c| encoded.len() as u64 <= c).unwrap_or(false);

        let offset = if reuse_in_place {
            slot.offset.unwrap()
        } else {
            self.stream.seek_to_end()?
        };
        self.stream.seek(offset)?;
        self.stream.write_bytes(encoded)?;
        trace!("wrote tile slot {} at offset {} ({} bytes, in-place={})", index, offset, encoded.len(), reuse_in_place);

        self.slots[index] = TileSlot { offset: Some(offset), byte_count: Some(encoded.len() as u64) };
        Ok(())
    }

    /// Writes an arbitrary pixel region, merging with existing content for
    /// any tile the region only partially covers. `pixels` holds one byte per sample, row-major over
    /// `region`, chunky-interleaved unless `auto_interleave_source` is set
    /// (in which case it is plane-separated and is interleaved first).
    pub fn write_region(&mut self, region: Region, pixels: &[u8]) -> TiffResult<()> {
        if self.state != WriterState::Mapped {
            return Err(TiffError::MalformedIFD("write_region requires an open map".to_string()));
        }
        let layout = self.layout.as_ref().expect("MAPPED state always carries a layout").clone();
        let channels = layout.samples_per_pixel as usize;

        let chunky_pixels = if self.options.auto_interleave_source {
            interleave_planes(pixels, channels)
        } else {
            pixels.to_vec()
        };

        let first_tx = region.x / self.tile_width;
        let last_tx = (region.end_x() - 1) / self.tile_width;
        let first_ty = region.y / self.tile_height;
        let last_ty = (region.end_y() - 1) / self.tile_height;

        for tile_y in first_ty..=last_ty.min(self.tiles_down.saturating_sub(1)) {
            for tile_x in first_tx..=last_tx.min(self.tiles_across.saturating_sub(1)) {
                let (tw, th) = self.clipped_tile_size(tile_x, tile_y);
                let tile_origin_x = tile_x * self.tile_width;
                let tile_origin_y = tile_y * self.tile_height;
                let tile_region = Region::new(tile_origin_x, tile_origin_y, tw, th);

                let fully_covered = region.x <= tile_region.x
                    && region.y <= tile_region.y
                    && region.end_x() >= tile_region.end_x()
                    && region.end_y() >= tile_region.end_y();

                let mut baseline = if fully_covered {
                    vec![0u8; tw as usize * th as usize * channels]
                } else {
                    self.load_tile_baseline(0, tile_x, tile_y, tw, th)?
                };

                let overlap_x0 = tile_region.x.max(region.x);
                let overlap_y0 = tile_region.y.max(region.y);
                let overlap_x1 = tile_region.end_x().min(region.end_x());
                let overlap_y1 = tile_region.end_y().min(region.end_y());

                for y in overlap_y0..overlap_y1 {
                    let src_row_start = ((y - region.y) as usize * region.width as usize + (overlap_x0 - region.x) as usize) * channels;
                    let dst_row_start = ((y - tile_region.y) as usize * tw as usize + (overlap_x0 - tile_region.x) as usize) * channels;
                    let run = (overlap_x1 - overlap_x0) as usize * channels;
                    baseline[dst_row_start..dst_row_start + run]
                        .copy_from_slice(&chunky_pixels[src_row_start..src_row_start + run]);
                }

                self.write_tile(0, tile_x, tile_y, &baseline)?;
            }
        }
        Ok(())
    }

    /// Baseline content for a tile `write_region` only partially overlaps:
    /// the tile's already-written bytes if any (decoded with this writer's
    /// own stream/registry, since a Writer already has exclusive access to
    /// both), the caller's `tile_initializer` if one was supplied, or plain
    /// filler bytes.
    fn load_tile_baseline(&mut self, plane: u32, tile_x: u32, tile_y: u32, tw: u32, th: u32) -> TiffResult<Vec<u8>> {
        let index = self.slot_index(plane, tile_x, tile_y)?;
        let slot = self.slots[index];
        let layout = self.layout.as_ref().expect("MAPPED state always carries a layout");
        let channels = layout.samples_per_pixel as usize;

        if let (Some(offset), Some(byte_count)) = (slot.offset, slot.byte_count) {
            if byte_count > 0 {
                let encoded = self.stream.read_at(offset, byte_count as usize)?;
                let decoded = self.registry.decompress(self.options.compression, &encoded)?;
                let little_endian = self.options.byte_order == ByteOrder::LittleEndian;
                return sample_packing::unpack_tile(&decoded, layout, tw, th, little_endian);
            }
        }
        if let Some(init) = &self.options.tile_initializer {
            return Ok(init(tile_x, tile_y));
        }
        Ok(vec![self.options.byte_filler; tw as usize * th as usize * channels])
    }

    /// MAPPED -> CLOSED: flushes the mapped image's IFD to the stream,
    /// patches the pointer leading into it, and leaves the writer ready to
    /// either start another `new_map` (multi-image files) or be dropped.
    /// Any tile never written is filled per `missing_tiles_allowed`.
    pub fn complete_writing(&mut self) -> TiffResult<u64> {
        if self.state != WriterState::Mapped {
            return Err(TiffError::MalformedIFD("complete_writing requires an open map".to_string()));
        }

        for slot in &mut self.slots {
            if slot.offset.is_none() {
                if self.options.missing_tiles_allowed {
                    *slot = TileSlot { offset: Some(0), byte_count: Some(0) };
                } else {
                    return Err(TiffError::CorruptedData("a mapped tile was never written and missing tiles are not allowed".to_string()));
                }
            }
        }

        let entries = self.build_entries()?;
        let (ifd_offset, next_slot) = IFDCodec::write_ifd(&mut self.stream, &entries, self.is_big_tiff)?;
        IFDCodec::patch_pointer(&mut self.stream, self.next_pointer_slot, ifd_offset, self.is_big_tiff)?;
        self.next_pointer_slot = next_slot;

        debug!("completed IFD at offset {} ({} entries)", ifd_offset, entries.len());
        self.layout = None;
        self.slots = Vec::new();
        self.state = WriterState::Closed;
        Ok(ifd_offset)
    }

    fn build_entries(&self) -> TiffResult<Vec<IFDEntry>> {
        let layout = self.layout.as_ref().expect("MAPPED state always carries a layout");
        let mut entries = Vec::new();

        entries.push(long_entry(tags::IMAGE_WIDTH, layout.width));
        entries.push(long_entry(tags::IMAGE_LENGTH, layout.height));
        entries.push(IFDEntry::with_value(
            tags::BITS_PER_SAMPLE,
            0,
            IFDValue::Short(layout.bits_per_sample.iter().map(|&b| b as u16).collect()),
        ));
        entries.push(short_entry(tags::COMPRESSION, self.options.compression as u16));
        entries.push(short_entry(tags::PHOTOMETRIC_INTERPRETATION, layout.photometric));
        entries.push(short_entry(tags::SAMPLES_PER_PIXEL, layout.samples_per_pixel as u16));

        let planar_code = if layout.planar_config == PlanarConfig::Planar { planar_config::PLANAR } else { planar_config::CHUNKY };
        entries.push(short_entry(tags::PLANAR_CONFIGURATION, planar_code));

        if self.options.predictor != predictor_tag::NONE {
            entries.push(short_entry(tags::PREDICTOR, self.options.predictor));
        }
        if layout.sample_format != crate::sample_packing::SampleFormat::Unsigned {
            let code = match layout.sample_format {
                crate::sample_packing::SampleFormat::Signed => sample_format::SIGNED,
                crate::sample_packing::SampleFormat::Float => sample_format::IEEEFP,
                crate::sample_packing::SampleFormat::Unsigned => sample_format::UNSIGNED,
            };
            entries.push(short_entry(tags::SAMPLE_FORMAT, code));
        }
        if layout.fill_order != 1 {
            entries.push(short_entry(tags::FILL_ORDER, layout.fill_order));
        }

        if let Some(ycbcr) = &layout.ycbcr {
            entries.push(IFDEntry::with_value(tags::YCBCR_SUBSAMPLING, 0, IFDValue::Short(vec![ycbcr.h_sub as u16, ycbcr.v_sub as u16])));
            entries.push(IFDEntry::with_value(
                tags::REFERENCE_BLACK_WHITE,
                0,
                IFDValue::Rational(ycbcr.reference_black_white.iter().map(|&v| to_rational(v as f64)).collect()),
            ));
            entries.push(IFDEntry::with_value(
                tags::YCBCR_COEFFICIENTS,
                0,
                IFDValue::Rational(ycbcr.coefficients.iter().map(|&v| to_rational(v as f64)).collect()),
            ));
        }

        let offsets: Vec<u64> = self.slots.iter().map(|s| s.offset.unwrap_or(0)).collect();
        let byte_counts: Vec<u64> = self.slots.iter().map(|s| s.byte_count.unwrap_or(0)).collect();

        if self.is_tiled {
            entries.push(long_entry(tags::TILE_WIDTH, self.tile_width));
            entries.push(long_entry(tags::TILE_LENGTH, self.tile_height));
            entries.push(offset_array_entry(tags::TILE_OFFSETS, &offsets, self.is_big_tiff));
            entries.push(offset_array_entry(tags::TILE_BYTE_COUNTS, &byte_counts, self.is_big_tiff));
        } else {
            let rows_per_strip = if self.options.smart_format_correction {
                self.tile_height.min(self.image_height.max(1))
            } else {
                self.tile_height
            };
            entries.push(long_entry(tags::ROWS_PER_STRIP, rows_per_strip));
            entries.push(offset_array_entry(tags::STRIP_OFFSETS, &offsets, self.is_big_tiff));
            entries.push(offset_array_entry(tags::STRIP_BYTE_COUNTS, &byte_counts, self.is_big_tiff));
        }

        for extra in &self.extra_entries {
            entries.push(extra.clone());
        }

        Ok(entries)
    }

    /// Patches ImageDescription in place for an already-written IFD,
    /// without rebuilding the whole table — only possible when the new
    /// text fits within the space the original allocated externally.
    /// Longer replacements require `open_rewrite` + `new_map` instead.
    pub fn rewrite_description(&mut self, ifd_index: usize, text: &str) -> TiffResult<()> {
        let header_info = IFDCodec::parse_header(&mut self.stream)?;
        let ifds = IFDCodec::parse_chain(&mut self.stream, header_info.first_ifd_offset, header_info.is_big_tiff)?;
        let ifd = ifds
            .get(ifd_index)
            .ok_or_else(|| TiffError::MalformedIFD(format!("no IFD #{} to rewrite a description into", ifd_index)))?;
        let entry = ifd
            .get_entry(tags::IMAGE_DESCRIPTION)
            .ok_or_else(|| TiffError::MalformedIFD(format!("IFD #{} has no ImageDescription tag", ifd_index)))?;

        let needed = text.len() as u64 + 1;
        if entry.is_value_inline(header_info.is_big_tiff) || needed > entry.count {
            return Err(TiffError::UnsupportedFormat(
                "new description does not fit the previously allocated space; use open_rewrite for a full IFD rewrite".to_string(),
            ));
        }

        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(entry.count as usize, 0);
        self.stream.seek(entry.value_offset)?;
        self.stream.write_bytes(&bytes)?;
        Ok(())
    }

    /// Flushes the underlying stream. Call once no further IFDs will be
    /// appended.
    pub fn finish(mut self) -> TiffResult<ByteStream> {
        self.stream.flush()?;
        Ok(self.stream)
    }
}

fn write_header(stream: &mut ByteStream, big_tiff: bool, byte_order: ByteOrder) -> TiffResult<u64> {
    stream.set_byte_order(byte_order);
    let marker = match byte_order {
        ByteOrder::LittleEndian => header::LITTLE_ENDIAN_MARKER,
        ByteOrder::BigEndian => header::BIG_ENDIAN_MARKER,
    };
    stream.seek(0)?;
    stream.write_bytes(&marker)?;
    if big_tiff {
        stream.write_u16(header::BIG_TIFF_VERSION)?;
        stream.write_u16(header::BIGTIFF_OFFSET_SIZE)?;
        stream.write_u16(0)?;
        let slot = stream.position()?;
        stream.write_u64(0)?;
        Ok(slot)
    } else {
        stream.write_u16(header::TIFF_VERSION)?;
        let slot = stream.position()?;
        stream.write_u32(0)?;
        Ok(slot)
    }
}

fn header_first_ifd_slot(is_big_tiff: bool) -> u64 {
    if is_big_tiff { 8 } else { 4 }
}

fn last_ifd_next_pointer_slot(ifd: &IFD, is_big_tiff: bool) -> u64 {
    let table_size = IFDCodec::size_of_ifd_table(ifd.entry_count(), is_big_tiff);
    let slot_width = if is_big_tiff { 8 } else { 4 };
    ifd.offset + table_size - slot_width
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn long_entry(tag: u16, value: u32) -> IFDEntry {
    IFDEntry::with_value(tag, value as u64, IFDValue::Long(vec![value]))
}

fn short_entry(tag: u16, value: u16) -> IFDEntry {
    IFDEntry::with_value(tag, value as u64, IFDValue::Short(vec![value]))
}

fn offset_array_entry(tag: u16, values: &[u64], is_big_tiff: bool) -> IFDEntry {
    if is_big_tiff {
        IFDEntry::with_value(tag, 0, IFDValue::Long8(values.to_vec()))
    } else {
        IFDEntry::with_value(tag, 0, IFDValue::Long(values.iter().map(|&v| v as u32).collect()))
    }
}

fn to_rational(value: f64) -> (u32, u32) {
    const DENOM: u32 = 100_000;
    ((value * DENOM as f64).round().max(0.0) as u32, DENOM)
}

/// Rearranges a plane-separated pixel buffer (all of channel 0, then all of
/// channel 1, ...) into chunky row-major order, the shape `pack_tile`
/// expects. The counterpart of the reader's planar `TileMap` addressing.
fn interleave_planes(pixels: &[u8], channels: usize) -> Vec<u8> {
    if channels <= 1 {
        return pixels.to_vec();
    }
    let per_plane = pixels.len() / channels;
    let mut out = vec![0u8; pixels.len()];
    for c in 0..channels {
        let plane = &pixels[c * per_plane..(c + 1) * per_plane];
        for (i, &v) in plane.iter().enumerate() {
            out[i * channels + c] = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_packing::{PlanarConfig, SampleFormat};
    use crate::tiff::constants::photometric as photo;

    fn gray_layout(width: u32, height: u32) -> ImageLayout {
        ImageLayout {
            width,
            height,
            samples_per_pixel: 1,
            bits_per_sample: vec![8],
            sample_format: SampleFormat::Unsigned,
            planar_config: PlanarConfig::Chunky,
            photometric: photo::BLACK_IS_ZERO,
            compression: 1,
            predictor: predictor_tag::NONE,
            fill_order: 1,
            ycbcr: None,
        }
    }

    #[test]
    fn writes_single_tile_image_and_reader_reads_it_back() {
        let stream = ByteStream::from_memory(Vec::new());
        let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
        writer.new_map(gray_layout(4, 2), 4, 2, true).unwrap();
        writer.write_tile(0, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        writer.complete_writing().unwrap();
        let stream = writer.finish().unwrap();
        let bytes = stream.into_memory().unwrap();

        let mut reader = crate::reader::Reader::open(ByteStream::from_memory(bytes), crate::reader::ReaderOptions::default()).unwrap();
        assert_eq!(reader.all_ifds().len(), 1);
        let pixels = reader.read_tile(0, 0, 0, 0).unwrap();
        assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn write_region_merges_with_existing_tile_content() {
        let stream = ByteStream::from_memory(Vec::new());
        let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
        writer.new_map(gray_layout(4, 4), 4, 4, true).unwrap();
        writer.write_tile(0, 0, 0, &[0; 16]).unwrap();
        writer.write_region(Region::new(1, 1, 2, 1), &[9, 9]).unwrap();
        writer.complete_writing().unwrap();
        let stream = writer.finish().unwrap();
        let bytes = stream.into_memory().unwrap();

        let mut reader = crate::reader::Reader::open(ByteStream::from_memory(bytes), crate::reader::ReaderOptions::default()).unwrap();
        let pixels = reader.read_tile(0, 0, 0, 0).unwrap();
        let mut expected = vec![0u8; 16];
        expected[1 * 4 + 1] = 9;
        expected[1 * 4 + 2] = 9;
        assert_eq!(pixels, expected);
    }

    #[test]
    fn missing_tile_rejected_unless_allowed() {
        let stream = ByteStream::from_memory(Vec::new());
        let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
        writer.new_map(gray_layout(4, 2), 4, 2, true).unwrap();
        assert!(writer.complete_writing().is_err());
    }
}
