//! End-to-end scenarios exercising the full ByteStream -> Writer -> Reader
//! round trip through in-memory streams, no file-system access.

use tiffcore::io::stream::ByteStream;
use tiffcore::reader::{Reader, ReaderOptions};
use tiffcore::sample_packing::{pack_row, ImageLayout, PlanarConfig, SampleFormat};
use tiffcore::tiff::constants::{compression, photometric, predictor, tags};
use tiffcore::tiff::tile_map::Region;
use tiffcore::writer::{Writer, WriterOptions};

fn rgb_layout(width: u32, height: u32, compression_code: u64) -> ImageLayout {
    ImageLayout {
        width,
        height,
        samples_per_pixel: 3,
        bits_per_sample: vec![8, 8, 8],
        sample_format: SampleFormat::Unsigned,
        planar_config: PlanarConfig::Chunky,
        photometric: photometric::RGB,
        compression: compression_code,
        predictor: predictor::NONE,
        fill_order: 1,
        ycbcr: None,
    }
}

fn gray_layout(width: u32, height: u32, photometric_code: u16) -> ImageLayout {
    ImageLayout {
        width,
        height,
        samples_per_pixel: 1,
        bits_per_sample: vec![8],
        sample_format: SampleFormat::Unsigned,
        planar_config: PlanarConfig::Chunky,
        photometric: photometric_code,
        compression: compression::NONE as u64,
        predictor: predictor::NONE,
        fill_order: 1,
        ycbcr: None,
    }
}

fn reopen(writer: Writer) -> ByteStream {
    let stream = writer.finish().expect("finish");
    let bytes = stream.into_memory().expect("in-memory stream");
    ByteStream::from_memory(bytes)
}

/// S1: tiled Deflate round-trip, 3x8-bit RGB, 64x64 tiles, image 129x130.
#[test]
fn tiled_deflate_gradient_round_trips_exactly() {
    let layout = rgb_layout(129, 130, compression::DEFLATE as u64);
    let mut options = WriterOptions::default();
    options.compression = compression::DEFLATE as u64;

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, options).unwrap();
    writer.new_map(layout, 64, 64, true).unwrap();

    let tiles_across = 3u32;
    let tiles_down = 3u32;
    for ty in 0..tiles_down {
        for tx in 0..tiles_across {
            let w = if tx + 1 == tiles_across { 129 - 64 * tx } else { 64 };
            let h = if ty + 1 == tiles_down { 130 - 64 * ty } else { 64 };
            let mut buf = Vec::with_capacity((w * h * 3) as usize);
            for ly in 0..h {
                for lx in 0..w {
                    let x = tx * 64 + lx;
                    let y = ty * 64 + ly;
                    for c in 0..3u32 {
                        buf.push(((x + 2 * y + 30 * c) & 0xFF) as u8);
                    }
                }
            }
            writer.write_tile(0, tx, ty, &buf).unwrap();
        }
    }
    writer.complete_writing().unwrap();
    let read_stream = reopen(writer);

    let mut reader = Reader::open(read_stream, ReaderOptions::default()).unwrap();
    assert_eq!(reader.all_ifds().len(), 1);

    let offsets = reader.all_ifds()[0]
        .get_entry(tags::TILE_OFFSETS)
        .unwrap()
        .typed_value()
        .unwrap()
        .as_u64_vec()
        .unwrap();
    assert_eq!(offsets.len(), 9);

    let tiles: Vec<_> = reader.map(0).unwrap().tiles().to_vec();
    let mut ranges: Vec<(u64, u64)> = tiles
        .iter()
        .map(|t| (t.offset.unwrap(), t.offset.unwrap() + t.byte_count.unwrap()))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "tile byte ranges must not overlap");
    }

    let pixels = reader.read_region(0, Region::new(0, 0, 129, 130)).unwrap();
    assert_eq!(pixels.len(), 129 * 130 * 3);
    for y in 0..130u32 {
        for x in 0..129u32 {
            for c in 0..3u32 {
                let expected = ((x + 2 * y + 30 * c) & 0xFF) as u8;
                let idx = ((y * 129 + x) * 3 + c) as usize;
                assert_eq!(pixels[idx], expected, "mismatch at ({}, {}, {})", x, y, c);
            }
        }
    }
}

/// S2: 1-bit mask, photometric WhiteIsZero, strip layout, RowsPerStrip=3.
#[test]
fn one_bit_white_is_zero_strip_round_trips_with_inversion() {
    let mut layout = gray_layout(17, 5, photometric::WHITE_IS_ZERO);
    layout.bits_per_sample = vec![1];

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
    writer.new_map(layout, 17, 3, false).unwrap();

    // Pack raw mask bits directly (write_tile_encoded bypasses the photometric
    // pack/unpack pipeline, which otherwise expects 8-bit-scaled visual
    // samples rather than literal bit values).
    let tiles_down = 2u32;
    for ty in 0..tiles_down {
        let h = if ty + 1 == tiles_down { 5 - 3 * ty } else { 3 };
        let mut encoded = Vec::new();
        for ly in 0..h {
            let y = ty * 3 + ly;
            let row: Vec<u32> = (0..17u32).map(|x| (x + y) & 1).collect();
            encoded.extend(pack_row(&row, &[1], 17));
        }
        writer.write_tile_encoded(0, 0, ty, &encoded).unwrap();
    }
    writer.complete_writing().unwrap();
    let read_stream = reopen(writer);

    let mut reader = Reader::open(read_stream, ReaderOptions::default()).unwrap();
    let first_strip = reader.read_tile_encoded(0, 0, 0, 0).unwrap().unwrap();
    assert_eq!(first_strip.len(), 3 * 3, "3 bytes/row * 3 rows = ceil(17/8) packing");

    let pixels = reader.read_region(0, Region::new(0, 0, 17, 5)).unwrap();
    for y in 0..5u32 {
        for x in 0..17u32 {
            let mask = (x + y) & 1;
            let expected = if mask == 0 { 255u8 } else { 0u8 };
            assert_eq!(pixels[(y * 17 + x) as usize], expected, "mismatch at ({}, {})", x, y);
        }
    }
}

/// S3: YCbCr 4:2:0 uncompressed, Y=Cb=Cr=128 everywhere.
#[test]
fn ycbcr_neutral_gray_decodes_to_neutral_rgb() {
    let mut layout = gray_layout(4, 4, photometric::YCBCR);
    layout.samples_per_pixel = 3;
    layout.bits_per_sample = vec![8, 8, 8];
    layout.ycbcr = Some(tiffcore::sample_packing::YCbCrParams::default());

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
    writer.new_map(layout, 4, 4, true).unwrap();

    // 2x2 blocks of (Y,Y,Y,Y,Cb,Cr), all neutral gray.
    let block = [128u8, 128, 128, 128, 128, 128];
    let mut buf = Vec::new();
    for _ in 0..4 {
        buf.extend_from_slice(&block);
    }
    writer.write_tile(0, 0, 0, &buf).unwrap();
    writer.complete_writing().unwrap();
    let read_stream = reopen(writer);

    let mut reader = Reader::open(read_stream, ReaderOptions::default()).unwrap();
    let pixels = reader.read_region(0, Region::new(0, 0, 4, 4)).unwrap();
    assert_eq!(pixels.len(), 4 * 4 * 3);
    for px in pixels.chunks(3) {
        for &channel in px {
            assert!((channel as i32 - 128).abs() <= 1);
        }
    }
}

/// S4: unusual-precision samples (16-bit float, 24-bit integer) through the
/// full Writer -> Reader pipeline, not just the isolated unit conversions in
/// `sample_packing::precision`. `read_tile` is used directly rather than
/// `read_region`, since `read_region`'s byte-per-channel striding assumes
/// 1-byte samples and doesn't (yet) account for this module's widened
/// 4-byte-per-sample representation.
#[test]
fn float16_tile_round_trips_through_writer_and_reader() {
    let layout = ImageLayout {
        width: 4,
        height: 1,
        samples_per_pixel: 1,
        bits_per_sample: vec![16],
        sample_format: SampleFormat::Float,
        planar_config: PlanarConfig::Chunky,
        photometric: photometric::BLACK_IS_ZERO,
        compression: compression::NONE as u64,
        predictor: predictor::NONE,
        fill_order: 1,
        ycbcr: None,
    };

    let values = [1.0f32, -2.5, 0.0, 100.0];
    let mut pixels = Vec::new();
    for v in &values {
        pixels.extend_from_slice(&v.to_bits().to_ne_bytes());
    }

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
    writer.new_map(layout, 4, 1, true).unwrap();
    writer.write_tile(0, 0, 0, &pixels).unwrap();
    writer.complete_writing().unwrap();
    let read_stream = reopen(writer);

    let mut reader = Reader::open(read_stream, ReaderOptions::default()).unwrap();
    let decoded = reader.read_tile(0, 0, 0, 0).unwrap();
    assert_eq!(decoded.len(), 4 * 4, "4 samples widened to 4 bytes each");

    for (i, expected) in values.iter().enumerate() {
        let bytes: [u8; 4] = decoded[i * 4..i * 4 + 4].try_into().unwrap();
        let got = f32::from_bits(u32::from_ne_bytes(bytes));
        assert_eq!(got, *expected, "sample {} round-tripped to {}", i, got);
    }
}

/// S4 (continued): 24-bit unsigned-integer samples widened to u32 on decode
/// and narrowed back on encode.
#[test]
fn u24_tile_round_trips_through_writer_and_reader() {
    let layout = ImageLayout {
        width: 2,
        height: 1,
        samples_per_pixel: 1,
        bits_per_sample: vec![24],
        sample_format: SampleFormat::Unsigned,
        planar_config: PlanarConfig::Chunky,
        photometric: photometric::BLACK_IS_ZERO,
        compression: compression::NONE as u64,
        predictor: predictor::NONE,
        fill_order: 1,
        ycbcr: None,
    };

    // Widened representations of on-disk 3-byte little-endian values
    // 0xEFCDAB and 0x030201, shifted into the high bits of a u32 the way
    // `widen_u24(..., shift_to_high_bits: true)` does.
    let widened = [0xEFCDAB00u32, 0x03020100u32];
    let mut pixels = Vec::new();
    for v in &widened {
        pixels.extend_from_slice(&v.to_ne_bytes());
    }

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
    writer.new_map(layout, 2, 1, true).unwrap();
    writer.write_tile(0, 0, 0, &pixels).unwrap();
    writer.complete_writing().unwrap();
    let read_stream = reopen(writer);

    let mut reader = Reader::open(read_stream, ReaderOptions::default()).unwrap();
    let decoded = reader.read_tile(0, 0, 0, 0).unwrap();
    assert_eq!(decoded.len(), 2 * 4);

    for (i, expected) in widened.iter().enumerate() {
        let bytes: [u8; 4] = decoded[i * 4..i * 4 + 4].try_into().unwrap();
        assert_eq!(u32::from_ne_bytes(bytes), *expected, "sample {}", i);
    }
}

/// S5: BigTIFF with 2 IFDs, append a 3rd in APPENDING mode.
#[test]
fn big_tiff_append_preserves_existing_ifds_and_terminates_chain() {
    let mut options = WriterOptions::default();
    options.big_tiff = true;

    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, options).unwrap();

    for value in [10u8, 20u8] {
        let layout = gray_layout(1, 1, photometric::BLACK_IS_ZERO);
        writer.new_map(layout, 1, 1, true).unwrap();
        writer.write_tile(0, 0, 0, &[value]).unwrap();
        writer.complete_writing().unwrap();
    }
    let read_stream = reopen(writer);
    let bytes_after_two = read_stream.into_memory().unwrap();

    let mut reader = Reader::open(ByteStream::from_memory(bytes_after_two.clone()), ReaderOptions::default()).unwrap();
    assert_eq!(reader.all_ifds().len(), 2);
    let original_offsets: Vec<u64> = (0..2)
        .map(|i| {
            reader.all_ifds()[i]
                .get_entry(tags::TILE_OFFSETS)
                .unwrap()
                .typed_value()
                .unwrap()
                .as_u64_vec()
                .unwrap()[0]
        })
        .collect();

    let mut append_options = WriterOptions::default();
    append_options.big_tiff = true;
    let mut appender = Writer::open_append(ByteStream::from_memory(bytes_after_two), append_options).unwrap();
    let layout = gray_layout(1, 1, photometric::BLACK_IS_ZERO);
    appender.new_map(layout, 1, 1, true).unwrap();
    appender.write_tile(0, 0, 0, &[30]).unwrap();
    appender.complete_writing().unwrap();
    let final_stream = reopen(appender);
    let final_bytes = final_stream.into_memory().unwrap();

    let mut reader = Reader::open(ByteStream::from_memory(final_bytes), ReaderOptions::default()).unwrap();
    assert_eq!(reader.all_ifds().len(), 3, "chain must terminate after exactly 3 IFDs");
    for i in 0..2 {
        let offset = reader.all_ifds()[i]
            .get_entry(tags::TILE_OFFSETS)
            .unwrap()
            .typed_value()
            .unwrap()
            .as_u64_vec()
            .unwrap()[0];
        assert_eq!(offset, original_offsets[i], "IFD #{} tile offset must be untouched by the append", i);
    }
}

/// S6: partial-tile overwrite with preservation, 256x256 image, 64x64 tiles.
#[test]
fn partial_region_overwrite_preserves_untouched_tile_area() {
    let original = |x: u32, y: u32| -> u8 { ((x + y) % 251) as u8 };
    let overwritten = |x: u32, y: u32| -> u8 { (250 - (x * 3 + y) % 250) as u8 };

    let layout = gray_layout(256, 256, photometric::BLACK_IS_ZERO);
    let stream = ByteStream::from_memory(Vec::new());
    let mut writer = Writer::create(stream, WriterOptions::default()).unwrap();
    writer.new_map(layout, 64, 64, true).unwrap();
    for ty in 0..4u32 {
        for tx in 0..4u32 {
            let mut buf = Vec::with_capacity(64 * 64);
            for ly in 0..64u32 {
                for lx in 0..64u32 {
                    buf.push(original(tx * 64 + lx, ty * 64 + ly));
                }
            }
            writer.write_tile(0, tx, ty, &buf).unwrap();
        }
    }
    writer.complete_writing().unwrap();
    let bytes = reopen(writer).into_memory().unwrap();

    let layout = gray_layout(256, 256, photometric::BLACK_IS_ZERO);
    let mut rewriter = Writer::open_rewrite(ByteStream::from_memory(bytes), WriterOptions::default(), 0).unwrap();
    rewriter.new_map(layout, 64, 64, true).unwrap();

    let region = Region::new(32, 32, 64, 64);
    let mut region_pixels = Vec::with_capacity(64 * 64);
    for ly in 0..64u32 {
        for lx in 0..64u32 {
            region_pixels.push(overwritten(32 + lx, 32 + ly));
        }
    }
    rewriter.write_region(region, &region_pixels).unwrap();
    rewriter.complete_writing().unwrap();
    let final_bytes = reopen(rewriter).into_memory().unwrap();

    let mut reader = Reader::open(ByteStream::from_memory(final_bytes), ReaderOptions::default()).unwrap();
    let pixels = reader.read_region(0, Region::new(0, 0, 256, 256)).unwrap();

    for y in 0..256u32 {
        for x in 0..256u32 {
            let expected = if (32..96).contains(&x) && (32..96).contains(&y) {
                overwritten(x, y)
            } else {
                original(x, y)
            };
            assert_eq!(pixels[(y * 256 + x) as usize], expected, "mismatch at ({}, {})", x, y);
        }
    }
}
