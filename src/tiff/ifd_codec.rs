//! IFD parsing and serialization
//!
//! `IFDCodec` turns a `ByteStream` positioned at a TIFF/BigTIFF header into
//! a chain of `IFD`s, and turns a set of `IFDEntry`s back into bytes. It
//! owns none of the stream's state beyond the current call; the Reader and
//! Writer are the ones tracking position and byte order across calls.

use log::{debug, trace, warn};

use crate::io::byte_order::ByteOrder;
use crate::io::stream::ByteStream;
use crate::tiff::constants::{field_types, header};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::{IFDEntry, IFDValue, IFD};
use crate::utils::write_utils;

/// Upper bound on IFDs visited while following a next-pointer chain. Guards
/// against cyclic or malformed chains; pyramidal slide files can legitimately
/// carry thousands of IFDs, so this is far above any real file.
pub const MAX_IFD_CHAIN: usize = 1_048_576;

/// The parsed TIFF/BigTIFF header: byte order (already applied to the
/// stream by the caller), BigTIFF-ness, and the first IFD's offset.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInfo {
    pub is_big_tiff: bool,
    pub first_ifd_offset: u64,
}

pub struct IFDCodec;

impl IFDCodec {
    /// Parses the 8-byte classic / 16-byte BigTIFF header. Assumes the
    /// stream's byte order has already been detected and set (the magic
    /// bytes themselves are order-agnostic: `II`/`MM` map 1:1 to little
    /// /big-endian).
    pub fn parse_header(stream: &mut ByteStream) -> TiffResult<HeaderInfo> {
        stream.seek(0)?;
        let magic = stream.read_bytes(2)?;
        let is_le = match (magic[0], magic[1]) {
            (0x49, 0x49) => true,
            (0x4D, 0x4D) => false,
            _ => return Err(TiffError::NotTiff),
        };
        let expected_order = if is_le {
            crate::io::byte_order::ByteOrder::LittleEndian
        } else {
            crate::io::byte_order::ByteOrder::BigEndian
        };
        stream.set_byte_order(expected_order);

        let version = stream.read_u16()?;
        match version {
            v if v == header::TIFF_VERSION => {
                let first_ifd_offset = stream.read_u32()? as u64;
                Ok(HeaderInfo { is_big_tiff: false, first_ifd_offset })
            }
            v if v == header::BIG_TIFF_VERSION => {
                let offset_size = stream.read_u16()?;
                let reserved = stream.read_u16()?;
                if offset_size != header::BIGTIFF_OFFSET_SIZE {
                    return Err(TiffError::MalformedIFD(format!(
                        "BigTIFF offset size must be 8, got {}",
                        offset_size
                    )));
                }
                if reserved != 0 {
                    return Err(TiffError::MalformedIFD(format!(
                        "BigTIFF reserved field must be 0, got {}",
                        reserved
                    )));
                }
                let first_ifd_offset = stream.read_u64()?;
                Ok(HeaderInfo { is_big_tiff: true, first_ifd_offset })
            }
            other => Err(TiffError::UnsupportedVersion(other)),
        }
    }

    /// Walks the next-pointer chain starting at `first_ifd_offset`, parsing
    /// each IFD and resolving its entry values. Stops at a zero pointer or
    /// `MAX_IFD_CHAIN`, whichever comes first.
    pub fn parse_chain(stream: &mut ByteStream, first_ifd_offset: u64, is_big_tiff: bool) -> TiffResult<Vec<IFD>> {
        let mut ifds = Vec::new();
        let mut offset = first_ifd_offset;
        let mut number = 0usize;

        while offset != 0 {
            if number >= MAX_IFD_CHAIN {
                warn!("IFD chain exceeded {} entries, stopping traversal", MAX_IFD_CHAIN);
                break;
            }
            let file_len = stream.length()?;
            if offset >= file_len {
                warn!("IFD offset {} is past end of file ({}), stopping chain", offset, file_len);
                break;
            }

            let (ifd, next_offset) = Self::parse_ifd(stream, offset, number, is_big_tiff)?;
            ifds.push(ifd);
            offset = next_offset;
            number += 1;
        }

        Ok(ifds)
    }

    /// Parses a single IFD at `offset`: entry count, the entry array (with
    /// values resolved inline or via external payload), and the trailing
    /// next-IFD pointer. Returns the IFD plus that pointer.
    pub fn parse_ifd(
        stream: &mut ByteStream,
        offset: u64,
        number: usize,
        is_big_tiff: bool,
    ) -> TiffResult<(IFD, u64)> {
        stream.seek(offset)?;

        let entry_count = if is_big_tiff {
            stream.read_u64()?
        } else {
            stream.read_u16()? as u64
        };

        let mut ifd = IFD::new(number, offset);
        for _ in 0..entry_count {
            let entry = Self::parse_entry(stream, is_big_tiff)?;
            ifd.add_entry(entry);
        }

        let next_offset = if is_big_tiff { stream.read_u64()? } else { stream.read_u32()? as u64 };
        debug!("parsed IFD #{} at {}: {} entries, next={}", number, offset, ifd.entry_count(), next_offset);

        Ok((ifd, next_offset))
    }

    fn parse_entry(stream: &mut ByteStream, is_big_tiff: bool) -> TiffResult<IFDEntry> {
        let tag = stream.read_u16()?;
        let field_type = stream.read_u16()?;
        let count = if is_big_tiff { stream.read_u64()? } else { stream.read_u32()? as u64 };

        let slot_width = if is_big_tiff { 8 } else { 4 };
        let value_size = field_type_size(field_type);
        let total_size = value_size.saturating_mul(count as usize);

        let order = stream.byte_order();
        let value = if total_size <= slot_width {
            let raw = Self::read_inline_slot(stream, is_big_tiff)?;
            decode_value(field_type, count, &raw, order)?
        } else {
            let value_offset = if is_big_tiff { stream.read_u64()? } else { stream.read_u32()? as u64 };
            let payload = stream.read_at(value_offset, total_size)?;
            decode_value(field_type, count, &payload, order)?
        };

        let value_offset = inline_numeric_offset(&value, is_big_tiff);
        Ok(IFDEntry::with_value(tag, value_offset, value))
    }

    fn read_inline_slot(stream: &mut ByteStream, is_big_tiff: bool) -> TiffResult<Vec<u8>> {
        if is_big_tiff {
            Ok(stream.read_bytes(8)?)
        } else {
            Ok(stream.read_bytes(4)?)
        }
    }

    /// `sizeOfIFDTable`: 2 + 12n + 4 classic, 8 + 20n + 8 BigTIFF.
    pub fn size_of_ifd_table(entry_count: usize, is_big_tiff: bool) -> u64 {
        if is_big_tiff {
            8 + 20 * entry_count as u64 + 8
        } else {
            2 + 12 * entry_count as u64 + 4
        }
    }

    /// Writes an IFD's entry table at the stream's current position,
    /// writing any non-inline payloads first and resolving their offsets
    /// before laying out the fixed-size entry table.
    ///
    /// Tags are written sorted and de-duplicated (last write wins). Returns
    /// the offset the IFD table itself starts at (what a preceding
    /// next-pointer must point to) and
    /// the offset of this IFD's own next-pointer slot, for the caller to
    /// patch once it knows (or doesn't know) the following IFD's location.
    pub fn write_ifd(stream: &mut ByteStream, entries: &[IFDEntry], is_big_tiff: bool) -> TiffResult<(u64, u64)> {
        let mut entries = write_utils::get_unique_sorted_entries(entries);
        let slot_width: usize = if is_big_tiff { 8 } else { 4 };
        let order = stream.byte_order();

        // Pass 1: write external payloads for anything too large to inline,
        // patching each entry's value_offset to point at what we just wrote.
        for entry in entries.iter_mut() {
            let value = entry
                .typed_value()
                .ok_or_else(|| TiffError::MalformedIFD(format!("tag {} has no resolved value to serialize", entry.tag)))?;
            let bytes = encode_value(value, order);
            if bytes.len() > slot_width {
                let offset = stream.length()?;
                stream.seek(offset)?;
                stream.write_bytes(&bytes)?;
                entry.value_offset = offset;
            }
        }

        // Pass 2: the fixed-width table itself.
        let ifd_offset = stream.position()?;
        if is_big_tiff {
            stream.write_u64(entries.len() as u64)?;
        } else {
            stream.write_u16(entries.len() as u16)?;
        }

        for entry in &entries {
            stream.write_u16(entry.tag)?;
            stream.write_u16(entry.field_type)?;
            if is_big_tiff {
                stream.write_u64(entry.count)?;
            } else {
                stream.write_u32(entry.count as u32)?;
            }

            let value = entry.typed_value().expect("resolved in pass 1");
            let bytes = encode_value(value, order);
            if bytes.len() <= slot_width {
                let mut padded = bytes.clone();
                padded.resize(slot_width, 0);
                stream.write_bytes(&padded)?;
            } else if is_big_tiff {
                stream.write_u64(entry.value_offset)?;
            } else {
                stream.write_u32(entry.value_offset as u32)?;
            }
        }

        let next_pointer_offset = stream.position()?;
        if is_big_tiff {
            stream.write_u64(0)?;
        } else {
            stream.write_u32(0)?;
        }

        trace!("wrote IFD table at {} ({} entries), next-pointer slot at {}", ifd_offset, entries.len(), next_pointer_offset);
        Ok((ifd_offset, next_pointer_offset))
    }

    /// Patches a previously-written next-IFD pointer (or the header's
    /// first-IFD slot) to point at `target`.
    pub fn patch_pointer(stream: &mut ByteStream, pointer_offset: u64, target: u64, is_big_tiff: bool) -> TiffResult<()> {
        let saved = stream.position()?;
        stream.seek(pointer_offset)?;
        if is_big_tiff {
            stream.write_u64(target)?;
        } else {
            stream.write_u32(target as u32)?;
        }
        stream.seek(saved)?;
        Ok(())
    }
}

fn field_type_size(field_type: u16) -> usize {
    match field_type {
        field_types::BYTE | field_types::ASCII | field_types::SBYTE | field_types::UNDEFINED => 1,
        field_types::SHORT | field_types::SSHORT => 2,
        field_types::LONG | field_types::SLONG | field_types::FLOAT | field_types::IFD => 4,
        field_types::RATIONAL | field_types::SRATIONAL | field_types::DOUBLE => 8,
        field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => 8,
        _ => 1,
    }
}

/// Decodes a resolved payload (inline slot bytes, or the external-offset
/// read-back) into a typed `IFDValue`, honoring `order` for multi-byte
/// fields.
fn decode_value(field_type: u16, count: u64, bytes: &[u8], order: ByteOrder) -> TiffResult<IFDValue> {
    let n = count as usize;
    match field_type {
        field_types::BYTE => Ok(IFDValue::Byte(bytes.to_vec())),
        field_types::SBYTE => Ok(IFDValue::SByte(bytes.iter().map(|&b| b as i8).collect())),
        field_types::UNDEFINED => Ok(IFDValue::Undefined(bytes.to_vec())),
        field_types::ASCII => {
            let text = bytes
                .split(|&b| b == 0)
                .next()
                .unwrap_or(&[])
                .iter()
                .map(|&b| b as char)
                .collect::<String>();
            Ok(IFDValue::Ascii(text))
        }
        field_types::SHORT => Ok(IFDValue::Short(chunked(bytes, 2, n, |c| u16_from(c, order)))),
        field_types::SSHORT => Ok(IFDValue::SShort(chunked(bytes, 2, n, |c| u16_from(c, order) as i16))),
        field_types::LONG | field_types::IFD => {
            let v = chunked(bytes, 4, n, |c| u32_from(c, order));
            if field_type == field_types::IFD { Ok(IFDValue::Ifd(v)) } else { Ok(IFDValue::Long(v)) }
        }
        field_types::SLONG => Ok(IFDValue::SLong(chunked(bytes, 4, n, |c| u32_from(c, order) as i32))),
        field_types::FLOAT => Ok(IFDValue::Float(chunked(bytes, 4, n, |c| f32::from_bits(u32_from(c, order))))),
        field_types::DOUBLE => Ok(IFDValue::Double(chunked(bytes, 8, n, |c| f64::from_bits(u64_from(c, order))))),
        field_types::RATIONAL => {
            let mut out = Vec::with_capacity(n);
            for c in bytes.chunks_exact(8) {
                out.push((u32_from(&c[0..4], order), u32_from(&c[4..8], order)));
            }
            Ok(IFDValue::Rational(out))
        }
        field_types::SRATIONAL => {
            let mut out = Vec::with_capacity(n);
            for c in bytes.chunks_exact(8) {
                out.push((u32_from(&c[0..4], order) as i32, u32_from(&c[4..8], order) as i32));
            }
            Ok(IFDValue::SRational(out))
        }
        field_types::LONG8 => Ok(IFDValue::Long8(chunked(bytes, 8, n, |c| u64_from(c, order)))),
        field_types::SLONG8 => Ok(IFDValue::SLong8(chunked(bytes, 8, n, |c| u64_from(c, order) as i64))),
        field_types::IFD8 => Ok(IFDValue::Ifd8(chunked(bytes, 8, n, |c| u64_from(c, order)))),
        other => Err(TiffError::UnsupportedFieldType(other)),
    }
}

fn chunked<T>(bytes: &[u8], width: usize, n: usize, f: impl Fn(&[u8]) -> T) -> Vec<T> {
    bytes.chunks_exact(width).take(n).map(f).collect()
}

fn u16_from(c: &[u8], order: ByteOrder) -> u16 {
    match order {
        ByteOrder::LittleEndian => u16::from_le_bytes([c[0], c[1]]),
        ByteOrder::BigEndian => u16::from_be_bytes([c[0], c[1]]),
    }
}

fn u32_from(c: &[u8], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::LittleEndian => u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
        ByteOrder::BigEndian => u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
    }
}

fn u64_from(c: &[u8], order: ByteOrder) -> u64 {
    let arr: [u8; 8] = c.try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u64::from_le_bytes(arr),
        ByteOrder::BigEndian => u64::from_be_bytes(arr),
    }
}

fn bytes_of_u16(v: u16, order: ByteOrder) -> [u8; 2] {
    match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    }
}

fn bytes_of_u32(v: u32, order: ByteOrder) -> [u8; 4] {
    match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    }
}

fn bytes_of_u64(v: u64, order: ByteOrder) -> [u8; 8] {
    match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    }
}

/// Encodes a typed value to its serialized byte form in `order`. The
/// counterpart of `decode_value`.
fn encode_value(value: &IFDValue, order: ByteOrder) -> Vec<u8> {
    match value {
        IFDValue::Byte(v) => v.clone(),
        IFDValue::Undefined(v) => v.clone(),
        IFDValue::SByte(v) => v.iter().map(|&b| b as u8).collect(),
        IFDValue::Ascii(s) => {
            let mut out = s.as_bytes().to_vec();
            out.push(0);
            out
        }
        IFDValue::Short(v) => v.iter().flat_map(|&x| bytes_of_u16(x, order)).collect(),
        IFDValue::SShort(v) => v.iter().flat_map(|&x| bytes_of_u16(x as u16, order)).collect(),
        IFDValue::Long(v) => v.iter().flat_map(|&x| bytes_of_u32(x, order)).collect(),
        IFDValue::Ifd(v) => v.iter().flat_map(|&x| bytes_of_u32(x, order)).collect(),
        IFDValue::SLong(v) => v.iter().flat_map(|&x| bytes_of_u32(x as u32, order)).collect(),
        IFDValue::Float(v) => v.iter().flat_map(|&x| bytes_of_u32(x.to_bits(), order)).collect(),
        IFDValue::Double(v) => v.iter().flat_map(|&x| bytes_of_u64(x.to_bits(), order)).collect(),
        IFDValue::Long8(v) => v.iter().flat_map(|&x| bytes_of_u64(x, order)).collect(),
        IFDValue::SLong8(v) => v.iter().flat_map(|&x| bytes_of_u64(x as u64, order)).collect(),
        IFDValue::Ifd8(v) => v.iter().flat_map(|&x| bytes_of_u64(x, order)).collect(),
        IFDValue::Rational(v) => v
            .iter()
            .flat_map(|&(n, d)| bytes_of_u32(n, order).into_iter().chain(bytes_of_u32(d, order)))
            .collect(),
        IFDValue::SRational(v) => v
            .iter()
            .flat_map(|&(n, d)| bytes_of_u32(n as u32, order).into_iter().chain(bytes_of_u32(d as u32, order)))
            .collect(),
    }
}

/// Best-effort numeric form of a value for `IFDEntry::value_offset`, used
/// when a value is small enough to stay inline (its offset word then holds
/// the raw value rather than a pointer).
fn inline_numeric_offset(value: &IFDValue, _is_big_tiff: bool) -> u64 {
    value.as_u64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::constants::header;

    fn write_classic_header(stream: &mut ByteStream, first_ifd_offset: u32) {
        stream.seek(0).unwrap();
        stream.write_bytes(b"II").unwrap();
        stream.set_byte_order(ByteOrder::LittleEndian);
        stream.write_u16(header::TIFF_VERSION).unwrap();
        stream.write_u32(first_ifd_offset).unwrap();
    }

    fn write_big_tiff_header(stream: &mut ByteStream, first_ifd_offset: u64) {
        stream.seek(0).unwrap();
        stream.write_bytes(b"MM").unwrap();
        stream.set_byte_order(ByteOrder::BigEndian);
        stream.write_u16(header::BIG_TIFF_VERSION).unwrap();
        stream.write_u16(header::BIGTIFF_OFFSET_SIZE).unwrap();
        stream.write_u16(0).unwrap();
        stream.write_u64(first_ifd_offset).unwrap();
    }

    #[test]
    fn parse_header_reads_classic_little_endian() {
        let mut stream = ByteStream::from_memory(Vec::new());
        write_classic_header(&mut stream, 8);

        let info = IFDCodec::parse_header(&mut stream).unwrap();
        assert!(!info.is_big_tiff);
        assert_eq!(info.first_ifd_offset, 8);
    }

    #[test]
    fn parse_header_reads_big_tiff_big_endian() {
        let mut stream = ByteStream::from_memory(Vec::new());
        write_big_tiff_header(&mut stream, 16);

        let info = IFDCodec::parse_header(&mut stream).unwrap();
        assert!(info.is_big_tiff);
        assert_eq!(info.first_ifd_offset, 16);
    }

    #[test]
    fn parse_header_rejects_bad_magic() {
        let mut stream = ByteStream::from_memory(Vec::new());
        stream.write_bytes(b"XX").unwrap();
        stream.write_u16(header::TIFF_VERSION).unwrap();
        stream.write_u32(8).unwrap();

        let err = IFDCodec::parse_header(&mut stream).unwrap_err();
        assert!(matches!(err, TiffError::NotTiff));
    }

    #[test]
    fn parse_header_rejects_bad_bigtiff_offset_size() {
        let mut stream = ByteStream::from_memory(Vec::new());
        stream.write_bytes(b"II").unwrap();
        stream.set_byte_order(ByteOrder::LittleEndian);
        stream.write_u16(header::BIG_TIFF_VERSION).unwrap();
        stream.write_u16(4).unwrap();
        stream.write_u16(0).unwrap();
        stream.write_u64(16).unwrap();

        let err = IFDCodec::parse_header(&mut stream).unwrap_err();
        assert!(matches!(err, TiffError::MalformedIFD(_)));
    }

    #[test]
    fn write_then_parse_classic_ifd_round_trips_entries() {
        let mut stream = ByteStream::from_memory(Vec::new());
        stream.set_byte_order(ByteOrder::LittleEndian);

        let entries = vec![
            IFDEntry::with_value(256, 0, IFDValue::Long(vec![640])),
            IFDEntry::with_value(257, 0, IFDValue::Long(vec![480])),
            IFDEntry::with_value(270, 0, IFDValue::Ascii("hello".to_string())),
        ];

        let (ifd_offset, next_pointer_offset) = IFDCodec::write_ifd(&mut stream, &entries, false).unwrap();
        IFDCodec::patch_pointer(&mut stream, next_pointer_offset, 0, false).unwrap();

        let (ifd, next_offset) = IFDCodec::parse_ifd(&mut stream, ifd_offset, 0, false).unwrap();
        assert_eq!(next_offset, 0);
        assert_eq!(ifd.entry_count(), 3);

        let width = ifd.entries.iter().find(|e| e.tag == 256).unwrap();
        assert_eq!(width.typed_value(), Some(&IFDValue::Long(vec![640])));

        let desc = ifd.entries.iter().find(|e| e.tag == 270).unwrap();
        assert_eq!(desc.typed_value(), Some(&IFDValue::Ascii("hello".to_string())));
    }

    #[test]
    fn write_then_parse_big_tiff_ifd_round_trips_large_value() {
        let mut stream = ByteStream::from_memory(Vec::new());
        stream.set_byte_order(ByteOrder::BigEndian);

        let long_strip: Vec<u64> = (0..10).collect();
        let entries = vec![IFDEntry::with_value(273, 0, IFDValue::Long8(long_strip.clone()))];

        let (ifd_offset, next_pointer_offset) = IFDCodec::write_ifd(&mut stream, &entries, true).unwrap();
        IFDCodec::patch_pointer(&mut stream, next_pointer_offset, 0, true).unwrap();

        let (ifd, next_offset) = IFDCodec::parse_ifd(&mut stream, ifd_offset, 0, true).unwrap();
        assert_eq!(next_offset, 0);
        let entry = &ifd.entries[0];
        assert_eq!(entry.typed_value(), Some(&IFDValue::Long8(long_strip)));
    }

    #[test]
    fn parse_chain_follows_next_pointers_and_stops_at_zero() {
        let mut stream = ByteStream::from_memory(Vec::new());
        stream.set_byte_order(ByteOrder::LittleEndian);

        let entries_a = vec![IFDEntry::with_value(256, 0, IFDValue::Short(vec![10]))];
        let entries_b = vec![IFDEntry::with_value(256, 0, IFDValue::Short(vec![20]))];

        let (offset_a, next_ptr_a) = IFDCodec::write_ifd(&mut stream, &entries_a, false).unwrap();
        let (offset_b, next_ptr_b) = IFDCodec::write_ifd(&mut stream, &entries_b, false).unwrap();
        IFDCodec::patch_pointer(&mut stream, next_ptr_a, offset_b, false).unwrap();
        IFDCodec::patch_pointer(&mut stream, next_ptr_b, 0, false).unwrap();

        let ifds = IFDCodec::parse_chain(&mut stream, offset_a, false).unwrap();
        assert_eq!(ifds.len(), 2);
        assert_eq!(ifds[0].entries[0].typed_value(), Some(&IFDValue::Short(vec![10])));
        assert_eq!(ifds[1].entries[0].typed_value(), Some(&IFDValue::Short(vec![20])));
    }

    #[test]
    fn size_of_ifd_table_matches_classic_and_big_tiff_layouts() {
        assert_eq!(IFDCodec::size_of_ifd_table(3, false), 2 + 12 * 3 + 4);
        assert_eq!(IFDCodec::size_of_ifd_table(3, true), 8 + 20 * 3 + 8);
    }
}
