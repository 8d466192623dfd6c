//! Image File Directory (IFD) structures and methods
//!
//! This module implements the core TIFF IFD (Image File Directory) structures
//! that store metadata about images in a TIFF file. IFDs are organized as
//! collections of tag entries, with each tag describing an aspect of the image.

use std::collections::HashMap;
use std::fmt;
use crate::tiff::constants::{field_types, tags};
use log::{debug, info, trace};
use crate::utils::tag_utils;

/// The typed value carried by an IFD entry, as a tagged union over the
/// TIFF/BigTIFF field types (design note: "dynamic type of IFD values").
/// `IFDCodec` populates this when it resolves an entry's payload (inline or
/// external); callers that only need the raw offset/value word can still
/// use `IFDEntry::value_offset`.
#[derive(Debug, Clone, PartialEq)]
pub enum IFDValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ifd(Vec<u32>),
    Long8(Vec<u64>),
    SLong8(Vec<i64>),
    Ifd8(Vec<u64>),
}

impl IFDValue {
    /// The TIFF field-type code this value would be serialized as.
    pub fn field_type(&self) -> u16 {
        match self {
            IFDValue::Byte(_) => field_types::BYTE,
            IFDValue::Ascii(_) => field_types::ASCII,
            IFDValue::Short(_) => field_types::SHORT,
            IFDValue::Long(_) => field_types::LONG,
            IFDValue::Rational(_) => field_types::RATIONAL,
            IFDValue::SByte(_) => field_types::SBYTE,
            IFDValue::Undefined(_) => field_types::UNDEFINED,
            IFDValue::SShort(_) => field_types::SSHORT,
            IFDValue::SLong(_) => field_types::SLONG,
            IFDValue::SRational(_) => field_types::SRATIONAL,
            IFDValue::Float(_) => field_types::FLOAT,
            IFDValue::Double(_) => field_types::DOUBLE,
            IFDValue::Ifd(_) => field_types::IFD,
            IFDValue::Long8(_) => field_types::LONG8,
            IFDValue::SLong8(_) => field_types::SLONG8,
            IFDValue::Ifd8(_) => field_types::IFD8,
        }
    }

    /// Number of values this entry carries (the IFD entry's `count`).
    pub fn count(&self) -> u64 {
        match self {
            IFDValue::Byte(v) => v.len() as u64,
            IFDValue::Ascii(s) => s.len() as u64 + 1, // NUL terminator
            IFDValue::Short(v) => v.len() as u64,
            IFDValue::Long(v) => v.len() as u64,
            IFDValue::Rational(v) => v.len() as u64,
            IFDValue::SByte(v) => v.len() as u64,
            IFDValue::Undefined(v) => v.len() as u64,
            IFDValue::SShort(v) => v.len() as u64,
            IFDValue::SLong(v) => v.len() as u64,
            IFDValue::SRational(v) => v.len() as u64,
            IFDValue::Float(v) => v.len() as u64,
            IFDValue::Double(v) => v.len() as u64,
            IFDValue::Ifd(v) => v.len() as u64,
            IFDValue::Long8(v) => v.len() as u64,
            IFDValue::SLong8(v) => v.len() as u64,
            IFDValue::Ifd8(v) => v.len() as u64,
        }
    }

    /// Widens any integer-typed value to a `u64` vector. Returns `None` for
    /// ASCII, signed-negative-capable types that don't fit, float, or
    /// rational values (those need a dedicated accessor).
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            IFDValue::Byte(v) => Some(v.iter().map(|&b| b as u64).collect()),
            IFDValue::Short(v) => Some(v.iter().map(|&s| s as u64).collect()),
            IFDValue::Long(v) => Some(v.iter().map(|&l| l as u64).collect()),
            IFDValue::Long8(v) => Some(v.clone()),
            IFDValue::Ifd(v) => Some(v.iter().map(|&o| o as u64).collect()),
            IFDValue::Ifd8(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The first (or only) value as a `u64`, for scalar tags like
    /// Compression or PhotometricInterpretation.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_u64_vec()?.into_iter().next()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            IFDValue::Ascii(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            IFDValue::Float(v) => Some(v.iter().map(|&f| f as f64).collect()),
            IFDValue::Double(v) => Some(v.clone()),
            IFDValue::Rational(v) => Some(v.iter().map(|&(n, d)| n as f64 / d.max(1) as f64).collect()),
            IFDValue::SRational(v) => Some(v.iter().map(|&(n, d)| n as f64 / d.max(1) as f64).collect()),
            _ => self.as_u64_vec().map(|v| v.into_iter().map(|x| x as f64).collect()),
        }
    }

    /// Raw bytes backing an UNDEFINED-typed entry (e.g. JPEGTables).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            IFDValue::Undefined(v) | IFDValue::Byte(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Represents an Image File Directory (IFD) in a TIFF file
///
/// An IFD contains metadata about an image, stored as a series of tag entries.
/// TIFF files can contain multiple IFDs, each describing a separate image in
/// a multipage TIFF.
#[derive(Debug, Clone)]
pub struct IFD {
    /// Entries in this IFD
    pub entries: Vec<IFDEntry>,
    /// IFD number (0-based)
    pub number: usize,
    /// Offset to this IFD in the file
    pub offset: u64,
    /// Cached tag values for quick lookup
    tag_map: HashMap<u16, IFDEntry>,
}

/// Represents an entry in an Image File Directory (IFD)
///
/// Each entry describes one aspect of the image (dimensions, color space,
/// compression, etc.) using a tag-value pair. The field_type determines
/// how to interpret the value or offset.
#[derive(Debug, Clone)]
pub struct IFDEntry {
    /// TIFF tag identifier
    pub tag: u16,
    /// Field type
    pub field_type: u16,
    /// Number of values
    pub count: u64,
    /// Value or offset to values, exactly as it appears in the IFD's fixed
    /// 4-/8-byte slot (inline value, or external offset if the payload
    /// didn't fit).
    pub value_offset: u64,
    /// The decoded payload, once `IFDCodec` has resolved it. `None` for an
    /// entry constructed from the fixed slot alone, before resolution.
    pub value: Option<IFDValue>,
}

impl IFDEntry {
    /// Creates a new IFD entry from its fixed-slot fields, with no resolved
    /// value yet (see `with_value` / `IFDCodec::resolve`).
    pub fn new(tag: u16, field_type: u16, count: u64, value_offset: u64) -> Self {
        let tag_name = tag_utils::get_tag_name(tag);
        let field_type_name = tag_utils::get_field_type_name(field_type);

        debug!("Creating new IFD entry: tag={} ({}), type={} ({}), count={}, offset/value={}",
               tag, tag_name, field_type, field_type_name, count, value_offset);

        Self {
            tag,
            field_type,
            count,
            value_offset,
            value: None,
        }
    }

    /// Creates an entry together with its already-decoded typed value
    /// (`field_type`/`count`/`value_offset` are derived from it).
    pub fn with_value(tag: u16, value_offset: u64, value: IFDValue) -> Self {
        let mut entry = Self::new(tag, value.field_type(), value.count(), value_offset);
        entry.value = Some(value);
        entry
    }

    /// The decoded typed value, if resolved.
    pub fn typed_value(&self) -> Option<&IFDValue> {
        self.value.as_ref()
    }

    /// Get the size in bytes for this entry's field type
    ///
    /// Different TIFF field types take up different amounts of space.
    /// This method returns how many bytes a single value of this entry's type requires.
    pub fn get_field_type_size(&self) -> usize {
        match self.field_type {
            field_types::BYTE | field_types::ASCII | field_types::SBYTE | field_types::UNDEFINED => 1,
            field_types::SHORT | field_types::SSHORT => 2,
            field_types::LONG | field_types::SLONG | field_types::FLOAT | field_types::IFD => 4,
            field_types::RATIONAL | field_types::SRATIONAL | field_types::DOUBLE => 8,
            field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => 8,
            _ => {
                debug!("Unknown field type: {}, assuming 1 byte", self.field_type);
                1 // Default to 1 byte
            }
        }
    }

    /// Determines if the value is stored inline in value_offset
    /// rather than at the offset location
    ///
    /// TIFF format allows small values to be stored directly in the IFD entry
    /// rather than requiring a separate data area. This method determines
    /// if this entry's value is stored inline or at an external offset.
    pub fn is_value_inline(&self, is_big_tiff: bool) -> bool {
        let total_size = self.get_field_type_size() * self.count as usize;
        let inline_size = if is_big_tiff { 8 } else { 4 };

        let is_inline = total_size <= inline_size;
        let tag_name = tag_utils::get_tag_name(self.tag);

        trace!("Tag {} ({}) value storage: {}bytes, {} inline (max {}bytes)",
              self.tag, tag_name, total_size,
              if is_inline { "is" } else { "not" }, inline_size);

        is_inline
    }

    /// Returns a human-readable description of this entry
    ///
    /// This is useful for debugging and logging purposes.
    pub fn description(&self) -> String {
        let tag_name = tag_utils::get_tag_name(self.tag);
        let field_type_name = tag_utils::get_field_type_name(self.field_type);

        // Special handling for common tags to provide more meaningful output
        let value_display = match self.tag {
            tags::COMPRESSION => format!("{} ({})",
                                         self.value_offset,
                                         tag_utils::get_compression_name(self.value_offset)),

            tags::PHOTOMETRIC_INTERPRETATION => format!("{} ({})",
                                                        self.value_offset,
                                                        tag_utils::get_photometric_name(self.value_offset)),

            _ => self.value_offset.to_string()
        };

        format!("Tag: {} ({}), Type: {} ({}), Count: {}, Value/Offset: {}",
                self.tag, tag_name, self.field_type, field_type_name, self.count, value_display)
    }
}

impl IFD {
    /// Creates a new IFD
    ///
    /// Initializes an empty Image File Directory with the specified
    /// number (index) and file offset.
    pub fn new(number: usize, offset: u64) -> Self {
        info!("Creating new IFD #{} at offset {}", number, offset);

        Self {
            entries: Vec::new(),
            number,
            offset,
            tag_map: HashMap::new(),
        }
    }

    /// Adds an entry to this IFD
    ///
    /// This method adds a tag entry to the IFD and also updates the
    /// lookup cache for fast access by tag number.
    pub fn add_entry(&mut self, entry: IFDEntry) {
        trace!("Adding entry to IFD #{}: {}", self.number, entry.description());

        self.tag_map.insert(entry.tag, entry.clone());
        self.entries.push(entry);
    }

    /// Gets a tag value (value_offset) directly
    ///
    /// This is a convenience method for quickly retrieving the value/offset
    /// field of a tag without having to access the full entry.
    pub fn get_tag_value(&self, tag: u16) -> Option<u64> {
        let value = self.tag_map.get(&tag).map(|entry| entry.value_offset);
        let tag_name = tag_utils::get_tag_name(tag);

        if let Some(val) = value {
            trace!("Found tag {} ({}) in IFD #{}: value/offset={}", tag, tag_name, self.number, val);
        } else {
            trace!("Tag {} ({}) not found in IFD #{}", tag, tag_name, self.number);
        }

        value
    }

    /// Checks if this IFD has a specific tag
    ///
    /// Returns true if the tag exists in this IFD, false otherwise.
    pub fn has_tag(&self, tag: u16) -> bool {
        let has_tag = self.tag_map.contains_key(&tag);
        let tag_name = tag_utils::get_tag_name(tag);

        trace!("Checking if IFD #{} has tag {} ({}): {}",
               self.number, tag, tag_name, has_tag);

        has_tag
    }

    /// Gets an IFD entry by tag
    ///
    /// Returns the full IFD entry for the specified tag, if it exists.
    pub fn get_entry(&self, tag: u16) -> Option<&IFDEntry> {
        let entry = self.tag_map.get(&tag);
        let tag_name = tag_utils::get_tag_name(tag);

        if entry.is_some() {
            trace!("Retrieved entry for tag {} ({}) from IFD #{}", tag, tag_name, self.number);
        }

        entry
    }

    /// Gets the dimensions of the image described by this IFD
    ///
    /// Returns the width and height of the image if both tags are present.
    pub fn get_dimensions(&self) -> Option<(u64, u64)> {
        let width = self.get_tag_value(tags::IMAGE_WIDTH)?;
        let height = self.get_tag_value(tags::IMAGE_LENGTH)?;

        debug!("Image dimensions from IFD #{}: {}x{}", self.number, width, height);

        Some((width, height))
    }

    /// Returns number of samples per pixel (default 1 if not specified)
    ///
    /// This indicates how many color channels the image has:
    /// 1 for grayscale, 3 for RGB, 4 for RGBA, etc.
    pub fn get_samples_per_pixel(&self) -> u64 {
        let samples = self.get_tag_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        debug!("Samples per pixel from IFD #{}: {}", self.number, samples);
        samples
    }

    /// Gets all entries for this IFD
    ///
    /// Returns a reference to the entries vector.
    pub fn get_entries(&self) -> &Vec<IFDEntry> {
        &self.entries
    }

    /// Gets the number of entries in this IFD
    ///
    /// Returns the count of tag entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for IFD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IFD #{} (offset: {})", self.number, self.offset)?;
        writeln!(f, "  Number of entries: {}", self.entries.len())?;

        if let Some((width, height)) = self.get_dimensions() {
            writeln!(f, "  Dimensions: {}x{}", width, height)?;
        }

        writeln!(f, "  Samples per pixel: {}", self.get_samples_per_pixel())?;

        // Enhanced tag list with names
        writeln!(f, "  Tags:")?;
        for entry in &self.entries {
            let tag_name = tag_utils::get_tag_name(entry.tag);
            let field_type_name = tag_utils::get_field_type_name(entry.field_type);

            // Special handling for known tags for more meaningful output
            let value_display = match entry.tag {
                tags::COMPRESSION => format!("{} ({})",
                                             entry.value_offset,
                                             tag_utils::get_compression_name(entry.value_offset)),

                tags::PHOTOMETRIC_INTERPRETATION => format!("{} ({})",
                                                            entry.value_offset,
                                                            tag_utils::get_photometric_name(entry.value_offset)),

                _ => entry.value_offset.to_string()
            };

            writeln!(f, "    {} ({}): {} [{}]",
                     entry.tag, tag_name, value_display, field_type_name)?;
        }

        Ok(())
    }
}