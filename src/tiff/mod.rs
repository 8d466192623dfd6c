//! TIFF file format parsing module
//!
//! This module provides structures and functions for reading
//! TIFF and BigTIFF format files.

pub mod errors;
pub mod ifd;
pub mod ifd_codec;
pub mod tile_map;
pub mod special_kinds;
pub mod constants;

pub use crate::io::byte_order::{BigEndianHandler, ByteOrder, ByteOrderHandler, LittleEndianHandler};
pub use errors::{TiffError, TiffResult};
pub use ifd::{IFD, IFDEntry};
pub use special_kinds::{SpecialKind, SpecialKinds};

// Constants for TIFF format
pub const BIGTIFF_VERSION: u16 = 43;
pub const BIGTIFF_OFFSETSIZE: u16 = 8;