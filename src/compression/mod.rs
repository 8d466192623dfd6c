//! Compression handling for TIFF files
//!
//! This module implements strategies for handling different compression methods.

mod handler;
mod uncompressed;
mod deflate;
mod zstd;
mod packbits;
mod registry;

pub use handler::CompressionHandler;
pub use uncompressed::UncompressedHandler;
pub use deflate::AdobeDeflateHandler;
pub use zstd::ZstdHandler;
pub use packbits::PackBitsHandler;
pub use registry::CodecRegistry;