//! Pluggable codec lookup by compression code (tag 259)
//!
//! A registry callers can extend at runtime rather than a fixed match-by-
//! code dispatch: codecs beyond the built-ins are out of scope for this
//! engine to implement itself, but a caller can plug one in.

use std::collections::HashMap;

use log::debug;

use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};

use super::deflate::AdobeDeflateHandler;
use super::handler::CompressionHandler;
use super::packbits::PackBitsHandler;
use super::uncompressed::UncompressedHandler;
use super::zstd::ZstdHandler;

/// Maps a compression code to a `CompressionHandler`. Built-ins cover the
/// codecs this engine implements directly (None, Deflate, PackBits, ZSTD);
/// everything else in the TIFF/BigTIFF compression tag's value space (LZW,
/// JPEG, JPEG-2000, CCITT variants, LERC) is left for a caller to
/// `register()` — attempting to encode/decode an unregistered code surfaces
/// `UnsupportedCompression`.
pub struct CodecRegistry {
    handlers: HashMap<u64, Box<dyn CompressionHandler>>,
}

impl CodecRegistry {
    /// A registry with only the codecs this engine implements natively.
    pub fn new() -> Self {
        let mut registry = CodecRegistry { handlers: HashMap::new() };
        registry.register(Box::new(UncompressedHandler));
        registry.register(Box::new(AdobeDeflateHandler));
        registry.register(Box::new(PackBitsHandler));
        registry.register(Box::new(ZstdHandler::new()));
        registry
    }

    /// An empty registry, for callers that want to opt into only specific
    /// codecs rather than inheriting the built-in set.
    pub fn empty() -> Self {
        CodecRegistry { handlers: HashMap::new() }
    }

    /// Registers (or replaces) the handler for `handler.code()`. A caller's
    /// registration always takes precedence over a built-in with the same
    /// code.
    pub fn register(&mut self, handler: Box<dyn CompressionHandler>) {
        let code = handler.code();
        debug!("registering codec '{}' for compression code {}", handler.name(), code);
        self.handlers.insert(code, handler);
    }

    pub fn get(&self, code: u64) -> TiffResult<&dyn CompressionHandler> {
        self.handlers.get(&code).map(|h| h.as_ref()).ok_or(TiffError::UnsupportedCompression(code))
    }

    pub fn is_recognized_but_unimplemented(code: u64) -> bool {
        matches!(
            code as u16,
            compression::LZW
                | compression::JPEG_OLD
                | compression::JPEG
                | compression::CCITT_RLE
                | compression::CCITT_FAX3
                | compression::CCITT_FAX4
                | compression::JPEG2000
                | compression::LERC
        )
    }

    pub fn decompress(&self, code: u64, data: &[u8]) -> TiffResult<Vec<u8>> {
        self.get(code)?.decompress(data)
    }

    pub fn compress(&self, code: u64, data: &[u8]) -> TiffResult<Vec<u8>> {
        self.get(code)?.compress(data)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_ins_cover_none_deflate_packbits_zstd() {
        let registry = CodecRegistry::new();
        assert!(registry.get(compression::NONE as u64).is_ok());
        assert!(registry.get(compression::DEFLATE as u64).is_ok());
        assert!(registry.get(compression::PACKBITS as u64).is_ok());
        assert!(registry.get(compression::ZSTD_VARIANT as u64).is_ok());
        assert!(!CodecRegistry::is_recognized_but_unimplemented(compression::ZSTD_VARIANT as u64));
    }

    #[test]
    fn zstd_round_trips_through_registry() {
        let registry = CodecRegistry::new();
        let original = b"tiffcore zstd round trip".repeat(8);
        let compressed = registry.compress(compression::ZSTD_VARIANT as u64, &original).unwrap();
        let decompressed = registry.decompress(compression::ZSTD_VARIANT as u64, &compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn unregistered_code_is_unsupported_compression() {
        let registry = CodecRegistry::new();
        let err = registry.get(compression::LZW as u64).unwrap_err();
        assert!(matches!(err, TiffError::UnsupportedCompression(_)));
    }

    #[test]
    fn caller_registration_overrides_built_in() {
        struct NoisyUncompressed;
        impl CompressionHandler for NoisyUncompressed {
            fn decompress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
                Ok(data.to_vec())
            }
            fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
                Ok(data.to_vec())
            }
            fn name(&self) -> &'static str {
                "NoisyUncompressed"
            }
            fn code(&self) -> u64 {
                compression::NONE as u64
            }
        }

        let mut registry = CodecRegistry::new();
        registry.register(Box::new(NoisyUncompressed));
        assert_eq!(registry.get(compression::NONE as u64).unwrap().name(), "NoisyUncompressed");
    }
}
