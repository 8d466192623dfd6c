//! Random-access byte stream with a switchable byte order
//!
//! `ByteStream` is the single shared mutable resource a Reader or Writer
//! owns: every multi-byte read or write goes through its current
//! `ByteOrderHandler`, and its cursor is single-owner (§5 of the design:
//! operations serialize through the owner).

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::io::byte_order::{ByteOrder, ByteOrderHandler};
use crate::io::seekable::SeekableReader;
use crate::tiff::errors::{TiffError, TiffResult};

/// Backing storage for a ByteStream: a file on disk or an in-memory buffer.
/// The in-memory form exists mainly for building synthetic TIFFs in tests.
enum Backing {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl Read for Backing {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Backing::File(f) => f.read(buf),
            Backing::Memory(c) => c.read(buf),
        }
    }
}

impl Write for Backing {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Backing::File(f) => f.write(buf),
            Backing::Memory(c) => c.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Backing::File(f) => f.flush(),
            Backing::Memory(c) => c.flush(),
        }
    }
}

impl Seek for Backing {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            Backing::File(f) => f.seek(pos),
            Backing::Memory(c) => c.seek(pos),
        }
    }
}

/// A random-access cursor over a file or memory region, with a byte-order
/// attribute that governs every multi-byte read/write.
pub struct ByteStream {
    backing: Backing,
    handler: Box<dyn ByteOrderHandler>,
    order: ByteOrder,
}

impl ByteStream {
    /// Open an existing file read/write.
    pub fn open(path: &Path) -> TiffResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_backing(Backing::File(file), ByteOrder::LittleEndian))
    }

    /// Open an existing file read-only.
    pub fn open_read_only(path: &Path) -> TiffResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_backing(Backing::File(file), ByteOrder::LittleEndian))
    }

    /// Create (truncating) a new file for writing.
    pub fn create(path: &Path) -> TiffResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_backing(Backing::File(file), ByteOrder::LittleEndian))
    }

    /// Wrap an in-memory buffer (tests, or round-tripping without touching disk).
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::from_backing(Backing::Memory(Cursor::new(data)), ByteOrder::LittleEndian)
    }

    /// Consume the stream, returning the in-memory buffer if it was memory-backed.
    pub fn into_memory(self) -> Option<Vec<u8>> {
        match self.backing {
            Backing::Memory(c) => Some(c.into_inner()),
            Backing::File(_) => None,
        }
    }

    fn from_backing(backing: Backing, order: ByteOrder) -> Self {
        ByteStream {
            backing,
            handler: order.create_handler(),
            order,
        }
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
        self.handler = order.create_handler();
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn handler(&self) -> &dyn ByteOrderHandler {
        self.handler.as_ref()
    }

    pub fn seek(&mut self, offset: u64) -> TiffResult<()> {
        self.backing.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn position(&mut self) -> TiffResult<u64> {
        Ok(self.backing.seek(SeekFrom::Current(0))?)
    }

    pub fn length(&mut self) -> TiffResult<u64> {
        let current = self.position()?;
        let len = self.backing.seek(SeekFrom::End(0))?;
        self.backing.seek(SeekFrom::Start(current))?;
        Ok(len)
    }

    /// Seek to end-of-stream, for appending.
    pub fn seek_to_end(&mut self) -> TiffResult<u64> {
        Ok(self.backing.seek(SeekFrom::End(0))?)
    }

    pub fn read_u8(&mut self) -> TiffResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> TiffResult<u16> {
        self.handler.read_u16(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_u32(&mut self) -> TiffResult<u32> {
        self.handler.read_u32(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_u64(&mut self) -> TiffResult<u64> {
        self.handler.read_u64(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_f32(&mut self) -> TiffResult<f32> {
        self.handler.read_f32(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_f64(&mut self) -> TiffResult<f64> {
        self.handler.read_f64(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_rational(&mut self) -> TiffResult<(u32, u32)> {
        self.handler.read_rational(&mut self.backing).map_err(TiffError::IoError)
    }

    pub fn read_srational(&mut self) -> TiffResult<(i32, i32)> {
        self.handler.read_srational(&mut self.backing).map_err(TiffError::IoError)
    }

    /// Read `n` bytes at the current position.
    pub fn read_bytes(&mut self, n: usize) -> TiffResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read `n` bytes at a given offset, restoring the prior position.
    pub fn read_at(&mut self, offset: u64, n: usize) -> TiffResult<Vec<u8>> {
        let saved = self.position()?;
        self.seek(offset)?;
        let result = self.read_bytes(n);
        self.seek(saved)?;
        result
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> TiffResult<()> {
        self.backing.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TiffError::CorruptedData("truncated read past end of stream".to_string())
            } else {
                TiffError::IoError(e)
            }
        })
    }

    pub fn write_u8(&mut self, value: u8) -> TiffResult<()> {
        self.backing.write_all(&[value])?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> TiffResult<()> {
        self.handler.write_u16(&mut self.backing, value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> TiffResult<()> {
        self.handler.write_u32(&mut self.backing, value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> TiffResult<()> {
        self.handler.write_u64(&mut self.backing, value)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> TiffResult<()> {
        self.backing.write_all(data)?;
        Ok(())
    }

    pub fn flush(&mut self) -> TiffResult<()> {
        self.backing.flush()?;
        Ok(())
    }
}

/// Detects the byte order from a stream positioned at its start, without
/// consuming more than the 2-byte marker. Mirrors `ByteOrder::detect` in
/// `io::byte_order`, adapted to work against any `SeekableReader`.
pub fn detect_byte_order(reader: &mut dyn SeekableReader) -> TiffResult<ByteOrder> {
    ByteOrder::detect(reader)
}
