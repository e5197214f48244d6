//! Header module for the cseq library
//!
//! This module provides the fixed-size header found at the start of every container.
//! The header identifies the format and records where the index block begins. It is
//! written with a placeholder index offset when the container is created and patched
//! in place once the container is finalized.

use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};

use crate::error::{HeaderError, Result};

/// Format identifier: "CSEQ" in ASCII
///
/// Stored in the first four bytes of the magic tag.
const MAGIC: [u8; 4] = *b"CSEQ";

/// Current format version of the container format
///
/// Stored in the fifth byte of the magic tag. The sixth byte is reserved and zero.
const FORMAT: u8 = 1;

/// Value of the reserved sixth byte of the magic tag
const RESERVED: u8 = 0;

/// Default flags written into new containers
const DEFAULT_FLAGS: u16 = 1;

/// Size of the magic tag in bytes
pub const SIZE_MAGIC: usize = 6;

/// Size of the header in bytes
pub const SIZE_HEADER: usize = 16;

/// Byte position of the index offset field within the header
pub const INDEX_OFFSET_POS: u64 = 8;

/// Header structure for container files
///
/// All multi-byte fields are big-endian.
///
/// | Offset | Size | Field        |
/// | ------ | ---- | ------------ |
/// | 0      | 6    | magic tag    |
/// | 6      | 2    | flags        |
/// | 8      | 8    | index offset |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Format identifier followed by the version byte and a reserved byte
    ///
    /// 6 bytes
    pub magic: [u8; SIZE_MAGIC],

    /// Format flags
    ///
    /// 2 bytes
    pub flags: u16,

    /// Absolute byte position of the index block
    ///
    /// 8 bytes
    pub index_offset: u64,
}
impl Default for ContainerHeader {
    fn default() -> Self {
        Self::new(0)
    }
}
impl ContainerHeader {
    /// Creates a new header pointing at the given index offset
    #[must_use]
    pub fn new(index_offset: u64) -> Self {
        let mut magic = [0u8; SIZE_MAGIC];
        magic[..4].copy_from_slice(&MAGIC);
        magic[4] = FORMAT;
        magic[5] = RESERVED;
        Self {
            magic,
            flags: DEFAULT_FLAGS,
            index_offset,
        }
    }

    /// Creates the header written when a container is first created
    ///
    /// The index offset is zero until the container is finalized.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(0)
    }

    /// Format version stored in the magic tag
    #[must_use]
    pub fn format(&self) -> u8 {
        self.magic[4]
    }

    /// Returns true if the index offset has been patched by a finalized writer
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.index_offset >= SIZE_HEADER as u64
    }

    /// Parses a header from a fixed-size byte array
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The format identifier is incorrect
    /// * The format version is unsupported
    /// * The reserved byte is not zero
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&buffer[0..4]);
        if tag != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(tag).into());
        }
        let format = buffer[4];
        if format != FORMAT {
            return Err(HeaderError::InvalidFormatVersion(format).into());
        }
        if buffer[5] != RESERVED {
            return Err(HeaderError::InvalidReservedBytes.into());
        }
        let mut magic = [0u8; SIZE_MAGIC];
        magic.copy_from_slice(&buffer[0..SIZE_MAGIC]);
        Ok(Self {
            magic,
            flags: BigEndian::read_u16(&buffer[6..8]),
            index_offset: BigEndian::read_u64(&buffer[8..16]),
        })
    }

    /// Parses a header from an arbitrarily sized buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is smaller than `SIZE_HEADER` or
    /// contains invalid header data (see `from_bytes`).
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < SIZE_HEADER {
            return Err(HeaderError::InvalidSize(buffer.len(), SIZE_HEADER).into());
        }
        let mut bytes = [0u8; SIZE_HEADER];
        bytes.copy_from_slice(&buffer[..SIZE_HEADER]);
        Self::from_bytes(&bytes)
    }

    /// Writes the header to a writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        buffer[0..SIZE_MAGIC].copy_from_slice(&self.magic);
        BigEndian::write_u16(&mut buffer[6..8], self.flags);
        BigEndian::write_u64(&mut buffer[8..16], self.index_offset);
        writer.write_all(&buffer)?;
        Ok(())
    }

    /// Reads a header from a reader
    ///
    /// Short input is reported as `HeaderError::InvalidSize` rather than an I/O error.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = Vec::with_capacity(SIZE_HEADER);
        reader
            .take(SIZE_HEADER as u64)
            .read_to_end(&mut buffer)?;
        Self::from_buffer(&buffer)
    }
}
