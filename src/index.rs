//! Record index for cseq containers
//!
//! The index maps every record id to the location and dimensions of its data block.
//! It is assembled incrementally by the writer, serialized as a JSON document at the
//! end of the container, and loaded wholesale when a reader opens the container.
//!
//! ```text
//! {"index": {"seq1": [16, 8, 7], ...}, "metadata_offset": 40}
//! ```
//!
//! Ids are kept in a `BTreeMap`, so the serialized key order is deterministic.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{
    codec::{packed_len, CHECKSUM_SIZE},
    error::{IndexError, Result, WriteError},
    header::SIZE_HEADER,
};

/// Location and dimensions of one record's data block
///
/// Serialized as the array `[offset, stored_length, original_length]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 3]", into = "[u64; 3]")]
pub struct RecordEntry {
    /// Absolute byte position of the first data byte
    pub offset: u64,

    /// Packed data length plus the trailing checksum
    pub stored_length: u64,

    /// Number of symbols in the record
    pub original_length: u64,
}
impl RecordEntry {
    /// Creates the entry for a record of `original_length` symbols written at `offset`
    #[must_use]
    pub fn new(offset: u64, original_length: u64) -> Self {
        Self {
            offset,
            stored_length: (packed_len(original_length as usize) + CHECKSUM_SIZE) as u64,
            original_length,
        }
    }

    /// Number of packed data bytes, excluding the checksum
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.stored_length as usize - CHECKSUM_SIZE
    }

    /// Number of symbols in the record
    #[must_use]
    pub fn len(&self) -> usize {
        self.original_length as usize
    }

    /// Returns true if the record holds no symbols
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original_length == 0
    }

    /// Byte position one past the trailing checksum
    ///
    /// Only meaningful for entries built by the writer or validated on load.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.stored_length
    }

    /// Checks that the entry describes a block between the header and `limit`
    fn is_consistent(&self, limit: u64) -> bool {
        let expected = (packed_len(self.len()) + CHECKSUM_SIZE) as u64;
        self.stored_length == expected
            && self.offset >= SIZE_HEADER as u64
            && self
                .offset
                .checked_add(self.stored_length)
                .is_some_and(|end| end <= limit)
    }
}
impl From<[u64; 3]> for RecordEntry {
    fn from(value: [u64; 3]) -> Self {
        Self {
            offset: value[0],
            stored_length: value[1],
            original_length: value[2],
        }
    }
}
impl From<RecordEntry> for [u64; 3] {
    fn from(entry: RecordEntry) -> Self {
        [entry.offset, entry.stored_length, entry.original_length]
    }
}

/// On-disk form of the index block
#[derive(Debug, Deserialize)]
struct IndexDocument {
    index: BTreeMap<String, RecordEntry>,
    #[serde(default)]
    metadata_offset: Option<u64>,
}

/// Mapping from record id to [`RecordEntry`]
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    entries: BTreeMap<String, RecordEntry>,
    metadata_offset: Option<u64>,
}
impl RecordIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, rejecting empty and previously used ids
    pub fn insert(&mut self, id: &str, entry: RecordEntry) -> Result<()> {
        self.check_id(id)?;
        self.entries.insert(id.to_string(), entry);
        Ok(())
    }

    /// Validates an id without inserting it
    pub fn check_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(WriteError::EmptyId.into());
        }
        if self.entries.contains_key(id) {
            return Err(WriteError::DuplicateId(id.to_string()).into());
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RecordEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Byte position of the metadata block, if the container carries one
    #[must_use]
    pub fn metadata_offset(&self) -> Option<u64> {
        self.metadata_offset
    }

    pub fn set_metadata_offset(&mut self, offset: Option<u64>) {
        self.metadata_offset = offset;
    }

    /// Serializes the index block to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            index: &'a BTreeMap<String, RecordEntry>,
            #[serde(skip_serializing_if = "Option::is_none")]
            metadata_offset: Option<u64>,
        }
        serde_json::to_writer(
            writer,
            &Borrowed {
                index: &self.entries,
                metadata_offset: self.metadata_offset,
            },
        )?;
        Ok(())
    }

    /// Parses an index block found at `index_offset`
    ///
    /// Every entry must lie between the header and the index block, and the metadata
    /// offset (if any) must precede the index block.
    pub fn from_slice(buffer: &[u8], index_offset: u64) -> Result<Self> {
        let document: IndexDocument =
            serde_json::from_slice(buffer).map_err(IndexError::InvalidDocument)?;
        if let Some((id, _)) = document
            .index
            .iter()
            .find(|(_, entry)| !entry.is_consistent(index_offset))
        {
            return Err(IndexError::InvalidEntry(id.clone()).into());
        }
        if let Some(offset) = document.metadata_offset {
            if offset < SIZE_HEADER as u64 || offset > index_offset {
                return Err(IndexError::InvalidOffset {
                    offset,
                    limit: index_offset,
                }
                .into());
            }
        }
        Ok(Self {
            entries: document.index,
            metadata_offset: document.metadata_offset,
        })
    }
}
