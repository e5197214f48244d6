//! Container writer module
//!
//! This module builds finalized containers from a stream of `(id, sequence)` pairs.
//! The writer moves through a simple state machine:
//!
//! ```text
//! Writing (0..N add_record) ──finalize()──▶ Finalized
//! ```
//!
//! Records are appended as they arrive; each record is its packed nibble data followed by
//! a big-endian CRC-32 of that data. Finalizing writes the optional metadata block and
//! the index block, then patches the header's index offset in place.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;
use serde_json::Value;

use crate::{
    codec,
    error::{CodecError, Result, WriteError},
    header::{ContainerHeader, INDEX_OFFSET_POS, SIZE_HEADER},
    index::{RecordEntry, RecordIndex},
};

/// Lifecycle of a [`ContainerWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Writing,
    Finalized,
}

/// Writes a packed data block followed by its checksum
fn write_block<W: Write>(writer: &mut W, ebuf: &[u8], checksum: u32) -> Result<()> {
    writer.write_all(ebuf)?;
    writer.write_u32::<BigEndian>(checksum)?;
    Ok(())
}

/// Sequential, append-only builder for container files
///
/// The writer owns its output exclusively until it is finalized. An unfinalized
/// container carries a placeholder index offset and must not be opened for reading.
///
/// Dropping a writer that was never finalized finalizes it.
///
/// # Type Parameters
///
/// * `W` - The underlying output; it must be seekable so the header can be patched
#[derive(Debug)]
pub struct ContainerWriter<W: Write + Seek> {
    /// The underlying output
    inner: W,

    /// Entries of every committed record
    index: RecordIndex,

    /// Metadata document flushed at finalize
    metadata: Option<Value>,

    /// Reusable buffer for packed nucleotides
    ebuf: Vec<u8>,

    /// Byte position of the next write
    pos: u64,

    state: WriterState,
}

impl ContainerWriter<BufWriter<File>> {
    /// Creates (or truncates) the file at `path` and writes the placeholder header
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Creating container");
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Creates a writer over `inner`, writing the placeholder header at its start
    pub fn new(mut inner: W) -> Result<Self> {
        inner.rewind()?;
        ContainerHeader::placeholder().write_bytes(&mut inner)?;
        Ok(Self {
            inner,
            index: RecordIndex::new(),
            metadata: None,
            ebuf: Vec::new(),
            pos: SIZE_HEADER as u64,
            state: WriterState::Writing,
        })
    }

    fn ensure_writing(&self) -> Result<()> {
        match self.state {
            WriterState::Writing => Ok(()),
            WriterState::Finalized => Err(WriteError::AlreadyFinalized.into()),
        }
    }

    /// Encodes and appends a record
    ///
    /// # Errors
    ///
    /// * `WriteError::AlreadyFinalized` if the writer was finalized
    /// * `WriteError::EmptyId` if `id` is empty
    /// * `WriteError::DuplicateId` if `id` was already written
    ///
    /// Rejected records leave the output and the index untouched.
    pub fn add_record(&mut self, id: &str, sequence: &str) -> Result<()> {
        self.ensure_writing()?;
        self.index.check_id(id)?;
        self.ebuf.clear();
        let len = codec::encode_into(sequence, &mut self.ebuf);
        self.commit(id, len)
    }

    /// Encodes and appends a record given as raw bytes
    ///
    /// Fails with `CodecError::InvalidUtf8` if the bytes are not text.
    pub fn add_record_bytes(&mut self, id: &str, sequence: &[u8]) -> Result<()> {
        let sequence = std::str::from_utf8(sequence).map_err(CodecError::InvalidUtf8)?;
        self.add_record(id, sequence)
    }

    /// Writes the encoded buffer and registers its entry
    fn commit(&mut self, id: &str, len: usize) -> Result<()> {
        let checksum = codec::checksum(&self.ebuf);
        let entry = RecordEntry::new(self.pos, len as u64);
        if let Err(err) = write_block(&mut self.inner, &self.ebuf, checksum) {
            // a partial block is overwritten by the next record
            if let Err(seek_err) = self.inner.seek(SeekFrom::Start(self.pos)) {
                tracing::warn!(error = %seek_err, "Unable to rewind after failed write");
            }
            return Err(err);
        }
        self.pos = entry.end();
        self.index.insert(id, entry)
    }

    /// Stores a metadata document to be written at finalize
    ///
    /// Later calls replace earlier ones.
    pub fn set_metadata<T: Serialize + ?Sized>(&mut self, metadata: &T) -> Result<()> {
        self.ensure_writing()?;
        self.metadata = Some(serde_json::to_value(metadata)?);
        Ok(())
    }

    /// Writes the metadata and index blocks and patches the header
    ///
    /// Calling this more than once is a no-op. The writer is considered finalized
    /// even if an I/O error interrupts this call.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == WriterState::Finalized {
            return Ok(());
        }
        self.state = WriterState::Finalized;

        let metadata_offset = match self.metadata.take() {
            Some(metadata) => {
                let offset = self.pos;
                let bytes = serde_json::to_vec(&metadata)?;
                self.inner.write_all(&bytes)?;
                self.pos += bytes.len() as u64;
                Some(offset)
            }
            None => None,
        };
        self.index.set_metadata_offset(metadata_offset);

        let index_offset = self.pos;
        let mut ibuf = Vec::new();
        self.index.write_to(&mut ibuf)?;
        self.inner.write_all(&ibuf)?;
        self.pos += ibuf.len() as u64;

        self.inner.seek(SeekFrom::Start(INDEX_OFFSET_POS))?;
        self.inner.write_u64::<BigEndian>(index_offset)?;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        self.inner.flush()?;

        tracing::debug!(
            records = self.index.len(),
            index_offset,
            metadata = metadata_offset.is_some(),
            "Finalized container"
        );
        Ok(())
    }

    /// Number of records committed so far
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.index.len()
    }

    /// Returns true if a record with `id` was committed
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Byte position at which the next block will be written
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finalized
    }

    /// Flushes buffered bytes to the underlying output
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for ContainerWriter<W> {
    fn drop(&mut self) {
        if let Err(err) = self.finalize() {
            tracing::warn!(error = %err, "Failed to finalize container on drop");
        }
    }
}
