//! Container reader module
//!
//! A [`ContainerReader`] loads the header, index and metadata of a finalized container
//! when it is opened, then serves point lookups and sub-range reads against the
//! underlying storage. Each reader owns its own handle and cursor, so independent
//! readers may share a file across threads without any locking.
//!
//! Full reads may verify the record checksum. Range reads only touch the bytes that
//! cover the requested window and are never verified.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    codec,
    error::{IndexError, ReadError, Result},
    header::ContainerHeader,
    index::{RecordEntry, RecordIndex},
};

/// Random-access reader over a finalized container
///
/// The index and metadata stay available after [`close`](Self::close); only
/// operations that touch the storage fail with `ReadError::Closed`.
#[derive(Debug)]
pub struct ContainerReader<R: Read + Seek> {
    /// Underlying storage, `None` once closed
    inner: Option<R>,

    header: ContainerHeader,
    index: RecordIndex,
    metadata: Option<Value>,

    /// Reusable buffer for packed bytes
    ebuf: Vec<u8>,
}

impl ContainerReader<BufReader<File>> {
    /// Opens the container at `path`
    ///
    /// # Errors
    ///
    /// * `ReadError::FileNotFound` if the path does not exist
    /// * `ReadError::IncompatibleFile` if the path is not a regular file
    /// * `HeaderError` variants if the header is short or malformed
    /// * `IndexError` variants if the index or metadata blocks are malformed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ReadError::FileNotFound(path.to_path_buf()).into())
            }
            Err(err) => return Err(err.into()),
        };
        if !file.metadata()?.is_file() {
            return Err(ReadError::IncompatibleFile(path.to_path_buf()).into());
        }
        let reader = Self::new(BufReader::new(file))?;
        tracing::debug!(
            path = %path.display(),
            records = reader.len(),
            metadata = reader.metadata.is_some(),
            "Opened container"
        );
        Ok(reader)
    }

    /// Opens the container at `path`, runs `f` against it and closes it again
    ///
    /// The reader is closed whether or not `f` succeeds.
    pub fn scoped<P, T, F>(path: P, f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut reader = Self::open(path)?;
        let result = f(&mut reader);
        reader.close();
        result
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Loads the header, index and metadata from `inner`
    pub fn new(mut inner: R) -> Result<Self> {
        inner.rewind()?;
        let header = ContainerHeader::from_reader(&mut inner)?;
        if !header.is_finalized() {
            return Err(IndexError::Unfinalized(header.index_offset).into());
        }

        let end = inner.seek(SeekFrom::End(0))?;
        let index_offset = header.index_offset;
        if index_offset > end {
            return Err(IndexError::InvalidOffset {
                offset: index_offset,
                limit: end,
            }
            .into());
        }

        inner.seek(SeekFrom::Start(index_offset))?;
        let mut ibuf = Vec::new();
        inner.read_to_end(&mut ibuf)?;
        let index = RecordIndex::from_slice(&ibuf, index_offset)?;

        let metadata = match index.metadata_offset() {
            Some(offset) => {
                inner.seek(SeekFrom::Start(offset))?;
                let mut mbuf = vec![0u8; (index_offset - offset) as usize];
                inner.read_exact(&mut mbuf)?;
                let document = serde_json::from_slice(&mbuf).map_err(IndexError::InvalidMetadata)?;
                Some(document)
            }
            None => None,
        };

        Ok(Self {
            inner: Some(inner),
            header,
            index,
            metadata,
            ebuf: Vec::new(),
        })
    }

    fn lookup(&self, id: &str) -> Result<RecordEntry> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ReadError::MissingRecord(id.to_string()).into())
    }

    /// Reads `len` packed bytes at `pos` into the internal buffer
    fn fill_buffer(&mut self, pos: u64, len: usize) -> Result<&mut R> {
        let inner = self.inner.as_mut().ok_or(ReadError::Closed)?;
        inner.seek(SeekFrom::Start(pos))?;
        self.ebuf.resize(len, 0);
        inner.read_exact(&mut self.ebuf)?;
        Ok(inner)
    }

    /// Decodes the record `id` and appends it to `dbuf`
    ///
    /// With `checksum_check` set the trailing checksum is read as well and
    /// compared against the packed data.
    pub fn get_into(&mut self, id: &str, checksum_check: bool, dbuf: &mut String) -> Result<()> {
        if self.inner.is_none() {
            return Err(ReadError::Closed.into());
        }
        let entry = self.lookup(id)?;
        let inner = self.fill_buffer(entry.offset, entry.data_len())?;
        if checksum_check {
            let expected = inner.read_u32::<BigEndian>()?;
            let found = codec::checksum(&self.ebuf);
            if found != expected {
                return Err(ReadError::ChecksumMismatch {
                    id: id.to_string(),
                    expected,
                    found,
                }
                .into());
            }
        }
        codec::decode_into(&self.ebuf, entry.len(), dbuf)
    }

    /// Decodes the full record `id`
    ///
    /// # Errors
    ///
    /// * `ReadError::MissingRecord` if `id` is not in the index
    /// * `ReadError::ChecksumMismatch` if `checksum_check` is set and the data is corrupt
    /// * `ReadError::Closed` if the reader was closed
    pub fn get(&mut self, id: &str, checksum_check: bool) -> Result<String> {
        let mut dbuf = String::new();
        self.get_into(id, checksum_check, &mut dbuf)?;
        Ok(dbuf)
    }

    /// Decodes the symbols in `range` of record `id`
    ///
    /// Only the bytes covering the window are read. A window starting at an odd
    /// position begins at the low nibble of its first byte.
    ///
    /// # Errors
    ///
    /// * `ReadError::MissingRecord` if `id` is not in the index
    /// * `ReadError::InvalidRange` if the range is empty or extends past the record
    pub fn get_range(&mut self, id: &str, range: Range<usize>) -> Result<String> {
        if self.inner.is_none() {
            return Err(ReadError::Closed.into());
        }
        let entry = self.lookup(id)?;
        let Range { start, end } = range;
        if start >= end || end > entry.len() {
            return Err(ReadError::InvalidRange {
                start,
                end,
                len: entry.len(),
            }
            .into());
        }

        let byte_start = start / 2;
        let byte_end = end.div_ceil(2);
        self.fill_buffer(entry.offset + byte_start as u64, byte_end - byte_start)?;

        let mut dbuf = String::with_capacity(end - start);
        codec::decode_window_into(&self.ebuf, start % 2, end - start, &mut dbuf)?;
        Ok(dbuf)
    }

    /// All record ids in sorted order
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.index.ids().map(str::to_string).collect()
    }

    /// Iterates record ids in sorted order without allocating
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.ids()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Number of symbols in record `id`, answered from the index
    pub fn get_length(&self, id: &str) -> Result<usize> {
        self.lookup(id).map(|entry| entry.len())
    }

    /// The raw index entry for `id`
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&RecordEntry> {
        self.index.get(id)
    }

    /// The metadata document, if the container carries one
    #[must_use]
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Deserializes the metadata document into `T`
    pub fn metadata_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.metadata {
            Some(document) => Ok(Some(serde_json::from_value(document.clone())?)),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Releases the underlying handle; calling it again does nothing
    pub fn close(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod testing {
    use std::fs::OpenOptions;
    use std::io::{Cursor, Write};
    use std::path::PathBuf;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::{header::SIZE_HEADER, ContainerWriter, Error, HeaderError};

    const SEQUENCES: [(&str, &str); 4] = [
        ("seq1_regular", "GATTACAGATTACAGATTACAGATTACAGATTACA"),
        ("seq2_odd_length", "GATTACAGATTACAGATTACAGATTACAGATTAC"),
        ("seq3_ambiguous", "ACGTMRWSYKVHDBN"),
        ("seq4_short", "A"),
    ];

    fn write_fixture(dir: &tempfile::TempDir) -> Result<PathBuf> {
        let path = dir.path().join("fixture.cseq");
        let mut writer = ContainerWriter::create(&path)?;
        for (id, sequence) in SEQUENCES {
            writer.add_record(id, sequence)?;
        }
        writer.set_metadata(&json!({
            "project": "round trip",
            "version": 1.0,
            "tags": ["a", "b"],
            "nested": {"flag": true},
        }))?;
        writer.finalize()?;
        Ok(path)
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let mut reader = ContainerReader::open(&path)?;

        assert_eq!(reader.len(), SEQUENCES.len());
        let mut expected: Vec<_> = SEQUENCES.iter().map(|(id, _)| id.to_string()).collect();
        expected.sort();
        assert_eq!(reader.list_ids(), expected);

        for (id, sequence) in SEQUENCES {
            assert!(reader.contains(id));
            assert_eq!(reader.get(id, true)?, sequence);
            assert_eq!(reader.get(id, false)?, sequence);
            assert_eq!(reader.get_length(id)?, sequence.len());
        }

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata["project"], "round trip");
        assert_eq!(metadata["nested"]["flag"], true);
        Ok(())
    }

    #[test]
    fn test_typed_metadata() -> Result<()> {
        #[derive(Deserialize)]
        struct Info {
            project: String,
            tags: Vec<String>,
        }
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let info: Info = ContainerReader::scoped(&path, |reader| reader.metadata_as())?.unwrap();
        assert_eq!(info.project, "round trip");
        assert_eq!(info.tags, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_range_matches_slice() -> Result<()> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = ContainerWriter::new(&mut buffer)?;
            for (id, sequence) in SEQUENCES {
                writer.add_record(id, sequence)?;
            }
        }
        let mut reader = ContainerReader::new(buffer)?;
        for (id, sequence) in SEQUENCES {
            for start in 0..sequence.len() {
                for end in start + 1..=sequence.len() {
                    assert_eq!(
                        reader.get_range(id, start..end)?,
                        &sequence[start..end],
                        "{id}[{start}..{end}]"
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_invalid_ranges() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let mut reader = ContainerReader::open(&path)?;
        for range in [3..3, 5..2, 0..16, 15..16] {
            let err = reader.get_range("seq3_ambiguous", range).unwrap_err();
            assert!(matches!(
                err,
                Error::ReadError(ReadError::InvalidRange { len: 15, .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_missing_record() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let mut reader = ContainerReader::open(&path)?;
        assert!(reader.get("absent", false).unwrap_err().is_not_found());
        assert!(reader.get_range("absent", 0..1).unwrap_err().is_not_found());
        assert!(reader.get_length("absent").unwrap_err().is_not_found());
        assert!(reader.entry("absent").is_none());
        Ok(())
    }

    #[test]
    fn test_checksum_detects_corruption() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let offset = ContainerReader::scoped(&path, |reader| {
            Ok(reader.entry("seq3_ambiguous").unwrap().offset)
        })?;

        let mut file = OpenOptions::new().write(true).open(&path)?;
        file.seek(SeekFrom::Start(offset + 2))?;
        file.write_all(&[0xFF])?;
        drop(file);

        let mut reader = ContainerReader::open(&path)?;
        let err = reader.get("seq3_ambiguous", true).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::ChecksumMismatch { ref id, .. }) if id == "seq3_ambiguous"
        ));
        // unverified reads return whatever the bytes decode to
        assert_ne!(reader.get("seq3_ambiguous", false)?, "ACGTMRWSYKVHDBN");
        assert_eq!(reader.get("seq1_regular", true)?, SEQUENCES[0].1);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = ContainerReader::open("/nonexistent/container.cseq").unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, Error::ReadError(ReadError::FileNotFound(_))));
    }

    #[test]
    fn test_directory_is_incompatible() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = ContainerReader::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ReadError(ReadError::IncompatibleFile(_))));
        Ok(())
    }

    #[test]
    fn test_corrupt_header() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let short = dir.path().join("short.cseq");
        std::fs::write(&short, b"CSEQ\x01\x00\x00")?;
        let err = ContainerReader::open(&short).unwrap_err();
        assert!(err.is_corrupt_header());
        assert!(matches!(err, Error::HeaderError(HeaderError::InvalidSize(7, SIZE_HEADER))));

        let empty = dir.path().join("empty.cseq");
        std::fs::write(&empty, b"")?;
        assert!(ContainerReader::open(&empty).unwrap_err().is_corrupt_header());

        let path = write_fixture(&dir)?;
        let mut bytes = std::fs::read(&path)?;
        bytes[..4].copy_from_slice(b"FAKE");
        std::fs::write(&path, &bytes)?;
        let err = ContainerReader::open(&path).unwrap_err();
        assert!(matches!(err, Error::HeaderError(HeaderError::InvalidMagicNumber(_))));
        Ok(())
    }

    #[test]
    fn test_corrupt_index() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let mut bytes = std::fs::read(&path)?;
        let len = bytes.len();
        bytes.truncate(len - 3);
        std::fs::write(&path, &bytes)?;
        let err = ContainerReader::open(&path).unwrap_err();
        assert!(err.is_corrupt_index());
        assert!(matches!(err, Error::IndexError(IndexError::InvalidDocument(_))));

        let mut bytes = bytes;
        bytes[8..16].copy_from_slice(&u64::MAX.to_be_bytes());
        let err = ContainerReader::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::IndexError(IndexError::InvalidOffset { .. })));
        Ok(())
    }

    #[test]
    fn test_unfinalized_container() -> Result<()> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = ContainerWriter::new(&mut buffer)?;
            writer.add_record("a", "ACGT")?;
            writer.flush()?;
            std::mem::forget(writer);
        }
        let err = ContainerReader::new(buffer).unwrap_err();
        assert!(matches!(err, Error::IndexError(IndexError::Unfinalized(0))));
        Ok(())
    }

    #[test]
    fn test_empty_container() -> Result<()> {
        let mut buffer = Cursor::new(Vec::new());
        ContainerWriter::new(&mut buffer)?.finalize()?;
        let reader = ContainerReader::new(buffer)?;
        assert!(reader.is_empty());
        assert!(reader.metadata().is_none());
        assert!(reader.header().is_finalized());
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_fixture(&dir)?;
        let mut reader = ContainerReader::open(&path)?;
        reader.close();
        reader.close();
        assert!(!reader.is_open());
        assert!(matches!(
            reader.get("seq4_short", false).unwrap_err(),
            Error::ReadError(ReadError::Closed)
        ));
        assert_eq!(reader.get_length("seq4_short")?, 1);
        assert_eq!(reader.len(), SEQUENCES.len());
        Ok(())
    }
}
