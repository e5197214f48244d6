use std::{path::PathBuf, time::Duration};

/// Custom Result type for cseq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the cseq library, encompassing all possible error cases
/// that can occur while encoding, writing, reading, or loading sequence containers.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors raised by the nibble codec
    CodecError(#[from] CodecError),
    /// Errors related to the fixed container header
    HeaderError(#[from] HeaderError),
    /// Errors related to the index and metadata blocks
    IndexError(#[from] IndexError),
    /// Errors that occur during read operations
    ReadError(#[from] ReadError),
    /// Errors that occur during write operations
    WriteError(#[from] WriteError),
    /// Errors raised by the batch loader and its workers
    LoaderError(#[from] LoaderError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// UTF-8 encoding/decoding errors
    Utf8Error(#[from] std::str::Utf8Error),
    /// Errors from serializing the index or metadata documents
    JsonError(#[from] serde_json::Error),
    /// Errors from the FASTA parser used by the conversion helper
    FastaError(#[from] seq_io::fasta::Error),
    /// Generic errors, typically raised by caller-supplied transforms
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// Returns true if the error denotes a missing file or a missing record id
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReadError(ReadError::FileNotFound(_) | ReadError::MissingRecord(_))
        )
    }

    /// Returns true if the error denotes a malformed container header
    #[must_use]
    pub fn is_corrupt_header(&self) -> bool {
        matches!(self, Self::HeaderError(_))
    }

    /// Returns true if the error denotes a malformed index or metadata block
    #[must_use]
    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, Self::IndexError(_))
    }
}

/// Errors raised when arguments to the codec are malformed
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The input is not valid UTF-8 text
    #[error("Sequence input is not valid text: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The requested symbol count cannot be held by the packed data
    ///
    /// # Fields
    /// * `len` - The requested number of symbols
    /// * `capacity` - The number of symbols the packed data can hold
    #[error("Requested {len} symbols but packed data only holds {capacity}")]
    LengthExceedsData { len: usize, capacity: usize },
}

/// Errors specific to processing and validating the fixed container header
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic tag in the header does not match the expected value
    ///
    /// # Arguments
    /// * `[u8; 4]` - The invalid tag that was found
    #[error("Invalid magic tag: {0:?}")]
    InvalidMagicNumber([u8; 4]),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The reserved byte of the magic tag is not zero
    #[error("Invalid reserved bytes")]
    InvalidReservedBytes,

    /// Fewer bytes than the header size were available
    ///
    /// # Arguments
    /// * First `usize` - The actual number of bytes provided
    /// * Second `usize` - The expected number of bytes
    #[error("Invalid number of bytes provided: {0}. Expected: {1}")]
    InvalidSize(usize, usize),
}

/// Errors raised while loading or validating the index and metadata blocks
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The header still carries the placeholder index offset
    #[error("Container was never finalized (index offset {0})")]
    Unfinalized(u64),

    /// An offset stored in the container points outside the valid range
    ///
    /// # Fields
    /// * `offset` - The stored offset
    /// * `limit` - The largest permissible value
    #[error("Stored offset {offset} lies outside the container (limit {limit})")]
    InvalidOffset { offset: u64, limit: u64 },

    /// The index block could not be parsed
    #[error("Unable to parse index block: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    /// The metadata block could not be parsed
    #[error("Unable to parse metadata block: {0}")]
    InvalidMetadata(#[source] serde_json::Error),

    /// An index entry is inconsistent with the record layout
    #[error("Index entry for '{0}' is inconsistent with the record layout")]
    InvalidEntry(String),
}

/// Errors that can occur while reading records from a container
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The container path does not exist
    #[error("No such file: {0}")]
    FileNotFound(PathBuf),

    /// The path exists but is not a regular file
    #[error("File is not regular: {0}")]
    IncompatibleFile(PathBuf),

    /// The requested id is absent from the index
    #[error("Record id '{0}' not found in the container")]
    MissingRecord(String),

    /// The requested window is outside the record
    #[error("Invalid range {start}..{end} for a record of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    /// The stored checksum does not match the record data
    #[error("Data corruption detected for record '{id}': expected checksum {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { id: String, expected: u32, found: u32 },

    /// The reader was closed before the request
    #[error("Reader is closed")]
    Closed,
}

/// Errors that can occur while writing a container
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// Record ids must be non-empty
    #[error("Record id must be a non-empty string")]
    EmptyId,

    /// The record id has already been written to this container
    #[error("Duplicate record id: {0}")]
    DuplicateId(String),

    /// The container was already finalized
    #[error("Container has already been finalized")]
    AlreadyFinalized,
}

/// Errors raised by the batch loader and its worker pool
#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    /// Batch size must be positive
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    /// At least one worker is required
    #[error("Worker count must be at least one")]
    InvalidWorkerCount,

    /// Tensors of different shapes cannot be stacked
    ///
    /// # Fields
    /// * `expected` - The shape of the first tensor in the batch
    /// * `got` - The first mismatching shape
    #[error("Cannot stack tensor of shape {got:?} onto shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A tensor's data does not fill its declared shape
    #[error("Tensor of shape {shape:?} requires {expected} values, got {got}")]
    InvalidTensor {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    /// No batch arrived within the receive timeout
    #[error("No batch received from workers within {0:?}")]
    WorkerTimeout(Duration),

    /// A worker panicked while processing a chunk
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanic { worker: usize, message: String },

    /// Every worker exited before the epoch completed
    #[error("All workers disconnected before the epoch completed")]
    WorkersDisconnected,
}
