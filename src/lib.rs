//! # cseq
//!
//! An indexed, random-access binary container for nucleotide sequences written in the
//! 16-letter IUPAC alphabet, with a multi-threaded batch loader on top.
//!
//! ## Format
//!
//! ```text
//! [header: 16 bytes][record blocks...][metadata block?][index block]
//! ```
//!
//! * The header carries a magic tag, flags and the byte offset of the index block
//! * Each record block is the packed sequence (two symbols per byte) followed by a
//!   big-endian CRC-32 of the packed bytes
//! * The optional metadata block is a JSON document
//! * The index block is a JSON document mapping every id to
//!   `[offset, stored_length, original_length]`
//!
//! ## Example
//!
//! ```rust
//! use cseq::{ContainerReader, ContainerWriter, Result};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<()> {
//! let mut buffer = Cursor::new(Vec::new());
//! let mut writer = ContainerWriter::new(&mut buffer)?;
//! writer.add_record("seq1", "GATTACA")?;
//! writer.add_record("seq2", "ACGTNRY")?;
//! writer.finalize()?;
//! drop(writer);
//!
//! let mut reader = ContainerReader::new(buffer)?;
//! assert_eq!(reader.get("seq1", true)?, "GATTACA");
//! assert_eq!(reader.get_range("seq2", 3..6)?, "TNR");
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod convert;
mod error;
pub mod header;
pub mod index;
pub mod loader;
mod reader;
mod writer;

pub use convert::convert_from_fasta;
pub use error::{
    CodecError, Error, HeaderError, IndexError, LoaderError, ReadError, Result, WriteError,
};
pub use header::ContainerHeader;
pub use index::{RecordEntry, RecordIndex};
pub use loader::{Batch, BatchLoader, BatchLoaderBuilder, Epoch, Tensor, Transform};
pub use reader::ContainerReader;
pub use writer::ContainerWriter;
