//! FASTA to container conversion

use std::io::ErrorKind;
use std::path::Path;

use seq_io::fasta::{Reader, Record};
use serde_json::Value;

use crate::{
    error::{ReadError, Result},
    writer::ContainerWriter,
};

/// Converts a FASTA file into a finalized container
///
/// Each record's id is the first whitespace-delimited token of its header line, and
/// multi-line sequence bodies are joined. The optional `metadata` document is attached
/// to the container.
///
/// Returns the number of records written.
///
/// # Errors
///
/// * `ReadError::FileNotFound` if `input` does not exist
/// * FASTA parse errors and any writer error (for example a repeated id)
pub fn convert_from_fasta<P, Q>(input: P, output: Q, metadata: Option<&Value>) -> Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = input.as_ref();
    let output = output.as_ref();
    tracing::info!(input = %input.display(), output = %output.display(), "Starting conversion");

    let mut reader = match Reader::from_path(input) {
        Ok(reader) => reader,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ReadError::FileNotFound(input.to_path_buf()).into())
        }
        Err(err) => return Err(err.into()),
    };

    let mut writer = ContainerWriter::create(output)?;
    if let Some(metadata) = metadata {
        writer.set_metadata(metadata)?;
    }

    let mut num_records = 0;
    while let Some(record) = reader.next() {
        let record = record?;
        writer.add_record_bytes(record.id()?, &record.full_seq())?;
        num_records += 1;
    }
    writer.finalize()?;

    tracing::info!(records = num_records, "Conversion complete");
    Ok(num_records)
}
