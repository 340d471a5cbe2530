//! Sectioning: cut one tabular input file into ordered, bounded sections
//! and publish them to the file's subject.
//!
//! The sectioner is the only stage that touches raw input. It reads
//! records in order, captures or synthesizes the column headers, buffers
//! rows up to the configured section size, and publishes each full buffer
//! as one section. After the last data row it always publishes an empty
//! terminator section, and it guarantees at least one non-terminator
//! section even for a file with zero data rows, so the reassembler's
//! completeness predicate (two or more sections) can always be satisfied.
//!
//! Failure model: I/O and parse errors abort the stage; sections already
//! published are not retracted. Recovery is a re-run under a fresh task.

use std::fs::File;
use std::io::{BufReader, Read};
use std::mem;
use std::path::Path;

use crate::error::Error;
use crate::section::{codec, synthetic_headers, Row, Section};
use crate::stream::{publish_with_retry, StreamProvider, DEFAULT_PUBLISH_ATTEMPTS};
use crate::task::{FileDescriptor, ReconTask};

/// Rows per non-terminator section when the caller does not choose.
pub const DEFAULT_SECTION_SIZE: usize = 100;

/// Open a tabular input for sectioning, rejecting unsupported extensions.
///
/// # Errors
///
/// [`Error::BadInput`] for a non-`.csv` path, [`Error::Io`] when the file
/// cannot be opened.
pub fn open_csv(path: &Path) -> Result<BufReader<File>, Error> {
    let supported = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !supported {
        return Err(Error::bad_input(format!(
            "unsupported file extension on [{}], only csv is supported",
            path.display()
        )));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Section the file named by `file.path` and publish to `file.id`.
///
/// Returns the number of sections published, terminator included.
///
/// # Errors
///
/// See [`section_reader`], plus [`open_csv`] failures.
pub fn section_file(
    file: &FileDescriptor,
    task: &ReconTask,
    provider: &dyn StreamProvider,
    section_size: usize,
) -> Result<u64, Error> {
    let input = open_csv(&file.path)?;
    section_reader(input, file, task, provider, section_size)
}

/// Section an already-open input and publish to `file.id`.
///
/// Returns the number of sections published, terminator included (always
/// at least two).
///
/// # Errors
///
/// [`Error::BadInput`] for a zero section size, [`Error::Csv`] on a
/// malformed record, [`Error::Stream`] when publishing fails after its
/// retry budget.
pub fn section_reader<R: Read>(
    input: R,
    file: &FileDescriptor,
    task: &ReconTask,
    provider: &dyn StreamProvider,
    section_size: usize,
) -> Result<u64, Error> {
    if section_size == 0 {
        return Err(Error::bad_input("section size must be at least 1"));
    }

    let delimiter = file.delimiter();
    let separator = char::from(delimiter).to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(input);

    let mut headers: Vec<String> = Vec::new();
    let mut buffer: Vec<Row> = Vec::with_capacity(section_size);
    let mut row_number: u64 = 0;
    let mut seq: u64 = 0;
    let mut first_record = true;

    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(str::to_owned).collect();

        if first_record {
            first_record = false;
            if file.has_header_row {
                headers = cells;
                tracing::debug!(file_id = %file.id, columns = headers.len(), "captured header row");
                continue;
            }
            headers = synthetic_headers(cells.len());
        }

        let raw = cells.join(&separator);
        buffer.push(Row::new(row_number, raw, cells));
        row_number += 1;

        if buffer.len() == section_size {
            seq += 1;
            publish_section(
                provider,
                file,
                task,
                &headers,
                seq,
                mem::take(&mut buffer),
                false,
            )?;
            buffer.reserve(section_size);
        }
    }

    tracing::debug!(file_id = %file.id, rows = row_number, "finished reading input");

    // Trailing rows, or an empty first section so that even a file with
    // zero data rows yields a non-terminator before its terminator.
    if !buffer.is_empty() || seq == 0 {
        seq += 1;
        publish_section(
            provider,
            file,
            task,
            &headers,
            seq,
            mem::take(&mut buffer),
            false,
        )?;
    }

    seq += 1;
    publish_section(provider, file, task, &headers, seq, Vec::new(), true)?;

    Ok(seq)
}

fn publish_section(
    provider: &dyn StreamProvider,
    file: &FileDescriptor,
    task: &ReconTask,
    headers: &[String],
    seq: u64,
    rows: Vec<Row>,
    is_terminator: bool,
) -> Result<(), Error> {
    let section = Section {
        id: Section::derive_id(&file.id, seq),
        task_id: task.id.clone(),
        file_id: file.id.clone(),
        seq,
        purpose: file.purpose,
        rows,
        column_headers: headers.to_vec(),
        pairs: task.pairs.clone(),
        config: task.config,
        is_terminator,
    };
    tracing::debug!(
        file_id = %file.id,
        seq,
        rows = section.rows.len(),
        is_terminator,
        "publishing section"
    );
    let payload = codec::encode(&section)?;
    publish_with_retry(provider, &file.id, &payload, DEFAULT_PUBLISH_ATTEMPTS)?;
    Ok(())
}
