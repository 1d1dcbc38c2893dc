//! I/O utilities for CSV reading, writing, encoding, and delimiter resolution.
//!
//! All file I/O flows through this module:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Frames**: whole-file loading of one or more CSV parts into a [`Frame`].
//! - **Digests**: SHA-256 of configuration files for the run manifest.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

use crate::{
    error::{SummaryError, SummaryResult},
    frame::Frame,
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
    }
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(BufWriter::new(file)))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> SummaryResult<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(SummaryError::InvalidData(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> SummaryResult<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> SummaryResult<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    let mut decoded = decode_record(&headers, encoding)?;
    // Strip a UTF-8 byte order mark left on the first header by spreadsheet exports.
    if let Some(first) = decoded.first_mut()
        && let Some(stripped) = first.strip_prefix('\u{feff}')
    {
        *first = stripped.to_string();
    }
    Ok(decoded.into_iter().map(|h| h.trim().to_string()).collect())
}

pub fn read_frame_from_reader<R>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> SummaryResult<Frame>
where
    R: Read,
{
    let mut reader = open_csv_reader(reader, delimiter, true);
    let headers = reader_headers(&mut reader, encoding)?;
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record?;
        let decoded = decode_record(&record, encoding).map_err(|err| {
            SummaryError::InvalidData(format!("Row {}: {err}", row_idx + 2))
        })?;
        rows.push(decoded);
    }
    Frame::new(headers, rows)
}

/// Reads and concatenates every part of one table.
pub fn read_frame(
    paths: &[impl AsRef<Path>],
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> SummaryResult<Frame> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let delimiter = resolve_input_delimiter(path, delimiter);
        let file = File::open(path).map_err(|err| {
            SummaryError::InvalidData(format!("Opening input file {path:?}: {err}"))
        })?;
        let frame = read_frame_from_reader(BufReader::new(file), delimiter, encoding).map_err(
            |err| match err {
                SummaryError::InvalidData(message) => {
                    SummaryError::InvalidData(format!("{path:?}: {message}"))
                }
                other => other,
            },
        )?;
        parts.push(frame);
    }
    Frame::concat(parts)
}

pub fn write_frame(path: &Path, frame: &Frame) -> Result<()> {
    let mut writer = open_csv_writer(path)?;
    writer
        .write_record(frame.columns())
        .with_context(|| format!("Writing header to {path:?}"))?;
    for row in frame.rows() {
        writer
            .write_record(row)
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Reading {path:?} for digest"))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
