//! Reader for the tab-separated results manifest (`SearchResults.txt`).
//!
//! The first line is a header and is discarded. Every other line holds
//! exactly [`FIELD_COUNT`] fields; fields are never quoted.

use super::error::ManifestError;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use triage_db::FileTimes;

/// Number of fields in every manifest row.
pub const FIELD_COUNT: usize = 14;

/// One flagged file from the manifest. Numeric fields stay as text until a
/// consumer needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// 1-based line number in the manifest
    pub line: usize,
    pub vhd_filename: String,
    pub fs_offset: String,
    pub meta_address: String,
    pub extract_status: String,
    pub rule_set_name: String,
    pub rule_name: String,
    pub description: String,
    pub filename: String,
    pub parent_path: String,
    pub extracted_file_path: String,
    pub crtime: String,
    pub mtime: String,
    pub atime: String,
    pub ctime: String,
}

impl ManifestRow {
    fn from_record(record: &csv::StringRecord, line: usize) -> Result<Self, ManifestError> {
        if record.len() != FIELD_COUNT {
            return Err(ManifestError::FieldCount {
                line,
                actual: record.len(),
                expected: FIELD_COUNT,
            });
        }
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        // CRLF lines keep the carriage return on the last field
        let last = record
            .get(FIELD_COUNT - 1)
            .unwrap_or_default()
            .trim_end_matches('\r')
            .to_string();
        Ok(Self {
            line,
            vhd_filename: field(0),
            fs_offset: field(1),
            meta_address: field(2),
            extract_status: field(3),
            rule_set_name: field(4),
            rule_name: field(5),
            description: field(6),
            filename: field(7),
            parent_path: field(8),
            extracted_file_path: field(9),
            crtime: field(10),
            mtime: field(11),
            atime: field(12),
            ctime: last,
        })
    }

    pub fn meta_address_value(&self) -> Result<i64, ManifestError> {
        self.number("metaAddress", &self.meta_address)
    }

    pub fn fs_offset_value(&self) -> Result<i64, ManifestError> {
        self.number("fsOffset", &self.fs_offset)
    }

    /// The four timestamps, seconds since the Unix epoch.
    pub fn times(&self) -> Result<FileTimes, ManifestError> {
        Ok(FileTimes {
            crtime: self.number("crtime", &self.crtime)?,
            mtime: self.number("mtime", &self.mtime)?,
            atime: self.number("atime", &self.atime)?,
            ctime: self.number("ctime", &self.ctime)?,
        })
    }

    fn number(&self, field: &'static str, value: &str) -> Result<i64, ManifestError> {
        value
            .trim()
            .parse()
            .map_err(|_| ManifestError::InvalidNumber {
                line: self.line,
                field,
                value: value.to_string(),
            })
    }
}

/// Streaming manifest reader yielding one [`ManifestRow`] per data line.
///
/// A blank line is a row with one empty field and fails the field count.
pub struct ManifestReader<R: Read> {
    records: csv::StringRecordsIntoIter<Terminated<R>>,
    /// Line the next row is expected on
    next_line: usize,
    /// Row found after a blank line, yielded on the next call
    pending: Option<(csv::StringRecord, usize)>,
    finished: bool,
}

impl ManifestReader<File> {
    /// Open a manifest file.
    pub fn open(path: &Path) -> Result<Self, ManifestError> {
        if !path.is_file() {
            return Err(ManifestError::Missing {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            });
        }
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> ManifestReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(Terminated::new(reader))
            .into_records();
        Self {
            records,
            next_line: 2,
            pending: None,
            finished: false,
        }
    }

    /// Lines consumed so far. Every record ends on a `\n`, so a record that
    /// was just read sits on the line before this one.
    fn lines_read(&self) -> usize {
        self.records.reader().position().line() as usize
    }

    fn blank_line(&mut self) -> ManifestError {
        let line = self.next_line;
        self.next_line += 1;
        ManifestError::FieldCount {
            line,
            actual: 1,
            expected: FIELD_COUNT,
        }
    }
}

impl<R: Read> Iterator for ManifestReader<R> {
    type Item = Result<ManifestRow, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((record, line)) = self.pending.take() {
            if line > self.next_line {
                self.pending = Some((record, line));
                return Some(Err(self.blank_line()));
            }
            self.next_line = line + 1;
            return Some(ManifestRow::from_record(&record, line));
        }
        if self.finished {
            return None;
        }

        let record = match self.records.next() {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                self.finished = true;
                return Some(Err(err.into()));
            }
            None => {
                // csv skips empty lines, including any after the last row
                self.finished = true;
                if self.lines_read() > self.next_line {
                    return Some(Err(self.blank_line()));
                }
                return None;
            }
        };

        let line = self.lines_read() - 1;
        if line > self.next_line {
            self.pending = Some((record, line));
            return Some(Err(self.blank_line()));
        }
        self.next_line = line + 1;
        Some(ManifestRow::from_record(&record, line))
    }
}

/// Ends the input with a `\n` when the source does not.
struct Terminated<R> {
    inner: R,
    last: Option<u8>,
    done: bool,
}

impl<R> Terminated<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            last: None,
            done: false,
        }
    }
}

impl<R: Read> Read for Terminated<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.last = Some(buf[n - 1]);
            return Ok(n);
        }
        self.done = true;
        match self.last {
            Some(b) if b != b'\n' => {
                buf[0] = b'\n';
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
