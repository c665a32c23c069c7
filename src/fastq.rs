//! FASTQ text streaming.
//!
//! A minimal 4-line-record reader and writer. The core engine only needs
//! an iterator of `(id, seq, qual)` triples; this module is the text
//! collaborator that produces and consumes them, with enough validation to
//! turn malformed input into a `Format` error carrying the read index
//! instead of a garbage archive.

use std::io::{BufRead, Write};

use crate::error::{FqcError, Result};

/// One read: identifier (without the leading `@`), bases, and Phred-33
/// qualities. `seq.len() == qual.len()` holds for every record this module
/// hands out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadRecord {
    pub id: Vec<u8>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Streaming FASTQ reader over any [`BufRead`].
pub struct FastqReader<R: BufRead> {
    inner: R,
    /// Index of the next record, for error messages.
    next_index: u64,
    line: Vec<u8>,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(inner: R) -> Self {
        FastqReader {
            inner,
            next_index: 0,
            line: Vec::new(),
        }
    }

    /// Number of records returned so far.
    pub fn records_read(&self) -> u64 {
        self.next_index
    }

    /// Read one line without its terminator; `Ok(false)` at EOF.
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.inner.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(false);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        Ok(true)
    }

    fn record_err(&self, msg: impl Into<String>) -> FqcError {
        FqcError::format(format!("read {}: {}", self.next_index, msg.into()))
    }

    /// Next record, or `None` at a clean end of input.
    pub fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        // Header line.
        loop {
            if !self.read_line()? {
                return Ok(None);
            }
            if !self.line.is_empty() {
                break;
            }
            // Tolerate blank lines between records (trailing newline etc.).
        }
        if self.line.first() != Some(&b'@') {
            return Err(self.record_err("header line does not start with '@'"));
        }
        let id = self.line[1..].to_vec();

        // Sequence line.
        if !self.read_line()? {
            return Err(self.record_err("truncated record: missing sequence line"));
        }
        let seq = self.line.clone();
        for (i, &b) in seq.iter().enumerate() {
            if !matches!(b, b'A' | b'C' | b'G' | b'T' | b'N') {
                return Err(self.record_err(format!(
                    "invalid base 0x{b:02X} at position {i} (expected A/C/G/T/N)"
                )));
            }
        }

        // Separator line.
        if !self.read_line()? {
            return Err(self.record_err("truncated record: missing '+' line"));
        }
        if self.line.first() != Some(&b'+') {
            return Err(self.record_err("separator line does not start with '+'"));
        }

        // Quality line.
        if !self.read_line()? {
            return Err(self.record_err("truncated record: missing quality line"));
        }
        let qual = self.line.clone();
        if qual.len() != seq.len() {
            return Err(self.record_err(format!(
                "quality length {} does not match sequence length {}",
                qual.len(),
                seq.len()
            )));
        }

        self.next_index += 1;
        Ok(Some(ReadRecord { id, seq, qual }))
    }
}

impl<R: BufRead> Iterator for FastqReader<R> {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Buffered FASTQ writer.
pub struct FastqWriter<W: Write> {
    inner: W,
    records_written: u64,
}

impl<W: Write> FastqWriter<W> {
    pub fn new(inner: W) -> Self {
        FastqWriter {
            inner,
            records_written: 0,
        }
    }

    pub fn write_record(&mut self, rec: &ReadRecord) -> Result<()> {
        self.inner.write_all(b"@")?;
        self.inner.write_all(&rec.id)?;
        self.inner.write_all(b"\n")?;
        self.inner.write_all(&rec.seq)?;
        self.inner.write_all(b"\n+\n")?;
        self.inner.write_all(&rec.qual)?;
        self.inner.write_all(b"\n")?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(text: &str) -> Result<Vec<ReadRecord>> {
        FastqReader::new(Cursor::new(text.as_bytes().to_vec())).collect()
    }

    #[test]
    fn parses_well_formed_records() {
        let recs = read_all("@r1\nACGT\n+\nIIII\n@r2 desc\nNNAA\n+r2\n!!~~\n").unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id, b"r1");
        assert_eq!(recs[0].seq, b"ACGT");
        assert_eq!(recs[1].id, b"r2 desc");
        assert_eq!(recs[1].qual, b"!!~~");
    }

    #[test]
    fn tolerates_missing_trailing_newline_and_crlf() {
        let recs = read_all("@a\r\nACGT\r\n+\r\nIIII\r\n@b\nGGCC\n+\nJJJJ").unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].qual, b"JJJJ");
    }

    #[test]
    fn rejects_bad_header_marker() {
        let err = read_all("r1\nACGT\n+\nIIII\n").unwrap_err();
        assert!(err.to_string().contains("read 0"), "{err}");
    }

    #[test]
    fn rejects_invalid_base() {
        assert!(read_all("@r\nACXT\n+\nIIII\n").is_err());
        assert!(read_all("@r\nacgt\n+\nIIII\n").is_err());
    }

    #[test]
    fn rejects_length_mismatch_with_read_index() {
        let err = read_all("@a\nACGT\n+\nIIII\n@b\nACGT\n+\nIII\n").unwrap_err();
        assert!(err.to_string().contains("read 1"), "{err}");
    }

    #[test]
    fn rejects_truncation_mid_record() {
        assert!(read_all("@a\nACGT\n+\n").is_err());
        assert!(read_all("@a\nACGT\n").is_err());
    }

    #[test]
    fn writer_round_trips_reader() {
        let records = vec![
            ReadRecord {
                id: b"x/1".to_vec(),
                seq: b"ACGTN".to_vec(),
                qual: b"IIII!".to_vec(),
            },
            ReadRecord {
                id: vec![],
                seq: vec![],
                qual: vec![],
            },
        ];
        let mut w = FastqWriter::new(Vec::new());
        for r in &records {
            w.write_record(r).unwrap();
        }
        let text = w.into_inner();
        let back: Vec<ReadRecord> = FastqReader::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(back, records);
    }
}
