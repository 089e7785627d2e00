//! Record types
//!
//! A [`Record`] is one address-tagged chunk of a firmware image. Parsers
//! produce them one per data line, the reblocker one per output block.
//! [`RecordSequence`] holds a fully materialized image and can be streamed
//! any number of times.

use std::ops::Range;

use crate::error::Result;
use crate::stream::RecordStream;

/// An address plus the bytes stored starting at that address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Address of the first byte
    pub address: u32,
    /// Bytes of this record, never empty
    pub data: Vec<u8>,
}

impl Record {
    /// Create a new record
    pub fn new(address: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }

    /// Number of data bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the record carries no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Address one past the last byte
    ///
    /// Returned as u64 so records ending at the top of the 32-bit space
    /// don't overflow.
    pub fn end(&self) -> u64 {
        self.address as u64 + self.data.len() as u64
    }

    /// Check if `next` starts exactly where this record ends
    pub fn is_contiguous_with(&self, next: &Record) -> bool {
        self.end() == next.address as u64
    }
}

/// Byte counts for a stream: data delivered so far and the total, if known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Data bytes delivered, including the most recent record
    pub consumed: u64,
    /// Total data bytes in the stream, `None` when unknown
    pub total: Option<u64>,
}

impl Progress {
    /// Progress with a known total
    pub fn new(consumed: u64, total: Option<u64>) -> Self {
        Self { consumed, total }
    }

    /// Fraction done in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some(self.consumed as f64 / total as f64),
            None => None,
        }
    }
}

/// A fully materialized list of records
///
/// Unlike the streaming parsers this can be iterated repeatedly, and its
/// streams report a known total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSequence {
    records: Vec<Record>,
}

impl RecordSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain a stream into memory, stopping at the first error
    pub fn from_stream<S>(stream: S) -> Result<Self>
    where
        S: Iterator<Item = Result<Record>>,
    {
        let records = stream.collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the sequence holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all record lengths
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.len() as u64).sum()
    }

    /// Start a new independent stream over the records
    pub fn iter_records(&self) -> SequenceStream {
        SequenceStream::new(self.records.clone())
    }

    /// Address ranges covered by runs of consecutive contiguous records
    ///
    /// Runs are reported in record order; records that are contiguous but
    /// not adjacent in the sequence are not merged.
    pub fn ranges(&self) -> Vec<Range<u64>> {
        let mut ranges: Vec<Range<u64>> = Vec::new();
        for record in &self.records {
            let start = record.address as u64;
            match ranges.last_mut() {
                Some(last) if last.end == start => last.end = record.end(),
                _ => ranges.push(start..record.end()),
            }
        }
        ranges
    }
}

impl From<Vec<Record>> for RecordSequence {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl IntoIterator for RecordSequence {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Stream over an owned list of records with a known total
#[derive(Debug)]
pub struct SequenceStream {
    records: std::vec::IntoIter<Record>,
    consumed: u64,
    total: u64,
}

impl SequenceStream {
    fn new(records: Vec<Record>) -> Self {
        let total = records.iter().map(|r| r.len() as u64).sum();
        Self {
            records: records.into_iter(),
            consumed: 0,
            total,
        }
    }
}

impl Iterator for SequenceStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.consumed += record.len() as u64;
        Some(Ok(record))
    }
}

impl RecordStream for SequenceStream {
    fn progress(&self) -> Progress {
        Progress::new(self.consumed, Some(self.total))
    }
}
