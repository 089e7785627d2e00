//! Record reblocking
//!
//! Parsers emit one record per input line, so record sizes follow whatever
//! the tool that wrote the file chose. Programmers want fixed-size writes.
//! [`Reblocker`] regroups a stream into `record_size` blocks wherever the
//! input addresses are contiguous. A gap (or a jump backwards) always ends
//! the current block early; bytes are never bridged, padded or reordered.

use std::collections::VecDeque;

use log::trace;

use crate::error::{HexError, Result};
use crate::record::{Progress, Record};
use crate::stream::RecordStream;

/// Default block size
pub const DEFAULT_RECORD_SIZE: usize = 64;

/// Reblocking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReblockOptions {
    /// Desired block length in bytes
    pub record_size: usize,
    /// Never carry a partial block across an input record boundary
    pub preserve_splits: bool,
}

impl ReblockOptions {
    /// Options for `record_size` blocks, coalescing across input records
    pub fn new(record_size: usize) -> Self {
        Self {
            record_size,
            preserve_splits: false,
        }
    }

    /// Set the block size
    pub fn with_record_size(mut self, record_size: usize) -> Self {
        self.record_size = record_size;
        self
    }

    /// Set whether input record boundaries are kept
    pub fn with_preserve_splits(mut self, preserve_splits: bool) -> Self {
        self.preserve_splits = preserve_splits;
        self
    }
}

impl Default for ReblockOptions {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_SIZE)
    }
}

/// Stream adapter producing uniform, address-contiguous blocks
///
/// With `preserve_splits` unset you will usually get far fewer records than
/// the input has, since short lines are merged.
#[derive(Debug)]
pub struct Reblocker<S> {
    upstream: S,
    options: ReblockOptions,
    buffer: Vec<u8>,
    /// Address of `buffer[0]`, unset until the first record arrives
    addr: Option<u64>,
    ready: VecDeque<Record>,
    pending_error: Option<HexError>,
    upstream_done: bool,
    total: Option<u64>,
    consumed: u64,
}

impl<S: RecordStream> Reblocker<S> {
    /// Wrap `upstream`; fails if `options.record_size` is zero
    pub fn new(upstream: S, options: ReblockOptions) -> Result<Self> {
        if options.record_size == 0 {
            return Err(HexError::InvalidBlockSize);
        }
        let total = upstream.progress().total;
        Ok(Self {
            upstream,
            options,
            buffer: Vec::with_capacity(options.record_size * 2),
            addr: None,
            ready: VecDeque::new(),
            pending_error: None,
            upstream_done: false,
            total,
            consumed: 0,
        })
    }

    fn push(&mut self, record: Record) {
        let start = record.address as u64;
        match self.addr {
            Some(addr) if addr + self.buffer.len() as u64 == start => {}
            _ => {
                self.drain(true);
                self.addr = Some(start);
            }
        }
        self.buffer.extend_from_slice(&record.data);
        self.drain(self.options.preserve_splits);
    }

    /// Move full blocks to the output queue; with `flush`, the remainder too
    fn drain(&mut self, flush: bool) {
        let Some(mut addr) = self.addr else {
            return;
        };
        let size = self.options.record_size;
        let mut offset = 0;

        while self.buffer.len() - offset >= size {
            self.ready
                .push_back(Record::new(addr as u32, &self.buffer[offset..offset + size]));
            offset += size;
            addr += size as u64;
        }
        if flush && offset < self.buffer.len() {
            self.ready
                .push_back(Record::new(addr as u32, &self.buffer[offset..]));
            addr += (self.buffer.len() - offset) as u64;
            offset = self.buffer.len();
        }

        self.buffer.drain(..offset);
        self.addr = Some(addr);
    }
}

impl<S: RecordStream> Iterator for Reblocker<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.ready.pop_front() {
                self.consumed += block.len() as u64;
                trace!("block 0x{:08X} ({} bytes)", block.address, block.len());
                return Some(Ok(block));
            }
            if let Some(err) = self.pending_error.take() {
                return Some(Err(err));
            }
            if self.upstream_done {
                return None;
            }

            match self.upstream.next() {
                Some(Ok(record)) => self.push(record),
                Some(Err(e)) => {
                    // Deliver what was already received before the error
                    self.drain(true);
                    self.pending_error = Some(e);
                    self.upstream_done = true;
                }
                None => {
                    self.drain(true);
                    self.upstream_done = true;
                }
            }
        }
    }
}

impl<S: RecordStream> RecordStream for Reblocker<S> {
    fn progress(&self) -> Progress {
        Progress::new(self.consumed, self.total)
    }
}
