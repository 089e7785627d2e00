//! Line reassembly over bounded-length reads
//!
//! Byte sources are read in fixed-size chunks, so a logical line may arrive
//! split across several reads. [`LineReader`] concatenates the fragments and
//! only hands out a line once its `\n` terminator (or the end of input) has
//! been seen.

use std::io::{ErrorKind, Read};

use crate::error::Result;

/// Default number of bytes requested per read
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// One logical line, without its `\n` terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number
    pub number: usize,
    /// Raw line contents
    pub text: Vec<u8>,
}

impl Line {
    /// Line contents with trailing whitespace (including `\r`) removed
    pub fn trimmed(&self) -> &[u8] {
        self.text.trim_ascii_end()
    }
}

/// Reads complete lines from a byte source using bounded reads
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    chunk: Vec<u8>,
    start: usize,
    end: usize,
    line_number: usize,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    /// Create a reader using [`DEFAULT_CHUNK_SIZE`] reads
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Create a reader that requests at most `chunk_size` bytes per read
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0; chunk_size.max(1)],
            start: 0,
            end: 0,
            line_number: 0,
            eof: false,
        }
    }

    /// Number of the last line returned (0 before the first)
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Read the next complete line, or `None` at end of input
    ///
    /// A final line without a terminator is still returned.
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        let mut text = Vec::new();

        loop {
            if self.start == self.end {
                if self.eof {
                    break;
                }
                let n = match self.reader.read(&mut self.chunk) {
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    self.eof = true;
                    break;
                }
                self.start = 0;
                self.end = n;
            }

            let pending = &self.chunk[self.start..self.end];
            match pending.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    text.extend_from_slice(&pending[..pos]);
                    self.start += pos + 1;
                    return Ok(Some(self.finish_line(text)));
                }
                None => {
                    // Partial line, keep reading
                    text.extend_from_slice(pending);
                    self.start = self.end;
                }
            }
        }

        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.finish_line(text)))
    }

    fn finish_line(&mut self, text: Vec<u8>) -> Line {
        self.line_number += 1;
        Line {
            number: self.line_number,
            text,
        }
    }
}
