//! TI-Text decoding
//!
//! The format used by MSP430 programming tools. Each line is either an
//! address (`@` followed by hex digits) or whitespace-separated hex byte
//! pairs stored sequentially from the current address. A line holding only
//! `q` ends the file.
//!
//! ```text
//! @200
//! 47 4f
//! q
//! ```
//!
//! places "GO" at address 0x200.

use std::io::Read;

use log::{debug, trace, warn};

use crate::digits::{describe, hex_byte, hex_value};
use crate::error::{HexError, Result};
use crate::lines::LineReader;
use crate::record::{Progress, Record};
use crate::stream::RecordStream;

/// One past the highest byte address
const ADDRESS_SPACE: u64 = 1 << 32;

/// Streaming TI-Text reader
#[derive(Debug)]
pub struct TiTextParser<R> {
    lines: LineReader<R>,
    /// Address of the next data byte
    address: u64,
    consumed: u64,
    done: bool,
}

impl<R: Read> TiTextParser<R> {
    /// Create a parser reading from `reader`
    pub fn new(reader: R) -> Self {
        Self::with_line_reader(LineReader::new(reader))
    }

    /// Create a parser on top of an existing line reader
    pub fn with_line_reader(lines: LineReader<R>) -> Self {
        Self {
            lines,
            address: 0,
            consumed: 0,
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(line) = self.lines.next_line()? else {
                return Err(HexError::Truncated {
                    line: self.lines.line_number(),
                    expected: "'q' terminator",
                });
            };
            let text = line.trimmed();

            match text.first() {
                None => continue,
                Some(b'@') => {
                    self.address = parse_address(line.number, &text[1..])? as u64;
                    debug!("line {}: address 0x{:X}", line.number, self.address);
                }
                Some(b'q') if text == b"q" => return Ok(None),
                Some(&c) if hex_value(c).is_some() => {
                    let data = parse_data(line.number, text)?;
                    let end = self.address + data.len() as u64;
                    if end > ADDRESS_SPACE {
                        return Err(HexError::format(
                            line.number,
                            format!("data at 0x{:X} runs past the 32-bit address space", self.address),
                        ));
                    }
                    let record = Record::new(self.address as u32, data);
                    self.address = end;
                    return Ok(Some(record));
                }
                Some(&c) => {
                    return Err(HexError::format(
                        line.number,
                        format!("unexpected {} at start of line", describe(c)),
                    ));
                }
            }
        }
    }
}

impl<R: Read> Iterator for TiTextParser<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => {
                self.consumed += record.len() as u64;
                trace!("record 0x{:08X} ({} bytes)", record.address, record.len());
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                debug!("end of TI-Text stream after {} bytes", self.consumed);
                None
            }
            Err(e) => {
                self.done = true;
                warn!("TI-Text parse aborted: {}", e);
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> RecordStream for TiTextParser<R> {
    fn progress(&self) -> Progress {
        Progress::new(self.consumed, None)
    }
}

/// Parse the hex digits following `@`; the whole token must be hex
fn parse_address(line: usize, digits: &[u8]) -> Result<u32> {
    if digits.is_empty() {
        return Err(HexError::format(line, "short address"));
    }
    let mut value: u32 = 0;
    for &c in digits {
        let digit = hex_value(c).ok_or_else(|| {
            HexError::format(line, format!("invalid address digit {}", describe(c)))
        })?;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit as u32))
            .ok_or_else(|| HexError::format(line, "address does not fit in 32 bits"))?;
    }
    Ok(value)
}

/// Decode a line of whitespace-separated two-digit hex bytes
fn parse_data(line: usize, text: &[u8]) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(text.len() / 3 + 1);
    for token in text
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
    {
        let byte = match token {
            [hi, lo] => hex_byte(*hi, *lo),
            _ => None,
        };
        match byte {
            Some(b) => data.push(b),
            None => {
                return Err(HexError::format(
                    line,
                    format!(
                        "invalid byte \"{}\"",
                        String::from_utf8_lossy(token).escape_default()
                    ),
                ));
            }
        }
    }
    Ok(data)
}
