//! Intel HEX decoding
//!
//! Each line has the form `:BBAAAATTDD...DDCC`: byte count, 16-bit load
//! offset, record type, data and checksum, all as ASCII hex. The low byte of
//! the sum of every decoded byte on a line, checksum included, must be zero.
//!
//! Extended address records (types 02 and 04) set a bias that is added to
//! the load offset of every following data record. Start address records
//! (types 03 and 05) carry no memory contents; they are not emitted but the
//! entry point they describe is kept and available from
//! [`IntelHexParser::entry_point`].
//!
//! Reference: Intel "Hexadecimal Object File Format Specification", rev. A

use std::io::Read;

use log::{debug, trace, warn};

use crate::digits::{describe, hex_byte};
use crate::error::{HexError, Result};
use crate::lines::LineReader;
use crate::record::{Progress, Record};
use crate::stream::RecordStream;

/// Intel HEX record types
pub mod record_type {
    /// Data record
    pub const DATA: u8 = 0x00;
    /// End of file
    pub const EOF: u8 = 0x01;
    /// Extended segment address (bits 4..19)
    pub const EXTENDED_SEGMENT_ADDRESS: u8 = 0x02;
    /// Start segment address (CS:IP)
    pub const START_SEGMENT_ADDRESS: u8 = 0x03;
    /// Extended linear address (bits 16..31)
    pub const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
    /// Start linear address (EIP)
    pub const START_LINEAR_ADDRESS: u8 = 0x05;
}

/// Byte count, two offset bytes, record type and checksum
const LINE_OVERHEAD: usize = 5;

/// Effective addresses must stay below this bound
const ADDRESS_SPACE: u64 = 1 << 32;

/// Execution start address declared by a start address record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// 80x86 real mode CS:IP (record type 03)
    Segment {
        /// Code segment
        cs: u16,
        /// Instruction pointer
        ip: u16,
    },
    /// 32-bit linear address (record type 05)
    Linear(u32),
}

/// One decoded line, before its record type is interpreted
#[derive(Debug)]
struct RawRecord {
    offset: u16,
    kind: u8,
    data: Vec<u8>,
}

/// Streaming Intel HEX reader
///
/// Addressing state lives in the parser instance, so independent parsers
/// never affect each other.
#[derive(Debug)]
pub struct IntelHexParser<R> {
    lines: LineReader<R>,
    /// Bias added to data record offsets
    addr_mod: u32,
    /// Width of the address field in bytes: 2 until an extended address
    /// record is seen, 4 afterwards
    wordsz: u8,
    entry_point: Option<EntryPoint>,
    consumed: u64,
    done: bool,
}

impl<R: Read> IntelHexParser<R> {
    /// Create a parser reading from `reader`
    pub fn new(reader: R) -> Self {
        Self::with_line_reader(LineReader::new(reader))
    }

    /// Create a parser on top of an existing line reader
    pub fn with_line_reader(lines: LineReader<R>) -> Self {
        Self {
            lines,
            addr_mod: 0,
            wordsz: 2,
            entry_point: None,
            consumed: 0,
            done: false,
        }
    }

    /// Entry point from the most recent start address record, if any
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry_point
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(line) = self.lines.next_line()? else {
                return Err(HexError::Truncated {
                    line: self.lines.line_number(),
                    expected: "end-of-file record",
                });
            };
            let text = line.trimmed();
            if text.is_empty() {
                continue;
            }

            let raw = decode_line(line.number, text)?;
            match raw.kind {
                record_type::DATA => {
                    if raw.data.is_empty() {
                        continue;
                    }
                    let address = self.effective_address(line.number, &raw)?;
                    return Ok(Some(Record::new(address, raw.data)));
                }
                record_type::EOF => return Ok(None),
                record_type::EXTENDED_SEGMENT_ADDRESS => {
                    let base = extended_address(line.number, &raw)?;
                    self.addr_mod = (base as u32) << 4;
                    self.wordsz = 4;
                    debug!("line {}: segment base 0x{:08X}", line.number, self.addr_mod);
                }
                record_type::EXTENDED_LINEAR_ADDRESS => {
                    let upper = extended_address(line.number, &raw)?;
                    self.addr_mod = (upper as u32) << 16;
                    self.wordsz = 4;
                    debug!("line {}: linear base 0x{:08X}", line.number, self.addr_mod);
                }
                record_type::START_SEGMENT_ADDRESS => {
                    let value = start_address(line.number, &raw)?;
                    self.entry_point = Some(EntryPoint::Segment {
                        cs: (value >> 16) as u16,
                        ip: value as u16,
                    });
                    debug!("line {}: ignoring start segment address", line.number);
                }
                record_type::START_LINEAR_ADDRESS => {
                    let value = start_address(line.number, &raw)?;
                    self.entry_point = Some(EntryPoint::Linear(value));
                    debug!("line {}: ignoring start linear address", line.number);
                }
                other => {
                    return Err(HexError::format(
                        line.number,
                        format!("unknown record type 0x{:02X}", other),
                    ));
                }
            }
        }
    }

    /// Apply the current bias, checking the record stays inside the 32-bit
    /// address space
    fn effective_address(&self, line: usize, raw: &RawRecord) -> Result<u32> {
        let start = raw.offset as u64 + self.addr_mod as u64;
        let end = start + raw.data.len() as u64;
        if end > ADDRESS_SPACE {
            return Err(HexError::format(
                line,
                format!("record at 0x{:X} runs past the 32-bit address space", start),
            ));
        }
        Ok(start as u32)
    }
}

impl<R: Read> Iterator for IntelHexParser<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => {
                self.consumed += record.len() as u64;
                trace!(
                    "record 0x{:0width$X} ({} bytes)",
                    record.address,
                    record.len(),
                    width = 2 * self.wordsz as usize
                );
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                debug!("end of Intel HEX stream after {} bytes", self.consumed);
                None
            }
            Err(e) => {
                self.done = true;
                warn!("Intel HEX parse aborted: {}", e);
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> RecordStream for IntelHexParser<R> {
    fn progress(&self) -> Progress {
        Progress::new(self.consumed, None)
    }
}

/// Decode and checksum one line, without interpreting its record type
fn decode_line(line: usize, text: &[u8]) -> Result<RawRecord> {
    let digits = text
        .strip_prefix(b":")
        .ok_or_else(|| HexError::format(line, "missing ':' start code"))?;

    if digits.len() % 2 != 0 {
        return Err(HexError::format(line, "odd number of hex digits"));
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for (i, pair) in digits.chunks_exact(2).enumerate() {
        match hex_byte(pair[0], pair[1]) {
            Some(b) => bytes.push(b),
            None => {
                let bad = if hex_byte(pair[0], b'0').is_none() {
                    pair[0]
                } else {
                    pair[1]
                };
                return Err(HexError::format(
                    line,
                    format!("invalid hex digit {} at column {}", describe(bad), 2 + 2 * i),
                ));
            }
        }
    }

    if bytes.len() < LINE_OVERHEAD {
        return Err(HexError::format(line, "short line"));
    }
    let count = bytes[0] as usize;
    let expected_len = LINE_OVERHEAD + count;
    if bytes.len() < expected_len {
        return Err(HexError::format(
            line,
            format!(
                "short line: byte count {} needs {} bytes, found {}",
                count,
                expected_len,
                bytes.len()
            ),
        ));
    }
    if bytes.len() > expected_len {
        return Err(HexError::format(line, "trailing characters after checksum"));
    }

    let (body, checksum) = bytes.split_at(expected_len - 1);
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let found = checksum[0];
    if sum.wrapping_add(found) != 0 {
        return Err(HexError::Checksum {
            line,
            expected: sum.wrapping_neg(),
            found,
        });
    }

    Ok(RawRecord {
        offset: u16::from_be_bytes([bytes[1], bytes[2]]),
        kind: bytes[3],
        data: bytes[4..expected_len - 1].to_vec(),
    })
}

/// Value of an extended address record: exactly two big-endian bytes
fn extended_address(line: usize, raw: &RawRecord) -> Result<u16> {
    match raw.data[..] {
        [hi, lo] => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(HexError::format(
            line,
            format!(
                "extended address record needs 2 data bytes, found {}",
                raw.data.len()
            ),
        )),
    }
}

/// Value of a start address record: exactly four big-endian bytes
fn start_address(line: usize, raw: &RawRecord) -> Result<u32> {
    match raw.data[..] {
        [a, b, c, d] => Ok(u32::from_be_bytes([a, b, c, d])),
        _ => Err(HexError::format(
            line,
            format!(
                "start address record needs 4 data bytes, found {}",
                raw.data.len()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Result<Record>> {
        IntelHexParser::new(text.as_bytes()).collect()
    }

    fn parse_ok(text: &str) -> Vec<Record> {
        parse(text).into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_data_record() {
        let records = parse_ok(":0300300002337A1E\n:00000001FF\n");
        assert_eq!(records, vec![Record::new(0x0030, vec![0x02, 0x33, 0x7A])]);
    }

    #[test]
    fn test_checksum_law_holds() {
        let line = ":10010000214601360121470136007EFE09D2190140";
        let digits = &line.as_bytes()[1..];
        let sum = digits
            .chunks_exact(2)
            .map(|p| hex_byte(p[0], p[1]).unwrap())
            .fold(0u8, |acc, b| acc.wrapping_add(b));
        assert_eq!(sum, 0);

        let records = parse_ok(&format!("{}\n:00000001FF\n", line));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, 0x0100);
        assert_eq!(records[0].len(), 16);
    }

    #[test]
    fn test_extended_linear_address() {
        let records = parse_ok(":020000040001F9\n:01001000559A\n:00000001FF\n");
        assert_eq!(records, vec![Record::new(0x0001_0010, vec![0x55])]);
    }

    #[test]
    fn test_extended_segment_address() {
        let records = parse_ok(":020000021000EC\n:01001000559A\n:00000001FF\n");
        assert_eq!(records, vec![Record::new(0x0001_0010, vec![0x55])]);
    }

    #[test]
    fn test_bias_persists_until_changed() {
        let text = "\
:020000040001F9
:01001000559A
:0100100011DE
:020000040000FA
:01001000559A
:00000001FF
";
        let addrs: Vec<u32> = parse_ok(text).iter().map(|r| r.address).collect();
        assert_eq!(addrs, vec![0x0001_0010, 0x0001_0010, 0x0000_0010]);
    }

    #[test]
    fn test_invalid_hex_digit() {
        let results = parse(":0300300002GG7A1E\n:00000001FF\n");
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(HexError::Format { line, message }) => {
                assert_eq!(*line, 1);
                assert!(message.contains("'G'"), "{}", message);
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_checksum_mismatch_aborts_stream() {
        let text = ":03000000010203F7\n:0300300002337A1F\n:020003000405F2\n:00000001FF\n";
        let results = parse(text);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &Record::new(0, vec![1, 2, 3])
        );
        assert!(matches!(
            results[1],
            Err(HexError::Checksum {
                line: 2,
                expected: 0x1E,
                found: 0x1F
            })
        ));
    }

    #[test]
    fn test_missing_start_code() {
        let results = parse("0300300002337A1E\n");
        assert!(matches!(results[..], [Err(HexError::Format { line: 1, .. })]));
    }

    #[test]
    fn test_short_and_long_lines() {
        let results = parse(":0300300002337A\n");
        assert!(matches!(results[..], [Err(HexError::Format { .. })]));

        let results = parse(":0300300002337A1E00\n");
        match &results[..] {
            [Err(HexError::Format { message, .. })] => assert!(message.contains("trailing")),
            other => panic!("unexpected {:?}", other),
        }

        let results = parse(":030030000\n");
        assert!(matches!(results[..], [Err(HexError::Format { .. })]));
    }

    #[test]
    fn test_missing_eof_is_truncation() {
        let results = parse(":0300300002337A1E\n");
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(HexError::Truncated { line: 1, .. })));
    }

    #[test]
    fn test_empty_input_is_truncation() {
        let results = parse("");
        assert!(matches!(results[..], [Err(HexError::Truncated { line: 0, .. })]));
    }

    #[test]
    fn test_input_after_eof_not_read() {
        let records = parse_ok(":00000001FF\ngarbage\n");
        assert!(records.is_empty());
    }

    #[test]
    fn test_start_addresses_skipped() {
        let mut parser = IntelHexParser::new(
            ":0400000508000131BD\n:03000000010203F7\n:00000001FF\n".as_bytes(),
        );
        let records: Vec<_> = parser.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![Record::new(0, vec![1, 2, 3])]);
        assert_eq!(parser.entry_point(), Some(EntryPoint::Linear(0x0800_0131)));

        let mut parser = IntelHexParser::new(":0400000300003800C1\n:00000001FF\n".as_bytes());
        assert!(parser.next().is_none());
        assert_eq!(
            parser.entry_point(),
            Some(EntryPoint::Segment { cs: 0, ip: 0x3800 })
        );
    }

    #[test]
    fn test_unknown_record_type() {
        let results = parse(":00000006FA\n");
        assert!(matches!(results[..], [Err(HexError::Format { line: 1, .. })]));
    }

    #[test]
    fn test_bad_extended_address_length() {
        let results = parse(":0100000400FB\n");
        match &results[..] {
            [Err(HexError::Format { message, .. })] => assert!(message.contains("2 data bytes")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unbiased_record_crosses_64k() {
        // Without an extension record the bias is zero and the address is
        // emitted as is
        let records = parse_ok(":02FFFF00AABB9B
:00000001FF
");
        assert_eq!(records, vec![Record::new(0xFFFF, vec![0xAA, 0xBB])]);
    }

    #[test]
    fn test_32_bit_overflow() {
        let results = parse(":02000004FFFFFC
:02FFFF00AABB9B
:00000001FF
");
        match &results[..] {
            [Err(HexError::Format { line: 2, message })] => {
                assert!(message.contains("32-bit"), "{}", message)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let records = parse_ok("\r\n:0300300002337A1E\r\n\r\n:00000001FF\r\n");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_lowercase_digits() {
        let records = parse_ok(":0300300002337a1e\n:00000001ff\n");
        assert_eq!(records[0].data, vec![0x02, 0x33, 0x7A]);
    }

    #[test]
    fn test_progress_counts_delivered_bytes() {
        let mut parser =
            IntelHexParser::new(":03000000010203F7\n:020003000405F2\n:00000001FF\n".as_bytes());
        assert_eq!(parser.progress(), Progress::new(0, None));
        parser.next();
        assert_eq!(parser.progress(), Progress::new(3, None));
        parser.next();
        assert_eq!(parser.progress(), Progress::new(5, None));
        assert!(parser.next().is_none());
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_independent_sessions() {
        let mut biased = IntelHexParser::new(":020000040001F9\n:01001000559A\n:00000001FF\n".as_bytes());
        let mut plain = IntelHexParser::new(":01001000559A\n:00000001FF\n".as_bytes());
        assert_eq!(biased.next().unwrap().unwrap().address, 0x0001_0010);
        assert_eq!(plain.next().unwrap().unwrap().address, 0x0010);
    }
}
