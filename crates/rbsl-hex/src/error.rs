//! Error types for hex image decoding

use thiserror::Error;

/// Errors raised while decoding or reblocking a record stream
#[derive(Debug, Error)]
pub enum HexError {
    /// Malformed line: missing start code, invalid hex digit, short line, etc.
    #[error("line {line}: format error: {message}")]
    Format {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// Intel HEX checksum law violated
    #[error("line {line}: checksum mismatch: expected 0x{expected:02X}, found 0x{found:02X}")]
    Checksum {
        /// 1-based line number
        line: usize,
        /// Checksum byte that would have satisfied the law
        expected: u8,
        /// Checksum byte present in the file
        found: u8,
    },

    /// Input ended before the format's terminator
    #[error("line {line}: unexpected end of input, expected {expected}")]
    Truncated {
        /// Number of the last line read
        line: usize,
        /// Terminator that was expected
        expected: &'static str,
    },

    /// Reading from the byte source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reblocker configured with a zero record size
    #[error("record size must be non-zero")]
    InvalidBlockSize,

    /// A threaded stage was cancelled before its stream ended
    #[error("stream cancelled")]
    Cancelled,

    /// A threaded stage's worker panicked before its stream ended
    #[error("stage worker panicked")]
    WorkerPanicked,
}

impl HexError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    /// Line number the error refers to, if any
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Format { line, .. } | Self::Checksum { line, .. } | Self::Truncated { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}

/// Result type for hex decoding operations
pub type Result<T> = std::result::Result<T, HexError>;
