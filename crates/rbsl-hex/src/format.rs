//! Supported hex file formats
//!
//! The format is always chosen by the caller, either explicitly or from the
//! file name. File contents are never inspected to guess it.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::error::Result;
use crate::ihex::IntelHexParser;
use crate::record::RecordSequence;
use crate::stream::BoxedStream;
use crate::titext::TiTextParser;

/// A text firmware image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HexFormat {
    /// Intel HEX (`:BBAAAATT...CC` lines)
    IntelHex,
    /// TI-Text (`@addr` lines, byte pairs, `q` terminator)
    TiText,
}

/// Format name not recognized by [`HexFormat::from_str`]
#[derive(Debug, Error)]
#[error("unknown hex format '{0}' (expected ihex or titext)")]
pub struct UnknownFormat(pub String);

impl HexFormat {
    /// All supported formats
    pub const ALL: [HexFormat; 2] = [HexFormat::IntelHex, HexFormat::TiText];

    /// Short name, as accepted by `from_str`
    pub fn name(&self) -> &'static str {
        match self {
            Self::IntelHex => "ihex",
            Self::TiText => "titext",
        }
    }

    /// Stream records from `reader`
    pub fn parse<'a, R: Read + Send + 'a>(&self, reader: R) -> BoxedStream<'a> {
        match self {
            Self::IntelHex => Box::new(IntelHexParser::new(reader)),
            Self::TiText => Box::new(TiTextParser::new(reader)),
        }
    }

    /// Read the whole image into memory
    pub fn read_all<R: Read>(&self, reader: R) -> Result<RecordSequence> {
        match self {
            Self::IntelHex => RecordSequence::from_stream(IntelHexParser::new(reader)),
            Self::TiText => RecordSequence::from_stream(TiTextParser::new(reader)),
        }
    }

    /// Pick a format from a file extension
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "hex" | "ihx" | "ihex" => Some(Self::IntelHex),
            "txt" | "titxt" => Some(Self::TiText),
            _ => None,
        }
    }
}

impl FromStr for HexFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ihex" | "intel-hex" | "intelhex" | "hex" => Ok(Self::IntelHex),
            "titext" | "ti-text" | "txt" => Ok(Self::TiText),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for HexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntelHex => write!(f, "Intel HEX"),
            Self::TiText => write!(f, "TI-Text"),
        }
    }
}
