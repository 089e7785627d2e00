//! rbsl-hex - Firmware hex image readers
//!
//! This crate decodes text firmware images into a stream of address-tagged
//! [`Record`]s and regroups them into fixed-size, address-contiguous blocks
//! for a programmer to write.
//!
//! # Formats
//!
//! - Intel HEX, including extended segment/linear addressing ([`ihex`])
//! - TI-Text, as used by MSP430 tools ([`titext`])
//!
//! # Pipeline
//!
//! ```text
//! bytes -> IntelHexParser / TiTextParser -> Reblocker -> consumer
//! ```
//!
//! Every stage implements [`RecordStream`]: an iterator of
//! `Result<Record>` that also reports [`Progress`]. Stages run lazily on the
//! caller's thread by default; [`pipeline::spawn_stage`] runs one on a worker
//! thread behind a bounded channel instead.
//!
//! # Example
//!
//! ```
//! use rbsl_hex::{HexFormat, ReblockOptions, Record, RecordStream};
//!
//! let image = "@200\n47 4f\nq\n";
//! let blocks = HexFormat::TiText
//!     .parse(image.as_bytes())
//!     .reblock(ReblockOptions::new(16))?
//!     .collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(blocks, vec![Record::new(0x200, vec![0x47, 0x4F])]);
//! # Ok::<(), rbsl_hex::HexError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod digits;
pub mod error;
pub mod format;
pub mod ihex;
pub mod lines;
pub mod pipeline;
pub mod reblock;
pub mod record;
pub mod stream;
pub mod titext;

pub use error::{HexError, Result};
pub use format::HexFormat;
pub use ihex::{EntryPoint, IntelHexParser};
pub use pipeline::{spawn_stage, CancelToken, ThreadedStream};
pub use reblock::{ReblockOptions, Reblocker};
pub use record::{Progress, Record, RecordSequence};
pub use stream::RecordStream;
pub use titext::TiTextParser;
