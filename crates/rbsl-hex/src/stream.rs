//! The record stream contract shared by every pipeline stage
//!
//! A stream is an iterator of `Result<Record>` that can also report its
//! [`Progress`]. `None` from `next()` is the end-of-stream sentinel. Once a
//! stream yields an error it yields nothing further.
//!
//! ```
//! use rbsl_hex::{HexFormat, ReblockOptions, RecordStream};
//!
//! let text = ":0400000001020304F2\n:00000001FF\n";
//! let stream = HexFormat::IntelHex.parse(text.as_bytes());
//! let mut blocks = stream.reblock(ReblockOptions::new(2))?;
//! while let Some(block) = blocks.next() {
//!     let block = block?;
//!     let progress = blocks.progress();
//!     println!("{:#x} {:?} ({} bytes so far)", block.address, block.data, progress.consumed);
//! }
//! # Ok::<(), rbsl_hex::HexError>(())
//! ```

use crate::error::Result;
use crate::pipeline::ThreadedStream;
use crate::reblock::{ReblockOptions, Reblocker};
use crate::record::{Progress, Record};

/// An ordered, forward-only source of records
pub trait RecordStream: Iterator<Item = Result<Record>> {
    /// Bytes delivered so far and the total, if known
    fn progress(&self) -> Progress;

    /// Regroup this stream into uniform, address-contiguous blocks
    fn reblock(self, options: ReblockOptions) -> Result<Reblocker<Self>>
    where
        Self: Sized,
    {
        Reblocker::new(self, options)
    }

    /// Move this stream onto a worker thread behind a bounded hand-off
    fn threaded(self, capacity: usize) -> Result<ThreadedStream>
    where
        Self: Sized + Send + 'static,
    {
        crate::pipeline::spawn_stage(self, capacity)
    }
}

impl<S: RecordStream + ?Sized> RecordStream for Box<S> {
    fn progress(&self) -> Progress {
        (**self).progress()
    }
}

/// A type-erased stream, as returned by [`crate::HexFormat::parse`]
pub type BoxedStream<'a> = Box<dyn RecordStream + Send + 'a>;
