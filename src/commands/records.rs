//! Records command implementation

use super::{hex_bytes, open_input, resolve_format};
use crate::cli::{BlockArgs, InputArgs};
use rbsl_hex::pipeline::DEFAULT_STAGE_CAPACITY;
use rbsl_hex::stream::BoxedStream;
use rbsl_hex::{ReblockOptions, RecordStream};
use std::io::{self, Write};

/// Stream an image and print every record (or block) as it arrives
pub fn run(
    input: &InputArgs,
    blocks: &BlockArgs,
    threaded: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = resolve_format(input)?;
    log::info!("Reading {} image from {}", format, input.input.display());

    let mut stream: BoxedStream<'static> = format.parse(open_input(input)?);
    if threaded {
        stream = Box::new(stream.threaded(DEFAULT_STAGE_CAPACITY)?);
    }
    if let Some(size) = blocks.block_size {
        let options = ReblockOptions::new(size).with_preserve_splits(blocks.preserve_splits);
        log::debug!("Reblocking with {:?}", options);
        stream = Box::new(stream.reblock(options)?);
        if threaded {
            stream = Box::new(stream.threaded(DEFAULT_STAGE_CAPACITY)?);
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for record in stream.by_ref() {
        let record = record?;
        writeln!(out, "0x{:08X}: {}", record.address, hex_bytes(&record.data))?;
        count += 1;
    }
    out.flush()?;

    let progress = stream.progress();
    log::info!("{} records, {} bytes", count, progress.consumed);
    Ok(())
}
