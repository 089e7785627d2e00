//! Blocks command implementation

use super::{format_size, open_input, resolve_format};
use crate::cli::{BlockArgs, InputArgs};
use indicatif::{ProgressBar, ProgressStyle};
use rbsl_hex::{ReblockOptions, RecordStream};

/// Block counts gathered while draining a reblocked stream
#[derive(Debug, Default, PartialEq, Eq)]
struct BlockStats {
    blocks: usize,
    full_blocks: usize,
    bytes: u64,
    smallest: Option<usize>,
}

impl BlockStats {
    fn add(&mut self, len: usize, block_size: usize) {
        self.blocks += 1;
        self.bytes += len as u64;
        if len == block_size {
            self.full_blocks += 1;
        }
        self.smallest = Some(self.smallest.map_or(len, |s| s.min(len)));
    }
}

/// Reblock an image and report how the blocks came out
pub fn run(input: &InputArgs, blocks: &BlockArgs) -> Result<(), Box<dyn std::error::Error>> {
    let format = resolve_format(input)?;
    let image = format.read_all(open_input(input)?)?;
    println!(
        "Read {} records ({} bytes) from {}",
        image.len(),
        image.total_bytes(),
        input.input.display()
    );

    let mut options = ReblockOptions::default().with_preserve_splits(blocks.preserve_splits);
    if let Some(size) = blocks.block_size {
        options = options.with_record_size(size);
    }
    let block_size = options.record_size;
    let mut stream = image.iter_records().reblock(options)?;

    let pb = ProgressBar::new(stream.progress().total.unwrap_or(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} Reblocking")?
            .progress_chars("#>-"),
    );

    let mut stats = BlockStats::default();
    while let Some(block) = stream.next() {
        let block = block?;
        stats.add(block.len(), block_size);
        pb.set_position(stream.progress().consumed);
    }
    pb.finish_and_clear();

    println!(
        "{} blocks of up to {} bytes: {} full, {} short",
        stats.blocks,
        block_size,
        stats.full_blocks,
        stats.blocks - stats.full_blocks
    );
    if let Some(smallest) = stats.smallest {
        println!("Smallest block:  {} bytes", smallest);
    }
    println!("Total:           {}", format_size(stats.bytes));

    Ok(())
}
