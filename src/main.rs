//! rbsl - Firmware hex image reader
//!
//! Reads Intel HEX and TI-Text firmware images and regroups their contents
//! into the fixed-size, address-contiguous blocks a bootstrap loader writes.
//!
//! # Architecture
//!
//! All decoding lives in the `rbsl-hex` crate:
//! - **Parsers** turn an image file into a stream of address-tagged records
//! - **Reblocker** regroups a record stream into uniform blocks
//!
//! The commands here only build a pipeline from those pieces and print what
//! comes out, so images can be checked before they are sent to a device.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Records {
            input,
            blocks,
            threaded,
        } => commands::records::run(&input, &blocks, threaded),
        Commands::Info { input } => commands::info::run(&input),
        Commands::Blocks { input, blocks } => commands::blocks::run(&input, &blocks),
    }
}
