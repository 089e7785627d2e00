//! CLI argument parsing

use clap::{Parser, Subcommand};
use rbsl_hex::HexFormat;
use std::path::PathBuf;

/// Parse a string as a hex or decimal size
fn parse_size(s: &str) -> Result<usize, String> {
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))?
    } else {
        s.parse::<usize>().map_err(|e| format!("Invalid number: {}", e))?
    };
    if value == 0 {
        return Err("Size must be non-zero".to_string());
    }
    Ok(value)
}

#[derive(Parser)]
#[command(name = "rbsl")]
#[command(author, version, about = "Firmware hex image reader", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Input image options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Input image file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Image format (ihex or titext); taken from the file extension if omitted
    #[arg(short, long)]
    pub format: Option<HexFormat>,
}

/// Reblocking options
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BlockArgs {
    /// Block size in bytes (e.g. "64", "0x100")
    #[arg(short, long, value_parser = parse_size)]
    pub block_size: Option<usize>,

    /// Never merge bytes from different input records into one block
    #[arg(long)]
    pub preserve_splits: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the records of an image, one per line
    Records {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        blocks: BlockArgs,

        /// Run each stage on its own thread
        #[arg(long)]
        threaded: bool,
    },

    /// Show a summary of an image: size, entry point and address ranges
    Info {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Reblock an image and report block statistics
    Blocks {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        blocks: BlockArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("64"), Ok(64));
        assert_eq!(parse_size("0x100"), Ok(256));
        assert_eq!(parse_size("0X10"), Ok(16));
        assert!(parse_size("0").is_err());
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_parse_records_args() {
        let cli = Cli::try_parse_from([
            "rbsl",
            "records",
            "-i",
            "fw.txt",
            "-f",
            "titext",
            "--block-size",
            "0x40",
            "--preserve-splits",
        ])
        .unwrap();
        match cli.command {
            Commands::Records {
                input,
                blocks,
                threaded,
            } => {
                assert_eq!(input.input, PathBuf::from("fw.txt"));
                assert_eq!(input.format, Some(HexFormat::TiText));
                assert_eq!(blocks.block_size, Some(64));
                assert!(blocks.preserve_splits);
                assert!(!threaded);
            }
            _ => panic!("expected records command"),
        }
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["rbsl", "info", "-i", "fw.hex", "-f", "srec"]).is_err());
    }
}
