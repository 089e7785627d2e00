//! CLI command implementations
//!
//! Each command opens the input image, builds a record pipeline with
//! `rbsl-hex` and reports on what comes out the other end. Device
//! programming is left to the flasher that consumes these blocks.

pub mod blocks;
pub mod info;
pub mod records;

use crate::cli::InputArgs;
use rbsl_hex::HexFormat;
use std::fs::File;
use std::io::BufReader;

/// Work out the image format from `--format` or the file extension
pub fn resolve_format(args: &InputArgs) -> Result<HexFormat, Box<dyn std::error::Error>> {
    if let Some(format) = args.format {
        return Ok(format);
    }
    HexFormat::from_path(&args.input).ok_or_else(|| {
        format!(
            "Cannot tell the format of {} from its extension, use --format",
            args.input.display()
        )
        .into()
    })
}

/// Open the input image
pub fn open_input(args: &InputArgs) -> Result<BufReader<File>, Box<dyn std::error::Error>> {
    let file = File::open(&args.input)
        .map_err(|e| format!("Failed to open {}: {}", args.input.display(), e))?;
    Ok(BufReader::new(file))
}

/// Format bytes as space-separated hex pairs
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
