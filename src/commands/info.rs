//! Info command implementation

use super::{format_size, open_input, resolve_format};
use crate::cli::InputArgs;
use rbsl_hex::{EntryPoint, HexFormat, IntelHexParser, RecordSequence};

/// Print a summary of an image
pub fn run(input: &InputArgs) -> Result<(), Box<dyn std::error::Error>> {
    let format = resolve_format(input)?;
    let reader = open_input(input)?;

    let (image, entry_point) = match format {
        HexFormat::IntelHex => {
            let mut parser = IntelHexParser::new(reader);
            let image = RecordSequence::from_stream(parser.by_ref())?;
            (image, parser.entry_point())
        }
        HexFormat::TiText => (format.read_all(reader)?, None),
    };

    println!("Image Information");
    println!("=================");
    println!();
    println!("File:            {}", input.input.display());
    println!("Format:          {}", format);
    println!("Records:         {}", image.len());
    println!(
        "Data:            {} bytes ({})",
        image.total_bytes(),
        format_size(image.total_bytes())
    );
    match entry_point {
        Some(EntryPoint::Linear(addr)) => println!("Entry point:     0x{:08X}", addr),
        Some(EntryPoint::Segment { cs, ip }) => {
            println!("Entry point:     {:04X}:{:04X}", cs, ip)
        }
        None => {}
    }

    let ranges = image.ranges();
    if !ranges.is_empty() {
        println!();
        println!("Address ranges:");
        for range in &ranges {
            println!(
                "  0x{:08X} - 0x{:08X} ({})",
                range.start,
                range.end - 1,
                format_size(range.end - range.start)
            );
        }
    }

    Ok(())
}
