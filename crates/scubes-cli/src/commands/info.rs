use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scubes_core::io::fits::FitsFile;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Also print every header card
    #[arg(long)]
    pub headers: bool,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let file = FitsFile::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    println!("HDUs:        {}", file.hdu_count());
    println!();

    for i in 0..file.hdu_count() {
        let header = file.header(i)?;
        let name = header.get_str("EXTNAME").unwrap_or(if i == 0 { "PRIMARY" } else { "" });
        let kind = match header.get_str("XTENSION") {
            Some(x) => x.trim().to_string(),
            None => "PRIMARY".to_string(),
        };
        let dims = match file.image_shape(i) {
            Some(shape) => shape.iter().rev().map(|n| n.to_string()).collect::<Vec<_>>().join("x"),
            None => "-".to_string(),
        };
        let bitpix = header.get_i64("BITPIX").unwrap_or(0);
        println!("  {i:>2}  {name:<10} {kind:<9} BITPIX={bitpix:<4} {dims}");

        for key in ["OBJECT", "FILTER", "MAGZP", "BUNIT", "BSCALE"] {
            if let Some(v) = header.get(key) {
                println!("        {key:<8} = {v}");
            }
        }
        if args.headers {
            for card in header.cards() {
                match &card.value {
                    Some(v) => println!("        {:<8} = {v}", card.keyword),
                    None => println!("        {} {}", card.keyword, card.comment.as_deref().unwrap_or("")),
                }
            }
        }
    }
    Ok(())
}
