use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use scubes_core::pipeline::PipelineConfig;
use scubes_core::target::ObjectEntry;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default PipelineConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = PipelineConfig {
        objects: vec![ObjectEntry {
            name: "NGC1374".into(),
            ra: "03:35:16.598".into(),
            dec: "-35:13:34.50".into(),
            tile: "SPLUS-s27s34".into(),
            size: 600,
            angsize: Some(210.0),
            spec_z: "0.00433".into(),
            phot_z: String::new(),
        }],
        ..PipelineConfig::default()
    };
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
