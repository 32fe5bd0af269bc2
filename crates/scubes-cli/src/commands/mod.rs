pub mod calibrate;
pub mod config;
pub mod info;
pub mod mask;
pub mod run;
pub mod stamps;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use scubes_core::pipeline::PipelineConfig;
use scubes_core::target::{ObjectEntry, Target};

/// Options shared by every command that works on configured objects.
#[derive(Args)]
pub struct ObjectArgs {
    /// Pipeline config file (TOML)
    #[arg(short, long, default_value = "scubes.toml")]
    pub config: PathBuf,

    /// Only process these objects (repeatable)
    #[arg(long = "object")]
    pub objects: Vec<String>,
}

impl ObjectArgs {
    /// Load the config, keeping only the selected objects.
    pub fn load(&self) -> Result<PipelineConfig> {
        let mut config = load_config(&self.config)?;
        if !self.objects.is_empty() {
            for name in &self.objects {
                if !config.objects.iter().any(|o| &o.name == name) {
                    bail!("Object {name} is not in {}", self.config.display());
                }
            }
            config.objects.retain(|o| self.objects.contains(&o.name));
        }
        if config.objects.is_empty() {
            bail!("No objects configured in {}", self.config.display());
        }
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid pipeline config {}", path.display()))
}

pub fn resolve(entry: &ObjectEntry) -> Result<Target> {
    entry
        .to_target()
        .with_context(|| format!("Invalid object entry {}", entry.name))
}
