use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use scubes_core::pipeline::{acquire_stamps, ProgressReporter, Services};

use super::{resolve, ObjectArgs};
use crate::progress::BarReporter;

#[derive(Args)]
pub struct StampsArgs {
    #[command(flatten)]
    pub objects: ObjectArgs,

    /// Cut stamps again even if they exist
    #[arg(long)]
    pub redo: bool,
}

pub fn run(args: &StampsArgs) -> Result<()> {
    let config = args.objects.load()?;
    let services = Services::from_config(&config);
    let reporter: Arc<dyn ProgressReporter> = Arc::new(BarReporter::new());

    for entry in &config.objects {
        let target = resolve(entry)?;
        let (report, detection) = acquire_stamps(&config, &services, &target, args.redo, &reporter)
            .with_context(|| format!("Stamp acquisition failed for {}", target.name))?;
        println!(
            "{}: {} written, {} existing, {} skipped",
            target.name,
            report.written.len(),
            report.existing,
            report.skipped.len()
        );
        for (band, kind, reason) in &report.skipped {
            println!("  skipped {band} {kind}: {reason:?}");
        }
        println!("  detection: {}", detection.display());
    }
    Ok(())
}
