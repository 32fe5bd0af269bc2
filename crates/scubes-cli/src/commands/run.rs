use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use scubes_core::pipeline::{run_pipeline_reported, ProgressReporter, Services};

use super::ObjectArgs;
use crate::progress::BarReporter;
use crate::prompt::make_prompt;
use crate::summary::{print_object_reports, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub objects: ObjectArgs,

    /// Rebuild cubes that already exist
    #[arg(long)]
    pub rebuild: bool,

    /// Do not attach a mask layer
    #[arg(long)]
    pub no_mask: bool,

    /// Accept the proposed masks without prompting
    #[arg(long)]
    pub accept_mask: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = args.objects.load()?;
    if args.no_mask {
        config.cube.include_mask = false;
    }
    print_run_summary(&config, args.rebuild);

    let services = Services::from_config(&config);
    let mut prompt = make_prompt(args.accept_mask);
    let reporter: Arc<dyn ProgressReporter> = Arc::new(BarReporter::new());
    let reports = run_pipeline_reported(&config, &services, args.rebuild, prompt.as_mut(), reporter);

    print_object_reports(&reports);
    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} object(s) failed", reports.len());
    }
    Ok(())
}
