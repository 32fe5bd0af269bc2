use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use scubes_core::pipeline::{build_mask, ProgressReporter, Services};

use super::{resolve, ObjectArgs};
use crate::progress::BarReporter;
use crate::prompt::make_prompt;

#[derive(Args)]
pub struct MaskArgs {
    #[command(flatten)]
    pub objects: ObjectArgs,

    /// Build the mask again even if one exists
    #[arg(long)]
    pub redo: bool,

    /// Accept the proposed mask without prompting
    #[arg(long)]
    pub accept_mask: bool,
}

pub fn run(args: &MaskArgs) -> Result<()> {
    let config = args.objects.load()?;
    let services = Services::from_config(&config);
    let mut prompt = make_prompt(args.accept_mask);
    let reporter: Arc<dyn ProgressReporter> = Arc::new(BarReporter::new());

    for entry in &config.objects {
        let target = resolve(entry)?;
        match build_mask(&config, &services, &target, args.redo, prompt.as_mut(), &reporter)
            .with_context(|| format!("Mask failed for {}", target.name))?
        {
            Some(path) => println!("{}: mask {}", target.name, path.display()),
            None => println!("{}: refinement quit, no mask saved", target.name),
        }
    }
    Ok(())
}
