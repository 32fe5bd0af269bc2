use anyhow::{Context, Result};
use clap::Args;
use scubes_core::pipeline::{calibrate_target, Services};

use super::{resolve, ObjectArgs};

#[derive(Args)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub objects: ObjectArgs,
}

pub fn run(args: &CalibrateArgs) -> Result<()> {
    let config = args.objects.load()?;
    let services = Services::from_config(&config);

    for entry in &config.objects {
        let target = resolve(entry)?;
        let stamps = calibrate_target(&services, &target)
            .with_context(|| format!("Calibration failed for {}", target.name))?;
        println!("{}", target.name);
        for s in &stamps {
            println!("  {:<5} MAGZP = {:.5}", s.band.code(), s.zero_point);
        }
    }
    Ok(())
}
