mod commands;
mod progress;
mod prompt;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scubes", about = "S-PLUS data cube builder")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build data cubes for the configured objects
    Run(commands::run::RunArgs),
    /// Cut data, weight and detection stamps
    Stamps(commands::stamps::StampsArgs),
    /// Write zero points into the data stamps
    Calibrate(commands::calibrate::CalibrateArgs),
    /// Build and refine the source masks
    Mask(commands::mask::MaskArgs),
    /// Show FITS file structure
    Info(commands::info::InfoArgs),
    /// Print a default pipeline config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Stamps(args) => commands::stamps::run(args),
        Commands::Calibrate(args) => commands::calibrate::run(args),
        Commands::Mask(args) => commands::mask::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
