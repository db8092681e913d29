//! Command implementations for the radar compositor CLI
//!
//! Each subcommand is implemented in its own module.

pub mod apply_qc;
pub mod areas;
pub mod generate;
pub mod shared;

use crate::cli::args::{Args, Commands};
use anyhow::Result;

/// Dispatch to the subcommand handler
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Generate(generate_args)) => {
            generate::run_generate(generate_args).await?;
        }
        Some(Commands::ApplyQc(apply_args)) => apply_qc::run_apply_qc(apply_args).await?,
        Some(Commands::Areas(areas_args)) => areas::run_areas(areas_args).await?,
        None => anyhow::bail!("No command given, see --help"),
    }
    Ok(())
}
