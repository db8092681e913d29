//! Apply-qc command: quality control of one volume.

use super::shared::{load_configuration, setup_logging};
use crate::cli::args::ApplyQcArgs;
use crate::constants::DEFAULT_QUANTITY;
use crate::quality::{QualityApplier, QualityRegistry};
use anyhow::{Context, Result};
use colored::*;
use tracing::info;

pub async fn run_apply_qc(args: ApplyQcArgs) -> Result<()> {
    setup_logging(&args.common)?;
    let config = load_configuration(&args.common)?;
    let request = args.to_request()?;

    let registry = QualityRegistry::with_builtin_detectors(DEFAULT_QUANTITY, config.detector_threshold);
    let selection = config.detector_selection.clone();
    let (input, output) = (args.input.clone(), args.output.clone());

    let applied = tokio::task::spawn_blocking(move || {
        QualityApplier::new(&registry, &selection).apply_file(&input, &output, &request)
    })
    .await
    .context("Quality control task failed")?
    .with_context(|| format!("Failed to quality control {}", args.input.display()))?;

    match applied {
        Some(applied) => {
            info!("Wrote {}", args.output.display());
            if args.common.show_progress() {
                println!(
                    "{} {} ({})",
                    "Quality controlled:".bright_green(),
                    args.output.display(),
                    applied.detectors.join(",")
                );
            }
        }
        None => println!(
            "{}",
            "Volume is malfunctioning, nothing written".bright_yellow()
        ),
    }
    Ok(())
}
