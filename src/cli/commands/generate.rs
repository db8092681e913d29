//! Generate command: tiled composite generation from the command line.

use super::shared::{
    build_toolbox, create_progress_bar, discover_inputs, load_configuration, load_registry,
    setup_logging,
};
use crate::cli::args::GenerateArgs;
use crate::compositing::AreaTarget;
use crate::config::SystemProfile;
use crate::constants::attributes;
use crate::io::write_object;
use crate::models::{CartesianProduct, RadarObject};
use crate::tiling::{TiledCompositeStats, TiledCompositor};
use anyhow::{Context, Result};
use colored::*;
use indicatif::HumanDuration;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub async fn run_generate(args: GenerateArgs) -> Result<TiledCompositeStats> {
    setup_logging(&args.common)?;
    info!("Starting radar compositor");
    debug!("Command line arguments: {:?}", args);

    let mut config = load_configuration(&args.common)?;
    args.apply_overrides(&mut config);
    config.validate()?;

    // every option is checked before any input is read
    let request = args.to_request(&config)?;
    let date = args.parse_date()?;
    let time = args.parse_time()?;

    let files = discover_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No input files found in {}", args.inputs.join(", "));
    }

    let registry = load_registry(&config)?;
    let toolbox = build_toolbox(&config, registry, &request.quantity);
    let target = match &args.area {
        Some(id) => AreaTarget::Registered(id.clone()),
        None => AreaTarget::BestFit,
    };

    let profile = SystemProfile::detect();
    let progress = create_progress_bar(args.common.show_progress(), "Compositing tiles");
    let compositor = TiledCompositor::new(toolbox, request)
        .with_options(config.tiling_options(&profile))
        .with_progress(progress.clone());

    let (product, stats) = compositor
        .generate_detailed(&files, date, time, &target)
        .await
        .context("Composite generation failed")?;
    progress.finish_and_clear();

    match product {
        Some(product) => {
            write_object(&args.output, &RadarObject::from(product.clone()))
                .with_context(|| format!("Failed to write {}", args.output.display()))?;
            info!("Composite written to {}", args.output.display());
            if args.common.show_progress() {
                print_summary(&product, &stats, &args.output);
            }
        }
        None => {
            println!(
                "{}",
                "No composite generated: no usable input data".bright_yellow()
            );
        }
    }
    Ok(stats)
}

fn print_summary(product: &CartesianProduct, stats: &TiledCompositeStats, output: &Path) {
    let duration = HumanDuration(Duration::from_millis(stats.processing_time_ms as u64));

    println!("\n{}", "Composite complete".bright_green().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "   • Area: {} ({}x{})",
        product.area.id.bright_cyan(),
        product.area.xsize,
        product.area.ysize
    );
    println!(
        "   • Nominal time: {} {}",
        product.date.format("%Y-%m-%d"),
        product.time.format("%H:%M:%S")
    );
    println!(
        "   • Inputs: {} files, {} usable",
        stats.input_files, stats.usable_objects
    );
    if stats.prestaged_files > 0 {
        println!("   • Pre-staged: {} files", stats.prestaged_files);
    }
    println!(
        "   • Tiles: {} ({} rendered, {} empty) on {} workers",
        stats.tiles,
        stats.tiles_rendered,
        stats.tiles_empty(),
        stats.tile_workers
    );
    if let Some(nodes) = product.attribute(attributes::HOW_NODES) {
        println!("   • Radars: {}", nodes);
    }
    if let Some(tasks) = product.attribute(attributes::HOW_TASK) {
        println!("   • Quality control: {}", tasks);
    }
    println!("   • Processing time: {}", duration);
    if !stats.is_complete() {
        println!(
            "{}",
            format!("⚠️  {} tiles failed and were left empty", stats.tiles_failed).bright_red()
        );
    }
    println!("\n📁 Output: {}", output.display().to_string().bright_white());
}
