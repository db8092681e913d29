//! Areas command: list the area registry.

use super::shared::{load_configuration, load_registry, setup_logging};
use crate::cli::args::AreasArgs;
use anyhow::Result;
use colored::*;

pub async fn run_areas(args: AreasArgs) -> Result<()> {
    setup_logging(&args.common)?;
    let config = load_configuration(&args.common)?;
    let registry = load_registry(&config)?;

    println!("{}", "Projections:".bright_green().bold());
    for (id, definition) in registry.projections() {
        println!("  {} {}", id.bright_cyan(), definition.bright_black());
    }

    println!("\n{}", "Areas:".bright_green().bold());
    for area in registry.areas() {
        let tiles = registry.tiles(&area.id).map_or(0, <[_]>::len);
        println!(
            "  {} {}x{} at {}x{} m, pcsid {}{}",
            area.id.bright_cyan(),
            area.xsize,
            area.ysize,
            area.xscale,
            area.yscale,
            area.pcsid.as_deref().unwrap_or("-"),
            if tiles > 0 {
                format!(", {} tiles", tiles).bright_yellow().to_string()
            } else {
                String::new()
            }
        );
        if args.tiles {
            for tile in registry.tiles(&area.id).unwrap_or_default() {
                println!(
                    "      {} {}x{} [{:.0}, {:.0}, {:.0}, {:.0}]",
                    tile.id,
                    tile.xsize,
                    tile.ysize,
                    tile.extent.llx,
                    tile.extent.lly,
                    tile.extent.urx,
                    tile.extent.ury
                );
            }
        }
    }
    Ok(())
}
