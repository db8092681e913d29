use clap::Parser;
use radar_compositor::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        // Scratch files are removed when the request future is dropped
        tokio::select! {
            result = commands::run(args) => result,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    eprintln!("\nReceived CTRL+C, shutting down...");
                    Err(anyhow::anyhow!("Processing interrupted by user"))
                }
                Err(e) => Err(anyhow::anyhow!("Failed to install CTRL+C handler: {}", e)),
            },
        }
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Radar Compositor - Tiled weather-radar compositing");
    println!("==================================================");
    println!();
    println!("Composite polar radar scans and volumes into Cartesian products.");
    println!();
    println!("USAGE:");
    println!("    radar-compositor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    generate    Generate a composite from a set of radar files");
    println!("    apply-qc    Apply quality control to a single volume");
    println!("    areas       List the areas of the area registry");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Composite a registered (possibly tiled) area:");
    println!("    radar-compositor generate /data/pvol -a swegmaps_2000 -o composite.json \\");
    println!("                              --detectors ropo,beamb --registry areas.yaml");
    println!();
    println!("    # Best-fit area, quality control once before tiling on 4 workers:");
    println!("    radar-compositor generate '/data/pvol/*.json' -o composite.json \\");
    println!("                              --detectors distance --preprocess-qc --mp-process-qc --qc-workers 4");
    println!();
    println!("    # Per-radar configured quality control of one volume:");
    println!("    radar-compositor apply-qc pvol.json -o qc.json --detectors nimbus-configured-qc");
    println!();
    println!("For detailed help on any command, use:");
    println!("    radar-compositor <COMMAND> --help");
}
