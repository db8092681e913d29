//! Command-line argument definitions for the radar compositor
//!
//! This module defines the complete CLI interface using the clap derive API.
//! Option strings are kept as given and parsed into typed values by
//! [`GenerateArgs::to_request`], so an unknown product or mode is reported as a
//! configuration error before any file is read.

use crate::compositing::CompositeRequest;
use crate::config::CompositorConfig;
use crate::constants::{DATE_FORMAT, TIME_FORMAT};
use crate::io::ObjectStoreConfig;
use crate::models::{InterpolationMethod, ProductType, QualityControlMode, SelectionMethod};
use crate::quality::ApplyQualityRequest;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the radar compositor
///
/// Composites polar weather-radar scans and volumes into Cartesian products,
/// splitting large areas into tiles generated by parallel workers.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "radar-compositor",
    version,
    about = "Composite polar weather-radar observations into Cartesian products",
    long_about = "Generates radar composites from polar scans and volumes. Large areas are split \
                  into tiles that are composited by a bounded pool of workers and pasted back \
                  together. Quality-control detectors can run before tiling or inside each tile."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Generate a composite from a set of radar files
    Generate(GenerateArgs),
    /// Apply quality control to a single volume
    ApplyQc(ApplyQcArgs),
    /// List the areas of the area registry
    Areas(AreasArgs),
}

/// Options shared by every subcommand
#[derive(Debug, Clone, Default, Parser)]
pub struct CommonArgs {
    /// Path to configuration file
    ///
    /// YAML configuration file. If not specified, looks for
    /// ~/.config/radar-compositor/config.yaml
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Area registry file (YAML), overriding the configured one
    #[arg(long = "registry", value_name = "FILE")]
    pub registry: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

/// Arguments for the generate command
#[derive(Debug, Clone, Parser)]
pub struct GenerateArgs {
    /// Input files, directories (searched recursively) or glob patterns
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Output file for the composite
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Registered area id; a best-fit area is derived when omitted
    #[arg(short = 'a', long = "area", value_name = "ID")]
    pub area: Option<String>,

    /// Nominal date (YYYYMMDD)
    #[arg(long = "date", value_name = "YYYYMMDD")]
    pub date: Option<String>,

    /// Nominal time (HHMMSS)
    #[arg(long = "time", value_name = "HHMMSS")]
    pub time: Option<String>,

    #[arg(long = "quantity", default_value = "DBZH")]
    pub quantity: String,

    /// Product: ppi, cappi, pcappi, pmax or max
    #[arg(long = "product", default_value = "pcappi")]
    pub product: String,

    /// Product parameter: height, height[,range] for pmax, or elevation in degrees for ppi
    #[arg(long = "prodpar", value_name = "VALUE")]
    pub prodpar: Option<String>,

    /// NEAREST_RADAR or HEIGHT_ABOVE_SEALEVEL
    #[arg(long = "selection", default_value = "NEAREST_RADAR")]
    pub selection: String,

    #[arg(long = "interpolation", default_value = "NEAREST_VALUE")]
    pub interpolation: String,

    /// Comma-separated quality-control detectors, applied in order
    #[arg(long = "detectors", value_name = "LIST", value_delimiter = ',')]
    pub detectors: Vec<String>,

    /// analyze or analyze_and_apply
    #[arg(long = "qc-mode", default_value = "analyze_and_apply")]
    pub qc_mode: String,

    /// Recompute quality fields already present on the inputs
    #[arg(long = "reprocess-qfields")]
    pub reprocess_quality_fields: bool,

    /// Drop malfunctioning scans and volumes
    #[arg(long = "ignore-malfunc")]
    pub ignore_malfunc: bool,

    /// Apply gauge radar adjustment
    #[arg(long = "gra")]
    pub apply_gra: bool,

    #[arg(long = "zr-a")]
    pub zr_a: Option<f64>,

    #[arg(long = "zr-b")]
    pub zr_b: Option<f64>,

    /// Apply the cloud-type filter
    #[arg(long = "ctfilter")]
    pub apply_ctfilter: bool,

    /// Fill single-pixel gaps
    #[arg(long = "gap-filling")]
    pub apply_gap_filling: bool,

    /// Quality field deciding between overlapping radars
    #[arg(long = "qitotal-field", value_name = "TASK")]
    pub qi_total_field: Option<String>,

    /// Use the radar's own source when a single radar contributes
    #[arg(long = "use-site-source")]
    pub use_site_source: bool,

    /// Best-fit projection id
    #[arg(long = "pcsid")]
    pub pcsid: Option<String>,

    /// Best-fit pixel size (m)
    #[arg(long = "scale", value_name = "METRES")]
    pub scale: Option<f64>,

    #[arg(long = "gain")]
    pub gain: Option<f64>,

    #[arg(long = "offset")]
    pub offset: Option<f64>,

    #[arg(long = "minvalue")]
    pub minvalue: Option<f64>,

    /// Copy every quality-controlled input into this directory
    #[arg(long = "dump", value_name = "DIR")]
    pub dump_path: Option<PathBuf>,

    /// Maximum number of tile workers
    #[arg(short = 'j', long = "tile-workers", value_name = "COUNT")]
    pub tile_workers: Option<usize>,

    /// Quality control the inputs once before tiling
    #[arg(long = "preprocess-qc")]
    pub preprocess_qc: bool,

    /// Run the pre-stage on a worker pool
    #[arg(long = "mp-process-qc", requires = "preprocess_qc")]
    pub mp_process_qc: bool,

    /// Give every pre-stage worker an even slice of the inputs
    #[arg(long = "mp-process-qc-split-evenly", requires = "mp_process_qc")]
    pub mp_process_qc_split_evenly: bool,

    /// Maximum number of pre-stage workers
    #[arg(long = "qc-workers", value_name = "COUNT")]
    pub qc_workers: Option<usize>,

    /// Directory for temporary files
    #[arg(long = "scratch-dir", value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl GenerateArgs {
    pub fn parse_date(&self) -> Result<Option<NaiveDate>> {
        self.date.as_deref().map(parse_date).transpose()
    }

    pub fn parse_time(&self) -> Result<Option<NaiveTime>> {
        self.time.as_deref().map(parse_time).transpose()
    }

    /// Build the composite request, validating every option string
    pub fn to_request(&self, config: &CompositorConfig) -> Result<CompositeRequest> {
        let mut request = CompositeRequest::new()
            .with_quantity(self.quantity.clone())
            .with_product(self.product.parse::<ProductType>()?)
            .with_selection(self.selection.parse::<SelectionMethod>()?)
            .with_interpolation(self.interpolation.parse::<InterpolationMethod>()?)
            .with_detectors(&self.detectors)
            .with_qc_mode(self.qc_mode.parse::<QualityControlMode>()?)
            .with_ignore_malfunc(self.ignore_malfunc)
            .with_store(config.object_store());

        if let Some(prodpar) = &self.prodpar {
            request = request.with_prodpar(prodpar.clone());
        }
        if self.apply_gra {
            let (zr_a, zr_b) = (
                self.zr_a.unwrap_or(request.zr_a),
                self.zr_b.unwrap_or(request.zr_b),
            );
            request = request.with_gra(zr_a, zr_b);
        }
        if self.apply_ctfilter {
            request = request.with_ctfilter();
        }
        if self.apply_gap_filling {
            request = request.with_gap_filling();
        }
        if let Some(path) = &self.dump_path {
            request = request.with_dump_path(path.clone());
        }

        request.reprocess_quality_fields = self.reprocess_quality_fields;
        request.qi_total_field = self.qi_total_field.clone();
        request.use_site_source = self.use_site_source;
        request.center_id = config.center_id.clone();
        if let Some(pcsid) = &self.pcsid {
            request.pcsid = pcsid.clone();
        }
        if let Some(scale) = self.scale {
            request.xscale = scale;
            request.yscale = scale;
        }
        if let Some(gain) = self.gain {
            request.gain = gain;
        }
        if let Some(offset) = self.offset {
            request.offset = offset;
        }
        if let Some(minvalue) = self.minvalue {
            request.minvalue = minvalue;
        }

        request.validate()?;
        Ok(request)
    }

    /// Apply worker and pre-stage flags on top of the layered configuration
    pub fn apply_overrides(&self, config: &mut CompositorConfig) {
        if let Some(workers) = self.tile_workers {
            config.tile_workers = Some(workers);
        }
        if let Some(workers) = self.qc_workers {
            config.qc_workers = workers;
        }
        if self.preprocess_qc {
            config.preprocess_qc = true;
            config.mp_process_qc = self.mp_process_qc;
            config.mp_process_qc_split_evenly = self.mp_process_qc_split_evenly;
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if let Some(registry) = &self.common.registry {
            config.registry = Some(registry.clone());
        }
    }
}

/// Arguments for the apply-qc command
#[derive(Debug, Clone, Parser)]
pub struct ApplyQcArgs {
    /// Volume or scan file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file for the quality-controlled object
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Comma-separated detectors, or nimbus-configured-qc for per-radar selection
    #[arg(long = "detectors", value_name = "LIST", value_delimiter = ',')]
    pub detectors: Vec<String>,

    #[arg(long = "qc-mode", default_value = "analyze_and_apply")]
    pub qc_mode: String,

    /// Remove malfunctioning scans; a wholly malfunctioning volume is not written
    #[arg(long = "remove-malfunc")]
    pub remove_malfunc: bool,

    /// Replace the nominal date (YYYYMMDD)
    #[arg(long = "date", value_name = "YYYYMMDD")]
    pub date: Option<String>,

    /// Replace the nominal time (HHMMSS)
    #[arg(long = "time", value_name = "HHMMSS")]
    pub time: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ApplyQcArgs {
    pub fn to_request(&self) -> Result<ApplyQualityRequest> {
        Ok(ApplyQualityRequest::new(&self.detectors)
            .with_qc_mode(self.qc_mode.parse()?)
            .with_remove_malfunc(self.remove_malfunc)
            .with_date_time(
                self.date.as_deref().map(parse_date).transpose()?,
                self.time.as_deref().map(parse_time).transpose()?,
            ))
    }
}

/// Arguments for the areas command
#[derive(Debug, Clone, Parser)]
pub struct AreasArgs {
    /// Also list the tiles of tiled areas
    #[arg(long = "tiles")]
    pub tiles: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl Args {
    pub fn common(&self) -> Option<&CommonArgs> {
        match self.command.as_ref()? {
            Commands::Generate(args) => Some(&args.common),
            Commands::ApplyQc(args) => Some(&args.common),
            Commands::Areas(args) => Some(&args.common),
        }
    }
}

/// Parse a compact `YYYYMMDD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| Error::datetime_parsing(format!("Invalid date '{}', expected YYYYMMDD", value), e))
}

/// Parse a compact `HHMMSS` time; `HHMM` is accepted with zero seconds
pub fn parse_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    let padded = if value.len() == 4 {
        format!("{}00", value)
    } else {
        value.to_string()
    };
    NaiveTime::parse_from_str(&padded, TIME_FORMAT)
        .map_err(|e| Error::datetime_parsing(format!("Invalid time '{}', expected HHMMSS", value), e))
}
