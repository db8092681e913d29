//! Radar Compositor Library
//!
//! Composites polar weather-radar observations (scans and volumes) into
//! Cartesian products over a geographic area.
//!
//! This library provides tools for:
//! - Reading radar objects and skipping malfunctioning or unreadable inputs
//! - Running named quality-control detectors with provenance tracking
//! - Generating single-area composites (PPI, CAPPI, PCAPPI, PMAX, MAX)
//! - Splitting large areas into tiles composited by a bounded worker pool
//! - Pasting partial tile composites back into one product
//! - Quality controlling single volumes ahead of compositing

pub mod compositing;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod models;
pub mod projection;
pub mod quality;
pub mod registry;
pub mod tiling;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use compositing::{AreaTarget, CompositeRequest, Compositor, Toolbox};
pub use config::{CompositorConfig, SystemProfile};
pub use error::{Error, Result};
pub use models::{AreaDefinition, CartesianProduct, PolarObject, RadarObject};
pub use registry::AreaRegistry;
pub use tiling::{TiledCompositeStats, TiledCompositor, TilingOptions};
