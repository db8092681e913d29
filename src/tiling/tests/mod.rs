//! Tests for the tiled compositing coordinator
//!
//! Runs complete tiled requests over synthetic scans written to temporary
//! directories.

pub mod tiled_generation;

use crate::compositing::Toolbox;
use crate::io::write_object;
use crate::models::{AreaDefinition, PolarObject, PolarScan, RadarObject, fixtures};
use crate::quality::QualityRegistry;
use crate::registry::AreaRegistry;
use crate::tiling::TilingOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Area "swe" split into a western and an eastern half at x = 0
pub(crate) fn split_registry() -> (AreaRegistry, AreaDefinition) {
    let area = fixtures::area("swe", 14.0, 56.0, 200_000.0, 4000.0);
    let mut registry = AreaRegistry::new();
    registry.add_area(area.clone()).unwrap();
    registry
        .add_tiled_area("swe", area.split(2, 1).unwrap())
        .unwrap();
    (registry, area)
}

pub(crate) fn toolbox(registry: AreaRegistry) -> Arc<Toolbox> {
    Arc::new(Toolbox::new(
        Arc::new(registry),
        Arc::new(QualityRegistry::with_builtin_detectors("DBZH", 10.0)),
    ))
}

pub(crate) fn write_scan(dir: &Path, scan: PolarScan) -> PathBuf {
    let path = dir.join(format!("{}.json", scan.source.replace([':', ','], "_")));
    write_object(&path, &RadarObject::from(PolarObject::Scan(scan))).unwrap();
    path
}

/// One radar well inside each half and one straddling the split
pub(crate) fn three_radars(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_scan(dir, fixtures::scan("WMO:02606,NOD:sewest", 12.2, 56.0)),
        write_scan(dir, fixtures::scan("NOD:semid", 14.0, 56.5)),
        write_scan(dir, fixtures::scan("RAD:SE53,NOD:seeast", 15.9, 55.5)),
    ]
}

pub(crate) fn options(scratch_root: &Path) -> TilingOptions {
    TilingOptions::default()
        .with_tile_workers(2)
        .with_cores(4)
        .with_scratch_root(scratch_root)
}

/// Files left anywhere below `root`
pub(crate) fn remaining_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
