//! Shared builders for integration tests
//!
//! Writes synthetic polar scans and an area registry to a temporary
//! directory using only the public library types.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use ndarray::Array2;
use radar_compositor::io::write_object;
use radar_compositor::models::{Attributes, Parameter, PolarObject, PolarScan, PolarVolume};
use radar_compositor::{AreaRegistry, RadarObject};
use std::path::{Path, PathBuf};

pub const NRAYS: usize = 72;
pub const NBINS: usize = 50;

/// Area "swe" (100x100 pixels of 4 km) split into two tiles
pub const REGISTRY_YAML: &str = r#"
areas:
  swe:
    projection: "+proj=aeqd +lat_0=56 +lon_0=14 +R=6371000"
    xsize: 100
    ysize: 100
    xscale: 4000.0
    yscale: 4000.0
    extent: [-200000.0, -200000.0, 200000.0, 200000.0]
tiled_areas:
  swe:
    split: [2, 1]
"#;

pub fn nominal_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

pub fn nominal_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap()
}

pub fn scan(source: &str, lon: f64, lat: f64, elangle_deg: f64) -> PolarScan {
    let mut parameters = IndexMap::new();
    parameters.insert(
        "DBZH".to_string(),
        Parameter {
            gain: 0.5,
            offset: -32.0,
            nodata: 255.0,
            undetect: 0.0,
            data: Array2::from_shape_fn((NRAYS, NBINS), |(r, b)| ((r * 5 + b * 3) % 180 + 1) as f64),
        },
    );
    PolarScan {
        source: source.to_string(),
        date: Some(nominal_date()),
        time: Some(nominal_time()),
        longitude: lon,
        latitude: lat,
        height: 100.0,
        elangle: elangle_deg.to_radians(),
        rstart: 0.0,
        rscale: 2000.0,
        nrays: NRAYS,
        nbins: NBINS,
        attributes: Attributes::new(),
        parameters,
        quality_fields: Vec::new(),
    }
}

pub fn volume(source: &str, lon: f64, lat: f64) -> PolarObject {
    PolarObject::Volume(PolarVolume {
        source: source.to_string(),
        date: Some(nominal_date()),
        time: Some(nominal_time()),
        longitude: lon,
        latitude: lat,
        height: 100.0,
        attributes: Attributes::new(),
        scans: vec![scan(source, lon, lat, 0.5), scan(source, lon, lat, 1.5)],
    })
}

pub fn write_polar(dir: &Path, name: &str, object: PolarObject) -> PathBuf {
    let path = dir.join(format!("{}.json", name));
    write_object(&path, &RadarObject::from(object)).unwrap();
    path
}

/// Three radars: one per tile and one on the tile boundary
pub fn three_radars(dir: &Path) -> Vec<PathBuf> {
    vec![
        write_polar(
            dir,
            "sewest",
            PolarObject::Scan(scan("WMO:02606,NOD:sewest", 12.2, 56.0, 0.5)),
        ),
        write_polar(
            dir,
            "semid",
            PolarObject::Scan(scan("NOD:semid", 14.0, 56.5, 0.5)),
        ),
        write_polar(
            dir,
            "seeast",
            PolarObject::Scan(scan("RAD:SE53,NOD:seeast", 15.9, 55.5, 0.5)),
        ),
    ]
}

pub fn write_registry(dir: &Path) -> PathBuf {
    let path = dir.join("areas.yaml");
    std::fs::write(&path, REGISTRY_YAML).unwrap();
    path
}

pub fn registry() -> AreaRegistry {
    AreaRegistry::from_yaml(REGISTRY_YAML).unwrap()
}

/// Number of files anywhere below `root`
pub fn files_below(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
