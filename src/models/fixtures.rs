//! Synthetic radar objects for unit tests.

use super::{AreaDefinition, Attributes, Extent, Parameter, PolarObject, PolarScan, PolarVolume};
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use ndarray::Array2;

pub const NRAYS: usize = 72;
pub const NBINS: usize = 50;
pub const RSCALE: f64 = 2000.0;

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

pub fn time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap()
}

/// Reflectivity-like raw values, never equal to nodata (255) or undetect (0)
pub fn dbzh(nrays: usize, nbins: usize, seed: usize) -> Parameter {
    Parameter {
        gain: 0.5,
        offset: -32.0,
        nodata: 255.0,
        undetect: 0.0,
        data: Array2::from_shape_fn((nrays, nbins), |(r, b)| {
            ((r * 7 + b * 3 + seed * 11) % 200 + 1) as f64
        }),
    }
}

pub fn scan_with(source: &str, lon: f64, lat: f64, elangle_deg: f64, nbins: usize) -> PolarScan {
    let mut parameters = IndexMap::new();
    parameters.insert("DBZH".to_string(), dbzh(NRAYS, nbins, source.len()));
    PolarScan {
        source: source.to_string(),
        date: Some(date()),
        time: Some(time()),
        longitude: lon,
        latitude: lat,
        height: 100.0,
        elangle: elangle_deg.to_radians(),
        rstart: 0.0,
        rscale: RSCALE,
        nrays: NRAYS,
        nbins,
        attributes: Attributes::new(),
        parameters,
        quality_fields: Vec::new(),
    }
}

pub fn scan(source: &str, lon: f64, lat: f64) -> PolarScan {
    scan_with(source, lon, lat, 0.5, NBINS)
}

/// Volume whose first scan has the longest range
pub fn volume(source: &str, lon: f64, lat: f64, nscans: usize) -> PolarObject {
    let scans = (0..nscans)
        .map(|i| scan_with(source, lon, lat, 0.5 + i as f64, NBINS - i * 5))
        .collect();
    PolarObject::Volume(PolarVolume {
        source: source.to_string(),
        date: Some(date()),
        time: Some(time()),
        longitude: lon,
        latitude: lat,
        height: 100.0,
        attributes: Attributes::new(),
        scans,
    })
}

/// Azimuthal equidistant area centred on (lon, lat), `half_width` metres each way
pub fn area(id: &str, lon: f64, lat: f64, half_width: f64, scale: f64) -> AreaDefinition {
    let size = (2.0 * half_width / scale).round() as usize;
    AreaDefinition {
        id: id.to_string(),
        pcsid: None,
        projection: format!("+proj=aeqd +lat_0={} +lon_0={} +R=6371000", lat, lon),
        xscale: scale,
        yscale: scale,
        xsize: size,
        ysize: size,
        extent: Extent {
            llx: -half_width,
            lly: -half_width,
            urx: half_width,
            ury: half_width,
        },
    }
}
