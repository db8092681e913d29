//! Polar observations: single-elevation scans and multi-elevation volumes.

use super::{Attributes, QualityField, attribute_str, find_quality_field, source::OdimSource};
use crate::constants::{EARTH_RADIUS, attributes};
use crate::projection;
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Effective earth radius of the 4/3 refraction model
const EFFECTIVE_EARTH_RADIUS: f64 = EARTH_RADIUS * 4.0 / 3.0;

/// One quantity of a scan, raw values stored as rays × bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub gain: f64,
    pub offset: f64,
    pub nodata: f64,
    pub undetect: f64,
    pub data: Array2<f64>,
}

/// Decoded content of one polar bin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinValue {
    Data(f64),
    Undetect,
    Nodata,
}

impl Parameter {
    /// Physical value of a bin, out-of-range positions read as nodata
    pub fn value(&self, ray: usize, bin: usize) -> BinValue {
        match self.data.get((ray, bin)) {
            None => BinValue::Nodata,
            Some(&raw) if raw == self.nodata => BinValue::Nodata,
            Some(&raw) if raw == self.undetect => BinValue::Undetect,
            Some(&raw) => BinValue::Data(raw * self.gain + self.offset),
        }
    }
}

/// Location of a geographic point within a scan's sampling geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinLocation {
    pub ray: usize,
    pub bin: usize,
    /// Great-circle distance from the site (m)
    pub ground_distance: f64,
    /// Beam centre height above sea level (m)
    pub beam_height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarScan {
    pub source: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    /// Site longitude and latitude (degrees) and height (m)
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
    /// Elevation angle (radians)
    pub elangle: f64,
    /// Range of the first bin start and bin length (m)
    pub rstart: f64,
    pub rscale: f64,
    pub nrays: usize,
    pub nbins: usize,
    #[serde(default)]
    pub attributes: Attributes,
    pub parameters: IndexMap<String, Parameter>,
    #[serde(default)]
    pub quality_fields: Vec<QualityField>,
}

impl PolarScan {
    pub fn is_malfunctioning(&self) -> bool {
        is_malfunc(&self.attributes)
    }

    pub fn has_parameter(&self, quantity: &str) -> bool {
        self.parameters.contains_key(quantity)
    }

    /// Ground distance covered out to the end of the last bin (m)
    pub fn max_distance(&self) -> f64 {
        (self.rstart + self.nbins as f64 * self.rscale) * self.elangle.cos()
    }

    /// Geographic position (degrees) of the centre of a bin
    pub fn bin_lonlat(&self, ray: usize, bin: usize) -> (f64, f64) {
        let azimuth = (ray as f64 + 0.5) * std::f64::consts::TAU / self.nrays.max(1) as f64;
        let range = self.rstart + (bin as f64 + 0.5) * self.rscale;
        projection::destination(
            self.longitude,
            self.latitude,
            azimuth,
            range * self.elangle.cos(),
        )
    }

    /// Ground points of the outermost bin along every ray
    pub fn outermost_ring(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let last = self.nbins.saturating_sub(1);
        (0..self.nrays).map(move |ray| self.bin_lonlat(ray, last))
    }

    /// Beam centre height above sea level at a ground distance (m)
    pub fn beam_height(&self, ground_distance: f64) -> f64 {
        let slant = ground_distance / self.elangle.cos();
        (slant.powi(2)
            + EFFECTIVE_EARTH_RADIUS.powi(2)
            + 2.0 * slant * EFFECTIVE_EARTH_RADIUS * self.elangle.sin())
        .sqrt()
            - EFFECTIVE_EARTH_RADIUS
            + self.height
    }

    /// Bin sampling a geographic point, `None` outside the scan's coverage
    pub fn locate(&self, lon: f64, lat: f64) -> Option<BinLocation> {
        if self.nrays == 0 || self.nbins == 0 || self.rscale <= 0.0 {
            return None;
        }
        let (ground_distance, bearing) =
            projection::distance_and_bearing(self.longitude, self.latitude, lon, lat);
        let slant = ground_distance / self.elangle.cos();
        let offset = slant - self.rstart;
        if offset < 0.0 {
            return None;
        }
        let bin = (offset / self.rscale).floor() as usize;
        if bin >= self.nbins {
            return None;
        }
        let ray = ((bearing / std::f64::consts::TAU) * self.nrays as f64).floor() as usize
            % self.nrays;
        Some(BinLocation {
            ray,
            bin,
            ground_distance,
            beam_height: self.beam_height(ground_distance),
        })
    }

    /// Physical value of a quantity at a bin
    pub fn value(&self, quantity: &str, ray: usize, bin: usize) -> BinValue {
        self.parameters
            .get(quantity)
            .map(|p| p.value(ray, bin))
            .unwrap_or(BinValue::Nodata)
    }

    pub fn quality_field(&self, task: &str) -> Option<&QualityField> {
        find_quality_field(&self.quality_fields, task)
    }

    /// Task tag recorded in the scan's own metadata
    pub fn task(&self) -> Option<&str> {
        attribute_str(&self.attributes, attributes::HOW_TASK)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarVolume {
    pub source: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
    #[serde(default)]
    pub attributes: Attributes,
    pub scans: Vec<PolarScan>,
}

impl PolarVolume {
    pub fn is_malfunctioning(&self) -> bool {
        is_malfunc(&self.attributes)
    }
}

/// Observation accepted by the compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolarObject {
    Scan(PolarScan),
    Volume(PolarVolume),
}

impl PolarObject {
    pub fn source(&self) -> &str {
        match self {
            Self::Scan(s) => &s.source,
            Self::Volume(v) => &v.source,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Scan(s) => s.date,
            Self::Volume(v) => v.date,
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match self {
            Self::Scan(s) => s.time,
            Self::Volume(v) => v.time,
        }
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        match self {
            Self::Scan(s) => s.date = Some(date),
            Self::Volume(v) => v.date = Some(date),
        }
    }

    pub fn set_time(&mut self, time: NaiveTime) {
        match self {
            Self::Scan(s) => s.time = Some(time),
            Self::Volume(v) => v.time = Some(time),
        }
    }

    /// Node identifier of the observing radar
    pub fn node(&self) -> String {
        OdimSource::parse(self.source()).node()
    }

    /// Object-level attributes (the volume's own, or the scan's)
    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Scan(s) => &s.attributes,
            Self::Volume(v) => &v.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Self::Scan(s) => &mut s.attributes,
            Self::Volume(v) => &mut v.attributes,
        }
    }

    pub fn is_malfunctioning(&self) -> bool {
        match self {
            Self::Scan(s) => s.is_malfunctioning(),
            Self::Volume(v) => v.is_malfunctioning(),
        }
    }

    pub fn scans(&self) -> &[PolarScan] {
        match self {
            Self::Scan(s) => std::slice::from_ref(s),
            Self::Volume(v) => &v.scans,
        }
    }

    pub fn scans_mut(&mut self) -> &mut [PolarScan] {
        match self {
            Self::Scan(s) => std::slice::from_mut(s),
            Self::Volume(v) => &mut v.scans,
        }
    }

    /// Scan reaching farthest from the site; first one wins on ties
    pub fn max_distance_scan(&self) -> Option<&PolarScan> {
        self.scans().iter().fold(None, |best: Option<&PolarScan>, scan| match best {
            Some(b) if b.max_distance() >= scan.max_distance() => Some(b),
            _ => Some(scan),
        })
    }

    /// Drop malfunctioning content. `None` when nothing usable remains.
    pub fn remove_malfunctioning(self) -> Option<Self> {
        match self {
            Self::Scan(s) if s.is_malfunctioning() => None,
            Self::Scan(s) => Some(Self::Scan(s)),
            Self::Volume(v) if v.is_malfunctioning() => None,
            Self::Volume(mut v) => {
                v.scans.retain(|scan| !scan.is_malfunctioning());
                if v.scans.is_empty() {
                    None
                } else {
                    Some(Self::Volume(v))
                }
            }
        }
    }

    /// Whether any scan carries malfunctioning content
    pub fn has_malfunctioning_scans(&self) -> bool {
        self.scans().iter().any(PolarScan::is_malfunctioning)
    }
}

fn is_malfunc(attrs: &Attributes) -> bool {
    match attrs.get(attributes::HOW_MALFUNC) {
        Some(value) => match value.as_str() {
            Some(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
            None => value.as_f64().is_some_and(|v| v != 0.0),
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeValue;
    use crate::models::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_value_decoding() {
        let scan = fixtures::scan("NOD:seang", 13.0, 56.0);
        let param = &scan.parameters["DBZH"];
        assert!(matches!(param.value(0, 0), BinValue::Data(_)));
        assert_eq!(param.value(999, 0), BinValue::Nodata);
    }

    #[test]
    fn test_locate_matches_bin_lonlat() {
        let scan = fixtures::scan("NOD:seang", 13.0, 56.0);
        let (lon, lat) = scan.bin_lonlat(5, 20);
        let loc = scan.locate(lon, lat).unwrap();
        assert_eq!(loc.ray, 5);
        assert_eq!(loc.bin, 20);
        assert!(loc.beam_height > scan.height);
    }

    #[test]
    fn test_locate_outside_coverage() {
        let scan = fixtures::scan("NOD:seang", 13.0, 56.0);
        assert!(scan.locate(30.0, 56.0).is_none());
    }

    #[test]
    fn test_outermost_ring_at_max_range() {
        let scan = fixtures::scan("NOD:seang", 13.0, 56.0);
        let ring: Vec<_> = scan.outermost_ring().collect();
        assert_eq!(ring.len(), scan.nrays);
        let (d, _) = projection::distance_and_bearing(13.0, 56.0, ring[0].0, ring[0].1);
        assert_relative_eq!(
            d,
            (scan.rstart + (scan.nbins as f64 - 0.5) * scan.rscale) * scan.elangle.cos(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_remove_malfunctioning_strips_scans() {
        let mut volume = fixtures::volume("NOD:sekkr", 14.0, 55.5, 3);
        if let PolarObject::Volume(v) = &mut volume {
            v.scans[1]
                .attributes
                .insert(attributes::HOW_MALFUNC.into(), AttributeValue::from("True"));
        }
        assert!(volume.has_malfunctioning_scans());
        let cleaned = volume.remove_malfunctioning().unwrap();
        assert_eq!(cleaned.scans().len(), 2);
    }

    #[test]
    fn test_remove_malfunctioning_drops_whole_volume() {
        let mut volume = fixtures::volume("NOD:sekkr", 14.0, 55.5, 2);
        volume
            .attributes_mut()
            .insert(attributes::HOW_MALFUNC.into(), AttributeValue::from("true"));
        assert!(volume.remove_malfunctioning().is_none());
    }

    #[test]
    fn test_max_distance_scan_prefers_longest_range() {
        let volume = fixtures::volume("NOD:sekkr", 14.0, 55.5, 3);
        let best = volume.max_distance_scan().unwrap();
        assert!(volume.scans().iter().all(|s| s.max_distance() <= best.max_distance()));
    }
}
