//! Post-processing of generated composites: cloud-type filtering, GRA
//! correction, radar border marking and gap filling.

use crate::constants::{BORDER_QUANTITY, COMPOSITE_NODATA, COMPOSITE_UNDETECT, gra, quality_fields};
use crate::models::{CartesianParameter, CartesianProduct, QualityField, put_quality_field};
use crate::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// =============================================================================
// GRA correction
// =============================================================================

/// Gauge-radar adjustment coefficients, `F = A + B·d + C·d²` with `d` in km
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraCoefficient {
    pub valid_at: NaiveDateTime,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl GraCoefficient {
    /// Neutral coefficients used when nothing better is known
    pub fn climatologic(valid_at: NaiveDateTime) -> Self {
        Self {
            valid_at,
            a: gra::DEFAULT_A,
            b: gra::DEFAULT_B,
            c: gra::DEFAULT_C,
        }
    }

    fn is_usable(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }

    /// Correction in dB at a distance from the radar (m)
    pub fn correction(&self, distance: f64) -> f64 {
        let d = distance / 1000.0;
        self.a + self.b * d + self.c * d * d
    }
}

/// Store of previously computed GRA coefficients
pub trait GraCoefficientSource: Send + Sync {
    /// Coefficient computed for exactly this time
    fn coefficient_at(&self, at: NaiveDateTime) -> Result<Option<GraCoefficient>>;

    /// Newest coefficient valid in `[oldest, newest]`
    fn newest_between(
        &self,
        oldest: NaiveDateTime,
        newest: NaiveDateTime,
    ) -> Result<Option<GraCoefficient>>;
}

/// In-memory coefficient table, loadable from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryGraSource {
    coefficients: Vec<GraCoefficient>,
}

impl MemoryGraSource {
    pub fn new(coefficients: Vec<GraCoefficient>) -> Self {
        Self { coefficients }
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::io(format!("Failed to read GRA coefficients {}", path.display()), e)
        })?;
        serde_yaml::from_str(&contents).map_err(|e| crate::Error::Yaml {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl GraCoefficientSource for MemoryGraSource {
    fn coefficient_at(&self, at: NaiveDateTime) -> Result<Option<GraCoefficient>> {
        Ok(self.coefficients.iter().find(|c| c.valid_at == at).copied())
    }

    fn newest_between(
        &self,
        oldest: NaiveDateTime,
        newest: NaiveDateTime,
    ) -> Result<Option<GraCoefficient>> {
        Ok(self
            .coefficients
            .iter()
            .filter(|c| c.valid_at >= oldest && c.valid_at <= newest)
            .max_by_key(|c| c.valid_at)
            .copied())
    }
}

/// Coefficients for a nominal time.
///
/// Looks up the coefficient 12 hours back, then the newest one of the last
/// 48 hours, then falls back to climatologic values. Source errors are
/// logged and treated as "not found".
pub fn gra_coefficients(
    source: Option<&dyn GraCoefficientSource>,
    date: NaiveDate,
    time: NaiveTime,
) -> GraCoefficient {
    let nominal = NaiveDateTime::new(date, time);
    let Some(source) = source else {
        info!("No GRA coefficient source configured, using climatologic coefficients");
        return GraCoefficient::climatologic(nominal);
    };

    let lookup = nominal - Duration::hours(gra::LOOKBACK_HOURS);
    match source.coefficient_at(lookup) {
        Ok(Some(c)) if c.is_usable() => {
            debug!("Applying GRA coefficients from {}", c.valid_at);
            return c;
        }
        Ok(_) => info!(
            "No GRA coefficients for {}, trying aged or climatologic coefficients",
            lookup
        ),
        Err(e) => warn!("Failed to look up GRA coefficients for {}: {}", lookup, e),
    }

    let oldest = nominal - Duration::hours(gra::MAX_AGE_HOURS);
    match source.newest_between(oldest, nominal) {
        Ok(Some(c)) if c.is_usable() => {
            info!("Reusing GRA coefficients from {}", c.valid_at);
            c
        }
        Ok(_) => {
            warn!(
                "No GRA coefficients newer than {}, defaulting to climatologic",
                oldest
            );
            GraCoefficient::climatologic(nominal)
        }
        Err(e) => {
            warn!("Failed to acquire aged GRA coefficients: {}", e);
            GraCoefficient::climatologic(nominal)
        }
    }
}

/// Add the GRA corrected `<quantity>_CORR` parameter.
///
/// Needs the composite distance quality field; returns `false` when it or
/// the quantity is missing.
pub fn apply_gra(
    product: &mut CartesianProduct,
    quantity: &str,
    zr_b: f64,
    coefficient: &GraCoefficient,
) -> bool {
    let Some(distance) = product.quality_field(quality_fields::DISTANCE) else {
        return false;
    };
    let Some(param) = product.parameter(quantity) else {
        return false;
    };

    let mut corrected = param.clone();
    for ((row, col), raw) in corrected.data.indexed_iter_mut() {
        let (Some(dbz), Some(d)) = (param.physical(row, col), distance.value(row, col)) else {
            continue;
        };
        let value = dbz + zr_b * coefficient.correction(d);
        *raw = param
            .encode(value)
            .clamp(COMPOSITE_UNDETECT + 1.0, COMPOSITE_NODATA - 1.0);
    }

    product
        .parameters
        .insert(format!("{}{}", quantity, gra::CORRECTED_SUFFIX), corrected);
    true
}

// =============================================================================
// Cloud-type filter
// =============================================================================

/// Satellite cloud-type product
pub trait CloudTypeSource: Send + Sync {
    /// Whether the sky is cloud free at a position, `None` outside the product
    fn cloud_free(&self, date: NaiveDate, time: NaiveTime, lon: f64, lat: f64) -> Option<bool>;
}

/// Remove echoes under a cloud-free sky.
///
/// Removed pixels become undetect and are flagged in the
/// `se.smhi.quality.ctfilter` quality field. Returns the number removed.
pub fn apply_ctfilter(
    product: &mut CartesianProduct,
    quantity: &str,
    source: &dyn CloudTypeSource,
) -> Result<usize> {
    let projection = product.area.projection()?;
    let (date, time) = (product.date, product.time);
    let area = product.area.clone();
    let Some(param) = product.parameters.get_mut(quantity) else {
        return Ok(0);
    };

    let mut flags = Array2::zeros((area.ysize, area.xsize));
    let mut removed = 0;
    for row in 0..area.ysize {
        for col in 0..area.xsize {
            if param.physical(row, col).is_none() {
                continue;
            }
            let (x, y) = area.pixel_center(col, row);
            let (lon, lat) = projection.inverse(x, y);
            if source.cloud_free(date, time, lon, lat) == Some(true) {
                param.data[(row, col)] = param.undetect;
                flags[(row, col)] = 1.0;
                removed += 1;
            }
        }
    }

    put_quality_field(
        &mut product.quality_fields,
        QualityField::new(quality_fields::CTFILTER, flags),
    );
    debug!("Cloud-type filter removed {} pixels", removed);
    Ok(removed)
}

// =============================================================================
// Radar borders and gap filling
// =============================================================================

const DIRECT_NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

fn neighbour(data: &Array2<f64>, row: usize, col: usize, dr: isize, dc: isize) -> Option<f64> {
    let r = row.checked_add_signed(dr)?;
    let c = col.checked_add_signed(dc)?;
    data.get((r, c)).copied()
}

/// `BRDR` parameter: 1 where the contributing radar differs from a neighbour
pub fn add_border_parameter(product: &mut CartesianProduct, quantity: &str) -> bool {
    let (Some(index), Some(param)) = (
        product.quality_field(quality_fields::RADAR_INDEX),
        product.parameter(quantity),
    ) else {
        return false;
    };

    let mut border = CartesianParameter {
        gain: 1.0,
        offset: 0.0,
        nodata: COMPOSITE_NODATA,
        undetect: COMPOSITE_UNDETECT,
        data: Array2::zeros(index.data.dim()),
    };
    for ((row, col), value) in border.data.indexed_iter_mut() {
        if param.data[(row, col)] == param.nodata {
            continue;
        }
        let own = index.data[(row, col)];
        let differs = DIRECT_NEIGHBOURS.iter().any(|(dr, dc)| {
            let covered = neighbour(&param.data, row, col, *dr, *dc).is_some_and(|v| v != param.nodata);
            covered && neighbour(&index.data, row, col, *dr, *dc).is_some_and(|other| other != own)
        });
        if differs {
            *value = 1.0;
        }
    }

    product.parameters.insert(BORDER_QUANTITY.to_string(), border);
    true
}

/// Fill isolated nodata pixels.
///
/// A nodata pixel is filled when both horizontal or both vertical neighbours
/// hold a value; it takes the largest raw value among its covered direct
/// neighbours. Returns the number of filled pixels.
pub fn fill_gaps(product: &mut CartesianProduct, quantity: &str) -> usize {
    let Some(param) = product.parameters.get_mut(quantity) else {
        return 0;
    };
    let nodata = param.nodata;
    let source = param.data.clone();
    let covered = |row: usize, col: usize, dr: isize, dc: isize| {
        neighbour(&source, row, col, dr, dc).filter(|v| *v != nodata)
    };

    let mut filled = 0;
    for ((row, col), raw) in param.data.indexed_iter_mut() {
        if *raw != nodata {
            continue;
        }
        let horizontal = covered(row, col, 0, -1).is_some() && covered(row, col, 0, 1).is_some();
        let vertical = covered(row, col, -1, 0).is_some() && covered(row, col, 1, 0).is_some();
        if !horizontal && !vertical {
            continue;
        }
        if let Some(value) = DIRECT_NEIGHBOURS
            .iter()
            .filter_map(|(dr, dc)| covered(row, col, *dr, *dc))
            .reduce(f64::max)
        {
            *raw = value;
            filled += 1;
        }
    }
    debug!("Gap filling filled {} pixels", filled);
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductType, fixtures};
    use crate::{Error, models::AreaDefinition};
    use approx::assert_relative_eq;
    use indexmap::IndexMap;

    fn product(area: AreaDefinition, raw: Array2<f64>) -> CartesianProduct {
        let mut param = CartesianParameter::empty(area.xsize, area.ysize, 0.4, -30.0);
        param.data = raw;
        let mut parameters = IndexMap::new();
        parameters.insert("DBZH".to_string(), param);
        CartesianProduct {
            area,
            date: fixtures::date(),
            time: fixtures::time(),
            product: ProductType::Pcappi,
            source: "test".into(),
            attributes: Default::default(),
            parameters,
            quality_fields: Vec::new(),
        }
    }

    fn small_area() -> AreaDefinition {
        fixtures::area("small", 13.0, 56.0, 6000.0, 2000.0)
    }

    fn at(hours_before: i64) -> NaiveDateTime {
        NaiveDateTime::new(fixtures::date(), fixtures::time()) - Duration::hours(hours_before)
    }

    fn coefficient(hours_before: i64, a: f64) -> GraCoefficient {
        GraCoefficient {
            valid_at: at(hours_before),
            a,
            b: 0.0,
            c: 0.0,
        }
    }

    #[test]
    fn test_gra_lookup_order() {
        let d = fixtures::date();
        let t = fixtures::time();
        let source = MemoryGraSource::new(vec![coefficient(12, 1.0), coefficient(3, 2.0)]);
        assert_eq!(gra_coefficients(Some(&source), d, t).a, 1.0);

        let source = MemoryGraSource::new(vec![coefficient(30, 3.0), coefficient(5, 2.0)]);
        assert_eq!(gra_coefficients(Some(&source), d, t).a, 2.0);

        let source = MemoryGraSource::new(vec![coefficient(60, 3.0)]);
        assert_eq!(gra_coefficients(Some(&source), d, t).a, gra::DEFAULT_A);
        assert_eq!(gra_coefficients(None, d, t).valid_at, at(0));
    }

    struct Broken;

    impl GraCoefficientSource for Broken {
        fn coefficient_at(&self, _at: NaiveDateTime) -> Result<Option<GraCoefficient>> {
            Err(Error::configuration("database unavailable"))
        }

        fn newest_between(
            &self,
            _oldest: NaiveDateTime,
            _newest: NaiveDateTime,
        ) -> Result<Option<GraCoefficient>> {
            Err(Error::configuration("database unavailable"))
        }
    }

    #[test]
    fn test_gra_failing_source_degrades_to_climatologic() {
        let c = gra_coefficients(Some(&Broken), fixtures::date(), fixtures::time());
        assert_eq!((c.a, c.b, c.c), (gra::DEFAULT_A, gra::DEFAULT_B, gra::DEFAULT_C));
    }

    #[test]
    fn test_apply_gra_adds_corrected_parameter() {
        let area = small_area();
        let mut p = product(area, Array2::from_elem((6, 6), 100.0));
        assert!(!apply_gra(&mut p, "DBZH", 1.6, &coefficient(12, 1.0)));

        p.quality_fields.push(QualityField::new(
            quality_fields::DISTANCE,
            Array2::from_elem((6, 6), 50_000.0),
        ));
        let c = GraCoefficient {
            valid_at: at(12),
            a: 1.0,
            b: 0.02,
            c: 0.0,
        };
        assert!(apply_gra(&mut p, "DBZH", 1.6, &c));

        let corrected = p.parameter("DBZH_CORR").unwrap();
        // 10 dBZ + 1.6 * (1 + 0.02 * 50)
        assert_relative_eq!(corrected.physical(0, 0).unwrap(), 13.2, epsilon = 0.2);
        assert_eq!(p.parameter("DBZH").unwrap().data[(0, 0)], 100.0);
    }

    #[test]
    fn test_fill_gaps_between_covered_pixels() {
        let mut raw = Array2::from_elem((6, 6), COMPOSITE_NODATA);
        raw.row_mut(2).fill(50.0);
        raw[(2, 3)] = COMPOSITE_NODATA;
        raw[(2, 4)] = 60.0;
        let mut p = product(small_area(), raw);

        assert_eq!(fill_gaps(&mut p, "DBZH"), 1);
        let data = &p.parameter("DBZH").unwrap().data;
        assert_eq!(data[(2, 3)], 60.0);
        assert_eq!(data[(0, 0)], COMPOSITE_NODATA);
    }

    #[test]
    fn test_border_marks_radar_changes() {
        let mut p = product(small_area(), Array2::from_elem((6, 6), 100.0));
        let index = Array2::from_shape_fn((6, 6), |(_, c)| if c < 3 { 1.0 } else { 2.0 });
        p.quality_fields
            .push(QualityField::new(quality_fields::RADAR_INDEX, index));

        assert!(add_border_parameter(&mut p, "DBZH"));
        let border = &p.parameter(BORDER_QUANTITY).unwrap().data;
        assert_eq!(border[(0, 2)], 1.0);
        assert_eq!(border[(0, 3)], 1.0);
        assert_eq!(border[(0, 0)], 0.0);
    }

    struct ClearWest;

    impl CloudTypeSource for ClearWest {
        fn cloud_free(&self, _d: NaiveDate, _t: NaiveTime, lon: f64, _lat: f64) -> Option<bool> {
            Some(lon < 13.0)
        }
    }

    #[test]
    fn test_ctfilter_removes_cloud_free_echoes() {
        let mut p = product(small_area(), Array2::from_elem((6, 6), 100.0));
        let removed = apply_ctfilter(&mut p, "DBZH", &ClearWest).unwrap();
        assert_eq!(removed, 18);
        let data = &p.parameter("DBZH").unwrap().data;
        assert_eq!(data[(0, 0)], COMPOSITE_UNDETECT);
        assert_eq!(data[(0, 5)], 100.0);
        let flags = p.quality_field(quality_fields::CTFILTER).unwrap();
        assert_eq!(flags.value(0, 0), Some(1.0));
    }
}
