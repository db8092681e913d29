//! Built-in detectors.
//!
//! `distance` and `radar-index` only declare composite quality fields that
//! the generator computes per pixel. `threshold` analyzes the data itself.

use super::{QualityOutput, QualityPlugin};
use crate::Result;
use crate::constants::quality_fields;
use crate::models::{
    BinValue, PolarObject, QualityControlMode, QualityField, polar::PolarScan, put_quality_field,
};
use ndarray::Array2;
use tracing::debug;

/// Requests the distance-to-radar composite quality field
#[derive(Debug, Default, Clone, Copy)]
pub struct DistanceDetector;

impl DistanceDetector {
    pub const NAME: &'static str = "distance";
}

impl QualityPlugin for DistanceDetector {
    fn quality_fields(&self) -> Vec<String> {
        vec![quality_fields::DISTANCE.to_string()]
    }

    fn process(
        &self,
        object: PolarObject,
        _reprocess: bool,
        _mode: QualityControlMode,
    ) -> Result<QualityOutput> {
        Ok(QualityOutput::unchanged(object))
    }
}

/// Requests the contributing-radar index composite quality field
#[derive(Debug, Default, Clone, Copy)]
pub struct RadarIndexDetector;

impl RadarIndexDetector {
    pub const NAME: &'static str = "radar-index";
}

impl QualityPlugin for RadarIndexDetector {
    fn quality_fields(&self) -> Vec<String> {
        vec![quality_fields::RADAR_INDEX.to_string()]
    }

    fn process(
        &self,
        object: PolarObject,
        _reprocess: bool,
        _mode: QualityControlMode,
    ) -> Result<QualityOutput> {
        Ok(QualityOutput::unchanged(object))
    }
}

/// Flags bins whose value falls below a threshold.
///
/// Quality is 1 for undetect and for values at or above the threshold, 0
/// otherwise. In `AnalyzeAndApply` mode flagged bins are set to undetect.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    quantity: String,
    threshold: f64,
}

impl ThresholdDetector {
    pub const NAME: &'static str = "threshold";

    pub fn new(quantity: impl Into<String>, threshold: f64) -> Self {
        Self {
            quantity: quantity.into(),
            threshold,
        }
    }

    fn process_scan(&self, scan: &mut PolarScan, reprocess: bool, mode: QualityControlMode) {
        let Some(param) = scan.parameters.get(&self.quantity) else {
            return;
        };

        let field = match scan.quality_field(quality_fields::THRESHOLD) {
            Some(existing) if !reprocess => existing.clone(),
            _ => {
                let (nrays, nbins) = param.data.dim();
                let quality = Array2::from_shape_fn((nrays, nbins), |(r, b)| {
                    match param.value(r, b) {
                        BinValue::Data(v) if v < self.threshold => 0.0,
                        BinValue::Nodata => 0.0,
                        _ => 1.0,
                    }
                });
                QualityField::new(quality_fields::THRESHOLD, quality)
                    .with_task_args(format!("threshold:{}", self.threshold))
            }
        };

        if mode.applies() {
            if let Some(param) = scan.parameters.get_mut(&self.quantity) {
                let undetect = param.undetect;
                let nodata = param.nodata;
                for ((r, b), raw) in param.data.indexed_iter_mut() {
                    let flagged = field.data.get((r, b)).is_some_and(|q| *q == 0.0);
                    if flagged && *raw != nodata {
                        *raw = undetect;
                    }
                }
            }
        }
        put_quality_field(&mut scan.quality_fields, field);
    }
}

impl QualityPlugin for ThresholdDetector {
    fn quality_fields(&self) -> Vec<String> {
        vec![quality_fields::THRESHOLD.to_string()]
    }

    fn process(
        &self,
        mut object: PolarObject,
        reprocess: bool,
        mode: QualityControlMode,
    ) -> Result<QualityOutput> {
        debug!(
            "Threshold {} on {} of {} ({})",
            self.threshold,
            self.quantity,
            object.node(),
            mode
        );
        for scan in object.scans_mut() {
            self.process_scan(scan, reprocess, mode);
        }
        Ok(QualityOutput::unchanged(object))
    }
}
