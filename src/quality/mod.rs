//! Quality control of polar observations.
//!
//! Detectors are plugins looked up by name in a [`QualityRegistry`]. A
//! missing plugin is a normal outcome: detector lists are user supplied and
//! may name optional detectors that are not installed.

use crate::Result;
use crate::models::{CartesianProduct, PolarObject, QualityControlMode};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

pub mod apply;
pub mod detectors;
pub mod runner;
pub mod selection;

pub use apply::{ApplyQualityRequest, AppliedQuality, QualityApplier};
pub use detectors::{DistanceDetector, RadarIndexDetector, ThresholdDetector};
pub use runner::{QualityControlOutcome, QualityControlRunner};
pub use selection::DetectorSelection;

/// Post-processing directive handed from a detector to the composite generator
pub trait CompositeAlgorithm: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Adjust a freshly generated product
    fn process(&self, product: &mut CartesianProduct, quantity: &str) -> Result<()>;
}

/// Object returned by a detector, with its optional algorithm hint
#[derive(Debug)]
pub struct QualityOutput {
    pub object: PolarObject,
    pub algorithm: Option<Arc<dyn CompositeAlgorithm>>,
}

impl QualityOutput {
    pub fn unchanged(object: PolarObject) -> Self {
        Self {
            object,
            algorithm: None,
        }
    }
}

/// A quality-control detector
pub trait QualityPlugin: Send + Sync {
    /// Task names of the quality fields this detector contributes
    fn quality_fields(&self) -> Vec<String>;

    /// Analyze (and in `AnalyzeAndApply` mode, correct) one object.
    ///
    /// With `reprocess` false an existing quality field of the same task is
    /// reused instead of recomputed.
    fn process(
        &self,
        object: PolarObject,
        reprocess: bool,
        mode: QualityControlMode,
    ) -> Result<QualityOutput>;
}

/// Detector plugins by name
#[derive(Clone, Default)]
pub struct QualityRegistry {
    plugins: IndexMap<String, Arc<dyn QualityPlugin>>,
}

impl QualityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in detectors
    pub fn with_builtin_detectors(quantity: &str, threshold: f64) -> Self {
        let mut registry = Self::new();
        registry.register(DistanceDetector::NAME, Arc::new(DistanceDetector));
        registry.register(RadarIndexDetector::NAME, Arc::new(RadarIndexDetector));
        registry.register(
            ThresholdDetector::NAME,
            Arc::new(ThresholdDetector::new(quantity, threshold)),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn QualityPlugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    /// Plugin registered under a name, if installed
    pub fn get(&self, name: &str) -> Option<Arc<dyn QualityPlugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

impl fmt::Debug for QualityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}
