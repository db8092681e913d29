//! Ordered application of detectors to a set of observations.

use super::{CompositeAlgorithm, QualityRegistry};
use crate::constants::{is_prequalified_marker, markers, quality_fields};
use crate::models::{PolarObject, ProvenanceMetadata, QualityControlMode, attribute_str};
use crate::{Error, Result, constants::attributes};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of running quality control over a set of objects
#[derive(Debug, Default)]
pub struct QualityControlOutcome {
    pub objects: IndexMap<PathBuf, PolarObject>,
    /// First algorithm hint any detector returned
    pub algorithm: Option<Arc<dyn CompositeAlgorithm>>,
    /// Quality-field task names contributed, first-seen order
    pub quality_fields: Vec<String>,
    /// Detectors that ran and the nodes they ran on
    pub provenance: ProvenanceMetadata,
}

pub struct QualityControlRunner<'a> {
    registry: &'a QualityRegistry,
    context: String,
}

impl<'a> QualityControlRunner<'a> {
    pub fn new(registry: &'a QualityRegistry) -> Self {
        Self {
            registry,
            context: String::new(),
        }
    }

    /// Prefix for log lines, e.g. `dt=20240501T120000,area=swe`
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Run `detectors` in order on every object.
    ///
    /// Unregistered detectors are skipped. A detector error aborts the run.
    pub fn apply(
        &self,
        objects: IndexMap<PathBuf, PolarObject>,
        detectors: &[String],
        mode: QualityControlMode,
        reprocess: bool,
    ) -> Result<QualityControlOutcome> {
        let mut outcome = QualityControlOutcome::default();
        let plugins: Vec<_> = detectors
            .iter()
            .filter_map(|name| match self.registry.get(name) {
                Some(plugin) => Some((name.as_str(), plugin)),
                None => {
                    debug!("[{}] No quality plugin named '{}', skipping", self.context, name);
                    None
                }
            })
            .collect();

        for (key, mut object) in objects {
            let node = object.node();
            for (name, plugin) in &plugins {
                debug!(
                    "[{}] Processing {} with quality plugin {} ({})",
                    self.context, node, name, mode
                );
                let output = plugin
                    .process(object, reprocess, mode)
                    .map_err(|e| Error::quality_control(*name, e.to_string()))?;
                object = output.object;

                if outcome.algorithm.is_none() {
                    outcome.algorithm = output.algorithm;
                }
                for field in plugin.quality_fields() {
                    if !outcome.quality_fields.contains(&field) {
                        outcome.quality_fields.push(field);
                    }
                }
                outcome.provenance.add_task(*name);
                outcome.provenance.add_detector_node(*name, node.clone());
            }
            outcome.objects.insert(key, object);
        }

        record_prequalified(outcome.objects.values(), &mut outcome.provenance);
        if !plugins.is_empty() {
            info!(
                "[{}] Quality control applied to {} objects: {}",
                self.context,
                outcome.objects.len(),
                detectors.join(",")
            );
        }
        Ok(outcome)
    }
}

/// Record the detectors of volumes that were quality controlled upstream.
///
/// Such objects carry a `how/task` starting with a `nimbus-qc` marker,
/// followed by the detectors applied to them.
pub fn record_prequalified<'o>(
    objects: impl IntoIterator<Item = &'o PolarObject>,
    provenance: &mut ProvenanceMetadata,
) {
    for object in objects {
        let Some(tasks) = attribute_str(object.attributes(), attributes::HOW_TASK) else {
            continue;
        };
        let mut tokens = tasks.split(',').map(str::trim);
        if !tokens.next().is_some_and(is_prequalified_marker) {
            continue;
        }

        let node = object.node();
        for detector in tokens.filter(|t| !t.is_empty() && !is_prequalified_marker(t)) {
            provenance.add_task(detector);
            provenance.add_detector_node(detector, node.clone());
        }

        let satfilter = object
            .scans()
            .first()
            .and_then(|scan| scan.quality_field(quality_fields::SATFILTER));
        match satfilter {
            Some(field) => {
                provenance.set_marker(markers::PREQUALIFIED_SATFILTER);
                if let Some(file) = field.task_args() {
                    provenance.satfilter_file = Some(file.to_string());
                }
            }
            None => provenance.set_marker(markers::PREQUALIFIED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartesianProduct, QualityField, fixtures};
    use crate::quality::{QualityOutput, QualityPlugin};
    use ndarray::Array2;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct NamedAlgorithm(&'static str);

    impl CompositeAlgorithm for NamedAlgorithm {
        fn name(&self) -> &str {
            self.0
        }

        fn process(&self, _product: &mut CartesianProduct, _quantity: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Records call order and optionally returns an algorithm hint
    struct Recording {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        algorithm: Option<&'static str>,
        fail: bool,
    }

    impl QualityPlugin for Recording {
        fn quality_fields(&self) -> Vec<String> {
            vec![format!("field.{}", self.name)]
        }

        fn process(
            &self,
            object: PolarObject,
            _reprocess: bool,
            _mode: QualityControlMode,
        ) -> Result<QualityOutput> {
            if self.fail {
                return Err(Error::generation("detector exploded"));
            }
            self.calls
                .lock()
                .push(format!("{}:{}", self.name, object.node()));
            Ok(QualityOutput {
                object,
                algorithm: self
                    .algorithm
                    .map(|n| Arc::new(NamedAlgorithm(n)) as Arc<dyn CompositeAlgorithm>),
            })
        }
    }

    fn registry(calls: &Arc<Mutex<Vec<String>>>) -> QualityRegistry {
        let mut registry = QualityRegistry::new();
        for (name, algorithm) in [("a", None), ("b", Some("first")), ("c", Some("second"))] {
            registry.register(
                name,
                Arc::new(Recording {
                    name,
                    calls: calls.clone(),
                    algorithm,
                    fail: false,
                }),
            );
        }
        registry
    }

    fn objects() -> IndexMap<PathBuf, PolarObject> {
        let mut objects = IndexMap::new();
        objects.insert(
            PathBuf::from("1.json"),
            PolarObject::Scan(fixtures::scan("NOD:seang", 13.0, 56.0)),
        );
        objects.insert(
            PathBuf::from("2.json"),
            fixtures::volume("NOD:sekkr", 14.0, 55.5, 2),
        );
        objects
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detectors_run_in_order_and_first_algorithm_wins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&calls);
        let outcome = QualityControlRunner::new(&registry)
            .apply(
                objects(),
                &names(&["c", "missing", "a", "b"]),
                QualityControlMode::Analyze,
                true,
            )
            .unwrap();

        assert_eq!(
            *calls.lock(),
            vec!["c:seang", "a:seang", "b:seang", "c:sekkr", "a:sekkr", "b:sekkr"]
        );
        assert_eq!(outcome.algorithm.unwrap().name(), "second");
        assert_eq!(outcome.quality_fields, vec!["field.c", "field.a", "field.b"]);
        assert_eq!(outcome.provenance.encode_tasks().unwrap(), "c,a,b");
        assert_eq!(
            outcome.provenance.encode_task_args().unwrap(),
            "c_nodes:seang,sekkr;a_nodes:seang,sekkr;b_nodes:seang,sekkr;"
        );
        assert_eq!(outcome.objects.len(), 2);
    }

    #[test]
    fn test_no_detectors_leaves_provenance_empty() {
        let registry = QualityRegistry::new();
        let outcome = QualityControlRunner::new(&registry)
            .apply(objects(), &[], QualityControlMode::AnalyzeAndApply, false)
            .unwrap();
        assert!(outcome.provenance.is_empty());
        assert!(outcome.algorithm.is_none());
        assert!(outcome.quality_fields.is_empty());
    }

    #[test]
    fn test_detector_failure_is_reported() {
        let mut registry = QualityRegistry::new();
        registry.register(
            "boom",
            Arc::new(Recording {
                name: "boom",
                calls: Arc::new(Mutex::new(Vec::new())),
                algorithm: None,
                fail: true,
            }),
        );
        match QualityControlRunner::new(&registry)
            .apply(objects(), &names(&["boom"]), QualityControlMode::Analyze, true)
            .unwrap_err()
        {
            Error::QualityControl { detector, .. } => assert_eq!(detector, "boom"),
            other => panic!("Expected QualityControl error, got {:?}", other),
        }
    }

    #[test]
    fn test_prequalified_volume_provenance() {
        let mut volume = fixtures::volume("NOD:sekkr", 14.0, 55.5, 2);
        volume
            .attributes_mut()
            .insert(attributes::HOW_TASK.into(), "nimbus-qc,ropo,beamb".into());
        let mut plain = PolarObject::Scan(fixtures::scan("NOD:seang", 13.0, 56.0));
        plain
            .attributes_mut()
            .insert(attributes::HOW_TASK.into(), "something".into());

        let mut provenance = ProvenanceMetadata::new();
        record_prequalified([&volume, &plain], &mut provenance);
        assert_eq!(provenance.encode_tasks().unwrap(), "nimbus-qc,ropo,beamb");
        assert_eq!(
            provenance.encode_task_args().unwrap(),
            "ropo_nodes:sekkr;beamb_nodes:sekkr;"
        );

        let mut sat = fixtures::volume("NOD:seang", 13.0, 56.0, 1);
        sat.attributes_mut().insert(
            attributes::HOW_TASK.into(),
            "nimbus-qc-satfilter,satfilter".into(),
        );
        sat.scans_mut()[0].quality_fields.push(
            QualityField::new(quality_fields::SATFILTER, Array2::ones((1, 1)))
                .with_task_args("S_NWC_20240501T120000Z.nc"),
        );
        record_prequalified([&sat], &mut provenance);
        assert_eq!(
            provenance.encode_tasks().unwrap(),
            "nimbus-qc-satfilter,ropo,beamb,satfilter"
        );
        assert!(
            provenance
                .encode_task_args()
                .unwrap()
                .starts_with("satfilter_file:S_NWC_20240501T120000Z.nc;satfilter_nodes:seang;")
        );
    }
}
