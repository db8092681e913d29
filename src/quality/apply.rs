//! Quality control of a single observation file.
//!
//! Used to produce quality-controlled volumes ahead of compositing. When the
//! detector list holds the configured-QC token, detectors are chosen per
//! radar from a [`DetectorSelection`] and the result is tagged with a marker
//! `how/task` so later composites can tell it was qualified upstream.

use super::{DetectorSelection, QualityControlRunner, QualityRegistry};
use crate::constants::{attributes, is_prequalified_marker, markers};
use crate::io::{read_object, write_object};
use crate::models::{PolarObject, QualityControlMode, RadarObject, attribute_str};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to run on one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyQualityRequest {
    pub detectors: Vec<String>,
    pub qc_mode: QualityControlMode,
    pub remove_malfunc: bool,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl ApplyQualityRequest {
    pub fn new<S: AsRef<str>>(detectors: &[S]) -> Self {
        Self {
            detectors: detectors.iter().map(|d| d.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_qc_mode(mut self, mode: QualityControlMode) -> Self {
        self.qc_mode = mode;
        self
    }

    pub fn with_remove_malfunc(mut self, remove: bool) -> Self {
        self.remove_malfunc = remove;
        self
    }

    pub fn with_date_time(mut self, date: Option<NaiveDate>, time: Option<NaiveTime>) -> Self {
        self.date = date;
        self.time = time;
        self
    }

    fn has(&self, token: &str) -> bool {
        self.detectors.iter().any(|d| d == token)
    }

    /// Whether detectors come from the per-radar selection
    pub fn is_configured(&self) -> bool {
        self.has(markers::CONFIGURED_QC)
    }
}

/// Result of quality controlling one object
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedQuality {
    pub object: PolarObject,
    /// Detectors applied, or the written marker list for configured runs
    pub detectors: Vec<String>,
}

pub struct QualityApplier<'a> {
    registry: &'a QualityRegistry,
    selection: &'a DetectorSelection,
}

impl<'a> QualityApplier<'a> {
    pub fn new(registry: &'a QualityRegistry, selection: &'a DetectorSelection) -> Self {
        Self {
            registry,
            selection,
        }
    }

    /// Quality control `input` and write it to `output`.
    ///
    /// Returns `None` without writing when malfunction removal left nothing.
    pub fn apply_file(
        &self,
        input: &Path,
        output: &Path,
        request: &ApplyQualityRequest,
    ) -> Result<Option<AppliedQuality>> {
        let object = read_object(input)?;
        let kind = object.kind();
        let object = object.into_polar().ok_or_else(|| {
            Error::quality_control(
                "apply",
                format!("{} holds a {}, expected a scan or volume", input.display(), kind),
            )
        })?;
        info!(
            "Generating new volume with quality controls from {}; detectors = {}",
            input.display(),
            request.detectors.join(",")
        );

        let Some(applied) = self.apply(object, request)? else {
            return Ok(None);
        };
        write_object(output, &RadarObject::from(applied.object.clone()))?;
        info!(
            "Generated new volume with quality controls applied: {}",
            output.display()
        );
        Ok(Some(applied))
    }

    pub fn apply(
        &self,
        object: PolarObject,
        request: &ApplyQualityRequest,
    ) -> Result<Option<AppliedQuality>> {
        let node = object.node();
        let object = if request.remove_malfunc {
            match object.remove_malfunctioning() {
                Some(object) => object,
                None => {
                    warn!(
                        "Malfunctioning volume from {}, no quality-controlled volume generated",
                        node
                    );
                    return Ok(None);
                }
            }
        } else {
            object
        };

        let mut applied = if request.is_configured() {
            self.apply_configured(object, request)?
        } else {
            let object = self.run(object, &request.detectors, request.qc_mode)?;
            AppliedQuality {
                object,
                detectors: request.detectors.clone(),
            }
        };

        if let Some(date) = request.date {
            applied.object.set_date(date);
        }
        if let Some(time) = request.time {
            applied.object.set_time(time);
        }
        info!(
            "Quality controls applied on {}: {}",
            node,
            applied.detectors.join(",")
        );
        Ok(Some(applied))
    }

    fn apply_configured(
        &self,
        object: PolarObject,
        request: &ApplyQualityRequest,
    ) -> Result<AppliedQuality> {
        let node = object.node();
        let mut selected: Vec<String> = self
            .selection
            .detectors_for(&node)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let mut previous = Vec::new();

        if !selected.is_empty() {
            if request.has(markers::SATFILTER_APPLY_ALL) {
                if !selected.iter().any(|d| d == markers::SATFILTER_DETECTOR) {
                    selected.push(markers::SATFILTER_DETECTOR.to_string());
                }
            } else if request.has(markers::SATFILTER_SKIP) {
                selected.retain(|d| d != markers::SATFILTER_DETECTOR);
            }

            previous = self.already_applied(&object);
            for detector in &previous {
                if selected.contains(detector) {
                    debug!("Skipping {} for {}, already applied", detector, node);
                }
            }
            selected.retain(|d| !previous.contains(d));
        }
        if selected.is_empty() {
            warn!("No configured detectors for {}", node);
        }

        let mut object = self.run(object, &selected, request.qc_mode)?;

        let marker = if request.has(markers::SATFILTER_SKIP) {
            markers::PREQUALIFIED_NO_SATFILTER
        } else if request.has(markers::SATFILTER_APPLY_ALL) {
            markers::PREQUALIFIED_SATFILTER
        } else {
            markers::PREQUALIFIED
        };
        let mut detectors = vec![marker.to_string()];
        detectors.extend(previous);
        detectors.extend(selected);

        let task = detectors.join(",");
        info!("Marking {} with {} = {}", node, attributes::HOW_TASK, task);
        object
            .attributes_mut()
            .insert(attributes::HOW_TASK.to_string(), task.into());
        Ok(AppliedQuality { object, detectors })
    }

    /// Registered detectors listed after the marker of the current `how/task`
    fn already_applied(&self, object: &PolarObject) -> Vec<String> {
        let Some(tasks) = attribute_str(object.attributes(), attributes::HOW_TASK) else {
            return Vec::new();
        };
        let mut tokens = tasks.split(',').map(str::trim).peekable();
        if tokens.peek().is_some_and(|t| is_prequalified_marker(t)) {
            tokens.next();
        }
        tokens
            .filter(|t| self.registry.contains(t))
            .map(str::to_string)
            .collect()
    }

    fn run(
        &self,
        object: PolarObject,
        detectors: &[String],
        mode: QualityControlMode,
    ) -> Result<PolarObject> {
        let node = object.node();
        let mut objects = IndexMap::new();
        objects.insert(PathBuf::from(&node), object);
        let outcome = QualityControlRunner::new(self.registry)
            .with_context(format!("node={}", node))
            .apply(objects, detectors, mode, true)?;
        outcome
            .objects
            .into_values()
            .next()
            .ok_or_else(|| Error::quality_control("apply", format!("{} was lost", node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use tempfile::TempDir;

    fn registry() -> QualityRegistry {
        QualityRegistry::with_builtin_detectors("DBZH", 10.0)
    }

    fn volume() -> PolarObject {
        fixtures::volume("WMO:02606,NOD:seang", 12.5, 56.0, 2)
    }

    fn task_of(object: &PolarObject) -> Option<&str> {
        attribute_str(object.attributes(), attributes::HOW_TASK)
    }

    #[test]
    fn test_plain_detector_list() {
        let registry = registry();
        let selection = DetectorSelection::new();
        let applied = QualityApplier::new(&registry, &selection)
            .apply(volume(), &ApplyQualityRequest::new(&["threshold", "ropo"]))
            .unwrap()
            .unwrap();

        assert_eq!(applied.detectors, vec!["threshold", "ropo"]);
        assert!(task_of(&applied.object).is_none());
    }

    #[test]
    fn test_configured_run_skips_applied_detectors() {
        let registry = registry();
        let selection = DetectorSelection::new()
            .with_node("default", &["distance"])
            .with_node("seang", &["distance", "threshold"]);
        let mut object = volume();
        object
            .attributes_mut()
            .insert(attributes::HOW_TASK.into(), "nimbus-qc,distance,unknown".into());

        let applied = QualityApplier::new(&registry, &selection)
            .apply(object, &ApplyQualityRequest::new(&["nimbus-configured-qc"]))
            .unwrap()
            .unwrap();

        assert_eq!(applied.detectors, vec!["nimbus-qc", "distance", "threshold"]);
        assert_eq!(task_of(&applied.object), Some("nimbus-qc,distance,threshold"));
    }

    #[test]
    fn test_satfilter_tokens() {
        let registry = registry();
        let selection = DetectorSelection::new().with_node("default", &["threshold", "satfilter"]);
        let applier = QualityApplier::new(&registry, &selection);

        let skipped = applier
            .apply(
                volume(),
                &ApplyQualityRequest::new(&["nimbus-configured-qc", "nimbus-satfilter-skip"]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            task_of(&skipped.object),
            Some("nimbus-qc-no-satfilter,threshold")
        );

        let selection = DetectorSelection::new().with_node("default", &["threshold"]);
        let added = QualityApplier::new(&registry, &selection)
            .apply(
                volume(),
                &ApplyQualityRequest::new(&["nimbus-configured-qc", "nimbus-satfilter-apply-all"]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            task_of(&added.object),
            Some("nimbus-qc-satfilter,threshold,satfilter")
        );
    }

    #[test]
    fn test_malfunctioning_volume_yields_nothing() {
        let registry = registry();
        let selection = DetectorSelection::new();
        let mut object = volume();
        object
            .attributes_mut()
            .insert(attributes::HOW_MALFUNC.into(), "True".into());

        let request = ApplyQualityRequest::new(&["threshold"]).with_remove_malfunc(true);
        assert!(
            QualityApplier::new(&registry, &selection)
                .apply(object, &request)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_apply_file_with_date_time_override() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.json");
        let output = temp_dir.path().join("out.json");
        write_object(&input, &RadarObject::from(volume())).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(6, 15, 0).unwrap();
        let registry = registry();
        let selection = DetectorSelection::new();
        QualityApplier::new(&registry, &selection)
            .apply_file(
                &input,
                &output,
                &ApplyQualityRequest::new(&["distance"]).with_date_time(Some(date), Some(time)),
            )
            .unwrap()
            .unwrap();

        let written = read_object(&output).unwrap().into_polar().unwrap();
        assert_eq!(written.date(), Some(date));
        assert_eq!(written.time(), Some(time));
    }
}
