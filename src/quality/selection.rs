//! Per-radar detector selection for configured quality control runs.

use crate::constants::markers;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Detector lists by node, with a `default` entry for unlisted radars
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorSelection {
    by_node: IndexMap<String, Vec<String>>,
}

impl DetectorSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: impl Into<String>, detectors: &[&str]) -> Self {
        self.by_node.insert(
            node.into(),
            detectors.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    /// Detectors configured for a node, falling back to the default entry
    pub fn detectors_for(&self, node: &str) -> Option<&[String]> {
        self.by_node
            .get(node)
            .or_else(|| self.by_node.get(markers::DEFAULT_SELECTION))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_specific_and_default() {
        let selection = DetectorSelection::new()
            .with_node("default", &["ropo", "beamb"])
            .with_node("seang", &["ropo", "satfilter"]);

        assert_eq!(
            selection.detectors_for("seang").unwrap(),
            &["ropo".to_string(), "satfilter".to_string()]
        );
        assert_eq!(selection.detectors_for("searl").unwrap().len(), 2);
        assert!(DetectorSelection::new().detectors_for("seang").is_none());
    }
}
