//! Provenance of a composite: contributing nodes and applied quality control.
//!
//! Held as structured data internally and only encoded into the delimited
//! `how/nodes`, `how/task` and `how/task_args` attributes at the boundary,
//! where downstream consumers expect the historic wire format.

use super::{AttributeValue, Attributes, attribute_str};
use crate::constants::{attributes, is_prequalified_marker, markers};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceMetadata {
    pub nodes: IndexSet<String>,
    pub tasks: IndexSet<String>,
    /// Detector name → nodes it ran on
    pub detector_nodes: IndexMap<String, IndexSet<String>>,
    /// Marker of upstream-qualified input (`nimbus-qc`, `nimbus-qc-satfilter`)
    pub marker: Option<String>,
    /// Input file of the satellite filter
    pub satfilter_file: Option<String>,
}

impl ProvenanceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        self.nodes.insert(node.into());
    }

    pub fn add_task(&mut self, task: impl Into<String>) {
        let task = task.into();
        if !task.is_empty() {
            self.tasks.insert(task);
        }
    }

    /// Add every tag of a comma-delimited task string
    pub fn add_task_list(&mut self, tasks: &str) {
        for token in tasks.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if is_prequalified_marker(token) {
                self.set_marker(token);
            } else {
                self.add_task(token);
            }
        }
    }

    pub fn add_detector_node(&mut self, detector: impl Into<String>, node: impl Into<String>) {
        self.detector_nodes
            .entry(detector.into())
            .or_default()
            .insert(node.into());
    }

    /// Record a marker; the satellite-filter marker outranks the plain one
    pub fn set_marker(&mut self, marker: &str) {
        match self.marker.as_deref() {
            Some(markers::PREQUALIFIED_SATFILTER) => {}
            Some(_) if marker != markers::PREQUALIFIED_SATFILTER => {}
            _ => self.marker = Some(marker.to_string()),
        }
    }

    /// Union with another provenance, keeping first-seen order
    pub fn merge(&mut self, other: &ProvenanceMetadata) {
        for node in &other.nodes {
            self.nodes.insert(node.clone());
        }
        for task in &other.tasks {
            self.tasks.insert(task.clone());
        }
        for (detector, nodes) in &other.detector_nodes {
            let entry = self.detector_nodes.entry(detector.clone()).or_default();
            for node in nodes {
                entry.insert(node.clone());
            }
        }
        if let Some(marker) = &other.marker {
            self.set_marker(marker);
        }
        if self.satfilter_file.is_none() {
            self.satfilter_file = other.satfilter_file.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.tasks.is_empty()
            && self.detector_nodes.is_empty()
            && self.marker.is_none()
    }

    pub fn encode_nodes(&self) -> String {
        join(&self.nodes)
    }

    /// `how/task` value, `None` when no quality control was recorded
    pub fn encode_tasks(&self) -> Option<String> {
        if self.tasks.is_empty() && self.marker.is_none() {
            return None;
        }
        let mut items: Vec<&str> = Vec::with_capacity(self.tasks.len() + 1);
        if let Some(marker) = &self.marker {
            items.push(marker);
        }
        items.extend(self.tasks.iter().map(String::as_str));
        Some(items.join(","))
    }

    /// `how/task_args` value, satellite filter first
    pub fn encode_task_args(&self) -> Option<String> {
        if self.detector_nodes.is_empty() && self.satfilter_file.is_none() {
            return None;
        }
        let mut out = String::new();
        if let Some(file) = &self.satfilter_file {
            out.push_str(&format!("{}:{};", markers::SATFILTER_FILE_KEY, file));
        }
        let ordered = self
            .detector_nodes
            .iter()
            .filter(|(d, _)| d.as_str() == markers::SATFILTER_DETECTOR)
            .chain(
                self.detector_nodes
                    .iter()
                    .filter(|(d, _)| d.as_str() != markers::SATFILTER_DETECTOR),
            );
        for (detector, nodes) in ordered {
            out.push_str(&format!("{}_nodes:{};", detector, join(nodes)));
        }
        Some(out)
    }

    /// Parse a `how/task_args` value written by [`encode_task_args`](Self::encode_task_args)
    pub fn add_task_args(&mut self, args: &str) {
        for item in args.split(';').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some(file) = item.strip_prefix(&format!("{}:", markers::SATFILTER_FILE_KEY)) {
                if self.satfilter_file.is_none() && !file.is_empty() {
                    self.satfilter_file = Some(file.to_string());
                }
            } else if let Some((detector, nodes)) = item.split_once("_nodes:") {
                for node in nodes.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    self.add_detector_node(detector, node);
                }
            }
        }
    }

    /// Read provenance back from product attributes
    pub fn from_attributes(attrs: &Attributes) -> Self {
        let mut provenance = Self::new();
        if let Some(nodes) = attribute_str(attrs, attributes::HOW_NODES) {
            for node in nodes.split(',').map(clean_node).filter(|n| !n.is_empty()) {
                provenance.add_node(node);
            }
        }
        if let Some(tasks) = attribute_str(attrs, attributes::HOW_TASK) {
            provenance.add_task_list(tasks);
        }
        if let Some(args) = attribute_str(attrs, attributes::HOW_TASK_ARGS) {
            provenance.add_task_args(args);
        }
        provenance
    }

    /// Write the provenance attributes, removing stale quality-control ones
    pub fn write_attributes(&self, attrs: &mut Attributes) {
        attrs.insert(
            attributes::HOW_NODES.to_string(),
            AttributeValue::String(self.encode_nodes()),
        );
        match self.encode_tasks() {
            Some(tasks) => {
                attrs.insert(attributes::HOW_TASK.to_string(), tasks.into());
            }
            None => {
                attrs.shift_remove(attributes::HOW_TASK);
            }
        }
        match self.encode_task_args() {
            Some(args) => {
                attrs.insert(attributes::HOW_TASK_ARGS.to_string(), args.into());
            }
            None => {
                attrs.shift_remove(attributes::HOW_TASK_ARGS);
            }
        }
    }
}

fn join(items: &IndexSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn clean_node(raw: &str) -> &str {
    raw.trim().trim_matches('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(nodes: &[&str], tasks: &[&str]) -> ProvenanceMetadata {
        let mut p = ProvenanceMetadata::new();
        for n in nodes {
            p.add_node(*n);
        }
        for t in tasks {
            p.add_task(*t);
            for n in nodes {
                p.add_detector_node(*t, *n);
            }
        }
        p
    }

    #[test]
    fn test_merge_is_idempotent_and_ordered() {
        let a = tile(&["seang", "searl"], &["ropo"]);
        let b = tile(&["searl", "sekkr"], &["ropo", "beamb"]);

        let mut merged = a.clone();
        merged.merge(&b);
        merged.merge(&b);

        assert_eq!(merged.encode_nodes(), "seang,searl,sekkr");
        assert_eq!(merged.encode_tasks().unwrap(), "ropo,beamb");
        assert_eq!(
            merged.encode_task_args().unwrap(),
            "ropo_nodes:seang,searl,sekkr;beamb_nodes:searl,sekkr;"
        );
    }

    #[test]
    fn test_merge_is_associative() {
        let a = tile(&["a"], &["x"]);
        let b = tile(&["b"], &["y"]);
        let c = tile(&["c", "a"], &["x"]);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left, right);
    }

    #[test]
    fn test_satfilter_first_with_file_prefix() {
        let mut p = ProvenanceMetadata::new();
        p.add_detector_node("ropo", "seang");
        p.add_detector_node("satfilter", "seang");
        p.satfilter_file = Some("sat_202405011200.h5".into());
        assert_eq!(
            p.encode_task_args().unwrap(),
            "satfilter_file:sat_202405011200.h5;satfilter_nodes:seang;ropo_nodes:seang;"
        );
    }

    #[test]
    fn test_marker_precedence() {
        let mut p = ProvenanceMetadata::new();
        p.add_task_list("nimbus-qc,ropo");
        p.add_task_list("nimbus-qc-satfilter,satfilter");
        p.add_task_list("nimbus-qc,ropo");
        assert_eq!(p.encode_tasks().unwrap(), "nimbus-qc-satfilter,ropo,satfilter");
    }

    #[test]
    fn test_attribute_round_trip() {
        let mut p = tile(&["seang", "searl"], &["ropo"]);
        p.satfilter_file = Some("f.h5".into());
        let mut attrs = Attributes::new();
        p.write_attributes(&mut attrs);
        assert_eq!(ProvenanceMetadata::from_attributes(&attrs), p);
    }

    #[test]
    fn test_no_task_attribute_without_quality_control() {
        let p = tile(&["seang"], &[]);
        let mut attrs = Attributes::new();
        attrs.insert(attributes::HOW_TASK.into(), "stale".into());
        p.write_attributes(&mut attrs);
        assert_eq!(attribute_str(&attrs, attributes::HOW_NODES), Some("seang"));
        assert!(!attrs.contains_key(attributes::HOW_TASK));
        assert!(!attrs.contains_key(attributes::HOW_TASK_ARGS));
    }

    #[test]
    fn test_quoted_nodes_are_accepted() {
        let mut attrs = Attributes::new();
        attrs.insert(attributes::HOW_NODES.into(), "'seang','searl'".into());
        let p = ProvenanceMetadata::from_attributes(&attrs);
        assert_eq!(p.encode_nodes(), "seang,searl");
    }
}
