//! Radar-source to index mapping used for per-pixel "which radar" encoding.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Injective mapping from canonical source id to a positive index.
///
/// An assigned index is never changed or handed to another source. New
/// sources get the smallest positive index not in use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadarIndexMapping {
    indices: IndexMap<String, u32>,
}

impl RadarIndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<u32> {
        self.indices.get(source_id).copied()
    }

    /// Index of a source, assigning the next free one when it is new
    pub fn assign(&mut self, source_id: &str) -> u32 {
        if let Some(idx) = self.get(source_id) {
            return idx;
        }
        let idx = self.next_free_index();
        self.indices.insert(source_id.to_string(), idx);
        idx
    }

    /// Smallest positive index not yet in use
    pub fn next_free_index(&self) -> u32 {
        let used: BTreeSet<u32> = self.indices.values().copied().collect();
        let mut candidate = 1;
        for idx in used {
            if idx != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.indices.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u32)> for RadarIndexMapping {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (source, idx) in iter {
            if idx > 0 && !mapping.indices.values().any(|&v| v == idx) {
                mapping.indices.entry(source).or_insert(idx);
            }
        }
        mapping
    }
}
