//! Reading and validating the observation files of one generation call.

use crate::io::ObjectStore;
use crate::models::PolarObject;
use indexmap::{IndexMap, IndexSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Objects read for one generation call
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Usable objects keyed by their file, in input order
    pub objects: IndexMap<PathBuf, PolarObject>,
    /// Nodes of the usable objects, first-seen order
    pub nodes: IndexSet<String>,
    /// `how/task` tags found on the scans, first-seen order
    pub qc_tasks: IndexSet<String>,
    /// Every supplied file was malfunctioning
    pub all_malfunctioning: bool,
    pub malfunctioning: usize,
    /// Files that could not be read or were not polar objects
    pub skipped: usize,
}

impl FetchOutcome {
    /// Comma separated node list as written to `how/nodes`
    pub fn node_list(&self) -> String {
        self.nodes.iter().cloned().collect::<Vec<_>>().join(",")
    }

    pub fn qc_task_list(&self) -> String {
        self.qc_tasks.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Opens observation files through an object store
pub struct ObjectSource<'a> {
    store: &'a dyn ObjectStore,
    ignore_malfunc: bool,
    context: String,
}

impl<'a> ObjectSource<'a> {
    pub fn new(store: &'a dyn ObjectStore, ignore_malfunc: bool) -> Self {
        Self {
            store,
            ignore_malfunc,
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Read every file, skipping those that cannot be used
    pub fn fetch(&self, files: &[PathBuf]) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        for path in files {
            let object = match self.store.open(path) {
                Ok(object) => object,
                Err(e) => {
                    warn!("[{}] Failed to read {}: {}", self.context, path.display(), e);
                    outcome.skipped += 1;
                    continue;
                }
            };
            let kind = object.kind();
            let Some(object) = object.into_polar() else {
                warn!(
                    "[{}] Ignoring {} in {}, only scans and volumes can be composited",
                    self.context,
                    kind,
                    path.display()
                );
                outcome.skipped += 1;
                continue;
            };

            let object = if self.ignore_malfunc {
                let node = object.node();
                let stripped = object.has_malfunctioning_scans();
                match object.remove_malfunctioning() {
                    Some(object) => {
                        if stripped {
                            debug!(
                                "[{}] Removed malfunctioning scans of {} ({})",
                                self.context,
                                node,
                                path.display()
                            );
                        }
                        object
                    }
                    None => {
                        debug!(
                            "[{}] Skipping malfunctioning {} ({})",
                            self.context,
                            node,
                            path.display()
                        );
                        outcome.malfunctioning += 1;
                        continue;
                    }
                }
            } else {
                object
            };

            outcome.nodes.insert(object.node());
            for scan in object.scans() {
                if let Some(tasks) = scan.task() {
                    for tag in tasks.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                        outcome.qc_tasks.insert(tag.to_string());
                    }
                }
            }
            outcome.objects.insert(path.clone(), object);
        }

        outcome.all_malfunctioning =
            self.ignore_malfunc && !files.is_empty() && outcome.malfunctioning == files.len();
        debug!(
            "[{}] Fetched {} of {} files ({} malfunctioning, {} skipped)",
            self.context,
            outcome.objects.len(),
            files.len(),
            outcome.malfunctioning,
            outcome.skipped
        );
        outcome
    }
}
