//! Quality control ahead of tiling.
//!
//! Running the detectors once per input, instead of once per tile the input
//! reaches, pays off when radars overlap many tiles. Controlled objects are
//! persisted in the scratch space and replace the original file list; a batch
//! that cannot be persisted keeps its original files, and the tile workers
//! then control those themselves.

use super::pool::{pool_size, run_blocking};
use super::scratch::ScratchSpace;
use crate::compositing::{CompositeRequest, ObjectSource, Toolbox};
use crate::io::write_temporary;
use crate::models::{PolarObject, ProvenanceMetadata, RadarObject};
use crate::quality::QualityControlRunner;
use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where quality control runs before tiling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PrestageMode {
    /// Every tile worker controls its own inputs
    #[default]
    Off,
    /// The coordinator controls all inputs itself
    InProcess,
    /// Batches of inputs are controlled on a worker pool
    Pooled { workers: usize, split_evenly: bool },
}

impl PrestageMode {
    /// Mode for the `preprocess_qc` / `mp_process_qc` switches.
    ///
    /// A pool of a single worker gains nothing over the coordinator.
    pub fn from_flags(preprocess: bool, pooled: bool, workers: usize, split_evenly: bool) -> Self {
        match (preprocess, pooled && workers > 1) {
            (false, _) => Self::Off,
            (true, false) => Self::InProcess,
            (true, true) => Self::Pooled {
                workers,
                split_evenly,
            },
        }
    }
}

/// Split inputs into pre-stage batches.
///
/// One file per batch, or contiguous slices spread evenly over as many
/// workers as the pool will get.
pub fn split_batches(
    files: &[PathBuf],
    workers: usize,
    cores: usize,
    split_evenly: bool,
) -> Vec<Vec<PathBuf>> {
    if files.is_empty() {
        return Vec::new();
    }
    if !split_evenly || workers == 0 {
        return files.iter().map(|f| vec![f.clone()]).collect();
    }
    let processes = pool_size(Some(workers), usize::MAX, cores);
    let slice = files.len().div_ceil(processes);
    files.chunks(slice).map(<[PathBuf]>::to_vec).collect()
}

/// Outcome of one pre-stage batch
#[derive(Debug, Default)]
pub struct PrestageBatch {
    /// Files replacing the batch inputs
    pub files: Vec<PathBuf>,
    /// Whether `files` are freshly persisted temporaries
    pub stored: bool,
    pub provenance: ProvenanceMetadata,
}

/// Store controlled objects as temporaries, keyed by their new path.
///
/// Nothing is left behind when any write fails.
pub fn store_temporary_files(
    dir: &Path,
    objects: &IndexMap<PathBuf, PolarObject>,
) -> Result<IndexMap<PathBuf, PolarObject>> {
    let mut stored = IndexMap::with_capacity(objects.len());
    for object in objects.values() {
        let prefix = format!("qc_{}_", object.node());
        match write_temporary(dir, &prefix, &RadarObject::from(object.clone())) {
            Ok(path) => {
                stored.insert(path, object.clone());
            }
            Err(e) => {
                for path in stored.keys() {
                    let _ = std::fs::remove_file(path);
                }
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// Fetch, control and persist one batch of files
pub fn execute_quality_control(
    toolbox: &Toolbox,
    request: &CompositeRequest,
    files: &[PathBuf],
    dir: &Path,
) -> Result<PrestageBatch> {
    let store = request.store.open();
    let fetched = ObjectSource::new(store.as_ref(), request.ignore_malfunc).fetch(files);
    let qc = QualityControlRunner::new(&toolbox.quality).apply(
        fetched.objects,
        &request.detectors,
        request.qc_mode,
        request.reprocess_quality_fields,
    )?;
    let stored = store_temporary_files(dir, &qc.objects)?;
    Ok(PrestageBatch {
        files: stored.into_keys().collect(),
        stored: true,
        provenance: qc.provenance,
    })
}

/// Runs the pre-stage for one request
pub struct QualityPrestage<'a> {
    toolbox: &'a Arc<Toolbox>,
    request: &'a CompositeRequest,
    scratch: &'a ScratchSpace,
    cores: usize,
    context: String,
}

impl<'a> QualityPrestage<'a> {
    pub fn new(
        toolbox: &'a Arc<Toolbox>,
        request: &'a CompositeRequest,
        scratch: &'a ScratchSpace,
    ) -> Self {
        Self {
            toolbox,
            request,
            scratch,
            cores: num_cpus::get(),
            context: String::new(),
        }
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Control already fetched objects in the coordinator.
    ///
    /// Returns the objects keyed by their replacement files, or by their
    /// original files when they could not be persisted.
    pub fn run_in_process(
        &self,
        objects: IndexMap<PathBuf, PolarObject>,
    ) -> Result<(IndexMap<PathBuf, PolarObject>, ProvenanceMetadata)> {
        let qc = QualityControlRunner::new(&self.toolbox.quality)
            .with_context(self.context.clone())
            .apply(
                objects,
                &self.request.detectors,
                self.request.qc_mode,
                self.request.reprocess_quality_fields,
            )?;

        match store_temporary_files(self.scratch.path(), &qc.objects) {
            Ok(stored) => {
                for path in stored.keys() {
                    self.scratch.track(path);
                }
                info!(
                    "[{}] Pre-processed quality control of {} objects",
                    self.context,
                    stored.len()
                );
                Ok((stored, qc.provenance))
            }
            Err(e) => {
                warn!(
                    "[{}] Failed to create temporary files, will not preprocess qc: {}",
                    self.context, e
                );
                Ok((qc.objects, qc.provenance))
            }
        }
    }

    /// Control batches of files on a worker pool, returning the new file list
    pub async fn run_pooled(
        &self,
        files: &[PathBuf],
        workers: usize,
        split_evenly: bool,
    ) -> (Vec<PathBuf>, ProvenanceMetadata) {
        let batches = split_batches(files, workers, self.cores, split_evenly);
        let processes = pool_size(Some(workers), batches.len(), self.cores);
        info!(
            "[{}] Quality controlling {} files in {} batches on {} workers",
            self.context,
            files.len(),
            batches.len(),
            processes
        );

        let toolbox = Arc::clone(self.toolbox);
        let request = Arc::new(self.request.clone());
        let dir = self.scratch.path().to_path_buf();
        let outcomes = run_blocking(batches.clone(), processes, move |batch: Vec<PathBuf>| {
            execute_quality_control(&toolbox, &request, &batch, &dir)
        })
        .await;

        let mut replaced = Vec::with_capacity(files.len());
        let mut provenance = ProvenanceMetadata::new();
        for (batch, outcome) in batches.into_iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(
                        "[{}] Quality control of {} files failed, keeping originals: {}",
                        self.context,
                        batch.len(),
                        e
                    );
                    kept(batch)
                }
                Err(e) => {
                    error!(
                        "[{}] Quality control worker did not complete, keeping originals: {}",
                        self.context, e
                    );
                    kept(batch)
                }
            };
            if outcome.stored {
                for path in &outcome.files {
                    self.scratch.track(path);
                }
            }
            provenance.merge(&outcome.provenance);
            replaced.extend(outcome.files);
        }
        debug!(
            "[{}] Pre-stage produced {} files",
            self.context,
            replaced.len()
        );
        (replaced, provenance)
    }
}

fn kept(files: Vec<PathBuf>) -> PrestageBatch {
    PrestageBatch {
        files,
        stored: false,
        provenance: ProvenanceMetadata::new(),
    }
}
