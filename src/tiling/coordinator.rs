//! Tiled compositing coordinator.
//!
//! Owns one request from start to finish: optional quality-control
//! pre-stage, tiling, the tile worker pool, combination and cleanup of every
//! intermediate file.

use super::combiner::TileCombiner;
use super::pool::TileWorkerPool;
use super::prestage::{PrestageMode, QualityPrestage};
use super::scratch::ScratchSpace;
use super::task::TileTask;
use super::tiler::{AreaTiler, ensure_date_time, fallback_timestamp, radar_index_mapping};
use crate::compositing::{
    AreaTarget, CompositeRequest, FetchOutcome, ObjectSource, Toolbox, best_fit_area, log_context,
};
use crate::models::{CartesianProduct, PolarObject, ProvenanceMetadata};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a tiled request is spread over workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilingOptions {
    /// Upper bound of tile workers; `None` leaves only the core bound
    pub tile_workers: Option<usize>,
    pub prestage: PrestageMode,
    /// Directory under which the per-request scratch directory is created
    pub scratch_root: Option<PathBuf>,
    pub cores: usize,
}

impl Default for TilingOptions {
    fn default() -> Self {
        Self {
            tile_workers: None,
            prestage: PrestageMode::Off,
            scratch_root: None,
            cores: num_cpus::get(),
        }
    }
}

impl TilingOptions {
    pub fn with_tile_workers(mut self, workers: usize) -> Self {
        self.tile_workers = Some(workers);
        self
    }

    pub fn with_prestage(mut self, prestage: PrestageMode) -> Self {
        self.prestage = prestage;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }
}

/// Counters of one tiled generation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TiledCompositeStats {
    pub input_files: usize,
    pub usable_objects: usize,
    pub tiles: usize,
    pub tiles_rendered: usize,
    pub tiles_failed: usize,
    pub tile_workers: usize,
    /// Inputs replaced by pre-staged temporaries
    pub prestaged_files: usize,
    pub processing_time_ms: u128,
}

impl TiledCompositeStats {
    pub fn tiles_empty(&self) -> usize {
        self.tiles - self.tiles_rendered - self.tiles_failed
    }

    pub fn is_complete(&self) -> bool {
        self.tiles_failed == 0
    }
}

/// Generates composites by splitting the target area into tiles
///
/// Post-processing runs inside each tile. The `BRDR` border parameter and
/// gap filling only see their own tile, so borders and gaps on a tile seam
/// can differ from an untiled run. With both off the combined raster equals
/// the untiled one.
pub struct TiledCompositor {
    toolbox: Arc<Toolbox>,
    request: CompositeRequest,
    options: TilingOptions,
    progress: Option<ProgressBar>,
}

impl TiledCompositor {
    pub fn new(toolbox: Arc<Toolbox>, request: CompositeRequest) -> Self {
        Self {
            toolbox,
            request,
            options: TilingOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: TilingOptions) -> Self {
        self.options = options;
        self
    }

    /// Report finished tiles on `progress`; its length is set per request
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn request(&self) -> &CompositeRequest {
        &self.request
    }

    /// Generate the composite of `area`, `None` when nothing usable was given
    pub async fn generate(
        &self,
        files: &[PathBuf],
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        area: &AreaTarget,
    ) -> Result<Option<CartesianProduct>> {
        let (product, _) = self.generate_detailed(files, date, time, area).await?;
        Ok(product)
    }

    /// Like [`TiledCompositor::generate`], also returning what happened
    pub async fn generate_detailed(
        &self,
        files: &[PathBuf],
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        area: &AreaTarget,
    ) -> Result<(Option<CartesianProduct>, TiledCompositeStats)> {
        let start_time = Instant::now();
        self.request.validate()?;
        let context = log_context(date, time, area.id());

        let scratch = ScratchSpace::new(self.options.scratch_root.as_deref())?;
        let mut stats = TiledCompositeStats {
            input_files: files.len(),
            ..Default::default()
        };
        let result = self
            .run(&scratch, files, date, time, area, &context, &mut stats)
            .await;

        let removed = scratch.cleanup();
        debug!("[{}] Removed {} temporary files", context, removed);
        drop(scratch);

        stats.processing_time_ms = start_time.elapsed().as_millis();
        result.map(|product| (product, stats))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        scratch: &ScratchSpace,
        files: &[PathBuf],
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        area: &AreaTarget,
        context: &str,
        stats: &mut TiledCompositeStats,
    ) -> Result<Option<CartesianProduct>> {
        let request = &self.request;
        let (fetched, prestaged) = self.fetch(scratch, files, context, stats).await?;

        if fetched.all_malfunctioning {
            warn!(
                "[{}] Content of all provided files were marked as malfunctioning, no composite generated",
                context
            );
            return Ok(None);
        }
        if fetched.objects.is_empty() {
            info!("[{}] No usable objects, no composite generated", context);
            return Ok(None);
        }
        stats.usable_objects = fetched.objects.len();

        let area = match area {
            AreaTarget::Registered(id) => self.toolbox.areas.area(id)?.clone(),
            AreaTarget::Definition(definition) => definition.clone(),
            AreaTarget::BestFit => {
                let objects: Vec<PolarObject> = fetched.objects.values().cloned().collect();
                best_fit_area(
                    &objects,
                    &self.toolbox.areas,
                    &request.pcsid,
                    request.xscale,
                    request.yscale,
                )?
            }
        };

        let fallback = fallback_timestamp(fetched.objects.values());
        if (date.is_none() || time.is_none()) && fallback.is_none() {
            warn!("[{}] No date and time given and none found in the inputs", context);
            return Err(Error::indeterminate_timestamp(
                "could not ensure existing date and time for composite",
            ));
        }

        let tiler = AreaTiler::new(&self.toolbox.areas, &request.quantity).with_context(context);
        let tiles = tiler.tile_area(&area);
        let assignment = tiler.assign(&fetched.objects, &tiles)?;

        let mut tile_request = request.clone();
        tile_request.radar_index = radar_index_mapping(fetched.objects.values(), &request.radar_index);

        let mut tasks: Vec<TileTask> = tiles
            .into_iter()
            .zip(assignment)
            .map(|(tile, files)| TileTask {
                tile,
                files,
                date,
                time,
                request: tile_request.clone(),
                scratch_dir: scratch.path().to_path_buf(),
            })
            .collect();
        ensure_date_time(&mut tasks, fallback)?;
        stats.tiles = tasks.len();

        let mut pool = TileWorkerPool::new(Arc::clone(&self.toolbox))
            .with_max_workers(self.options.tile_workers)
            .with_cores(self.options.cores);
        if let Some(pb) = &self.progress {
            pb.set_length(tasks.len() as u64);
            pool = pool.with_progress(pb.clone());
        }
        let batch = pool.run(tasks).await;
        for path in batch.results.iter().filter_map(|r| r.path()) {
            scratch.track(path);
        }
        stats.tile_workers = batch.workers;
        stats.tiles_rendered = batch.rendered();
        stats.tiles_failed = batch.failed;
        info!(
            "[{}] Finished processing {} tiles ({} rendered, {} failed), combining tiles",
            context,
            stats.tiles,
            stats.tiles_rendered,
            stats.tiles_failed
        );

        let mut provenance = ProvenanceMetadata::new();
        for node in &fetched.nodes {
            provenance.add_node(node.clone());
        }
        provenance.add_task_list(&fetched.qc_task_list());
        provenance.merge(&prestaged);

        let product = TileCombiner::new(&area, &request.center_id)
            .with_provenance(provenance)
            .with_context(context)
            .combine(&batch.results)?;
        if product.is_some() {
            debug!("[{}] Tiles combined", context);
        }
        Ok(product)
    }

    /// Fetch the inputs, quality controlling them first when pre-staging
    async fn fetch(
        &self,
        scratch: &ScratchSpace,
        files: &[PathBuf],
        context: &str,
        stats: &mut TiledCompositeStats,
    ) -> Result<(FetchOutcome, ProvenanceMetadata)> {
        let request = &self.request;
        let store = request.store.open();
        let source = ObjectSource::new(store.as_ref(), request.ignore_malfunc).with_context(context);
        let prestage = QualityPrestage::new(&self.toolbox, request, scratch)
            .with_cores(self.options.cores)
            .with_context(context);

        info!(
            "[{}] Fetching (and processing) {} files for tiled compositing",
            context,
            files.len()
        );
        let outcome = match self.options.prestage {
            PrestageMode::Off => (source.fetch(files), ProvenanceMetadata::new()),
            PrestageMode::InProcess => {
                let mut fetched = source.fetch(files);
                let mut provenance = ProvenanceMetadata::new();
                if !fetched.objects.is_empty() {
                    let (objects, qc) = prestage.run_in_process(std::mem::take(&mut fetched.objects))?;
                    stats.prestaged_files = objects.keys().filter(|p| scratch.is_tracked(p)).count();
                    fetched.objects = objects;
                    provenance = qc;
                }
                (fetched, provenance)
            }
            PrestageMode::Pooled {
                workers,
                split_evenly,
            } => {
                let (replaced, provenance) = prestage.run_pooled(files, workers, split_evenly).await;
                stats.prestaged_files = replaced.iter().filter(|p| scratch.is_tracked(p)).count();
                (source.fetch(&replaced), provenance)
            }
        };
        info!(
            "[{}] Finished fetching {} objects for tiled compositing",
            context,
            outcome.0.objects.len()
        );
        Ok(outcome)
    }
}
