//! Tile tasks and their partial results.

use crate::compositing::{AreaTarget, CompositeRequest, Compositor, Toolbox, log_context};
use crate::io::write_temporary;
use crate::models::{AreaDefinition, RadarObject};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Everything one tile worker needs, frozen at submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileTask {
    pub tile: AreaDefinition,
    /// Input files whose coverage reaches the tile
    pub files: Vec<PathBuf>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    /// Request copy carrying the global radar-index mapping
    pub request: CompositeRequest,
    /// Directory receiving the partial result
    pub scratch_dir: PathBuf,
}

impl TileTask {
    pub fn tile_id(&self) -> &str {
        &self.tile.id
    }

    /// Serialized form handed to a worker
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::tile_worker(&self.tile.id, e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| Error::tile_worker("<undecodable>", format!("invalid task: {}", e)))
    }

    /// Generate this tile and persist it in the scratch directory
    pub fn run(&self, toolbox: &Toolbox) -> Result<PartialTileResult> {
        let context = log_context(self.date, self.time, &self.tile.id);
        debug!(
            "[{}] Generating tile {}x{} from {} files",
            context,
            self.tile.xsize,
            self.tile.ysize,
            self.files.len()
        );

        let mut compositor = Compositor::new(toolbox, &self.request);
        let target = AreaTarget::Definition(self.tile.clone());
        let Some(product) = compositor.generate(&self.files, self.date, self.time, &target)? else {
            debug!("[{}] No composite for tile could be generated", context);
            return Ok(PartialTileResult::Empty {
                tile_id: self.tile.id.clone(),
            });
        };

        let path = write_temporary(
            &self.scratch_dir,
            &format!("tile_{}_", self.tile.id),
            &RadarObject::from(product),
        )?;
        info!(
            "[{}] Finished generating tile; file = {}",
            context,
            path.display()
        );
        Ok(PartialTileResult::Rendered {
            tile_id: self.tile.id.clone(),
            path,
        })
    }
}

/// Worker entry point: decode a serialized task and run it
pub fn execute(toolbox: &Toolbox, payload: &str) -> Result<PartialTileResult> {
    TileTask::decode(payload)?.run(toolbox)
}

/// Outcome of one tile task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialTileResult {
    /// Partial composite written to a temporary file
    Rendered { tile_id: String, path: PathBuf },
    /// The tile produced nothing, or its worker failed
    Empty { tile_id: String },
}

impl PartialTileResult {
    pub fn tile_id(&self) -> &str {
        match self {
            Self::Rendered { tile_id, .. } | Self::Empty { tile_id } => tile_id,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Rendered { path, .. } => Some(path),
            Self::Empty { .. } => None,
        }
    }
}
