//! Splitting a target area into tiles and distributing the inputs.

use super::task::TileTask;
use crate::models::{AreaDefinition, OdimSource, PolarObject, RadarIndexMapping};
use crate::registry::AreaRegistry;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Resolves tiles of an area and assigns input files to them
pub struct AreaTiler<'a> {
    registry: &'a AreaRegistry,
    quantity: &'a str,
    context: String,
}

impl<'a> AreaTiler<'a> {
    pub fn new(registry: &'a AreaRegistry, quantity: &'a str) -> Self {
        Self {
            registry,
            quantity,
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Tiles of a registered area; an untiled area is its own single tile
    pub fn tile(&self, area_id: &str) -> Result<Vec<AreaDefinition>> {
        let area = self.registry.area(area_id)?;
        Ok(self.tile_area(area))
    }

    pub fn tile_area(&self, area: &AreaDefinition) -> Vec<AreaDefinition> {
        match self.registry.tiles(&area.id) {
            Some(tiles) if !tiles.is_empty() => tiles.to_vec(),
            _ => vec![area.clone()],
        }
    }

    /// Files per tile, in tile order.
    ///
    /// An object belongs to a tile when any point of the outermost ring of its
    /// longest-range scan projects inside the tile extent.
    pub fn assign(
        &self,
        objects: &IndexMap<PathBuf, PolarObject>,
        tiles: &[AreaDefinition],
    ) -> Result<Vec<Vec<PathBuf>>> {
        info!(
            "[{}] Distributing {} polar objects among {} tiles",
            self.context,
            objects.len(),
            tiles.len()
        );

        let mut assignment = vec![Vec::new(); tiles.len()];
        for (files, tile) in assignment.iter_mut().zip(tiles) {
            let projection = tile.projection()?;
            for (path, object) in objects {
                let Some(scan) = object.max_distance_scan() else {
                    continue;
                };
                if !scan.has_parameter(self.quantity) {
                    info!(
                        "[{}] Quantity {} not in data from {}",
                        self.context,
                        self.quantity,
                        scan.source
                    );
                    continue;
                }
                let reaches = scan.outermost_ring().any(|(lon, lat)| {
                    let (x, y) = projection.forward(lon, lat);
                    tile.extent.contains(x, y)
                });
                if reaches && !files.contains(path) {
                    files.push(path.clone());
                }
            }
        }

        for (files, tile) in assignment.iter().zip(tiles) {
            info!(
                "[{}] Tile {} contains {} files and dimensions {} x {}",
                self.context,
                tile.id,
                files.len(),
                tile.xsize,
                tile.ysize
            );
        }
        Ok(assignment)
    }
}

/// Radar indices for every object, assigned once in object order on top of `base`
pub fn radar_index_mapping<'o>(
    objects: impl IntoIterator<Item = &'o PolarObject>,
    base: &RadarIndexMapping,
) -> RadarIndexMapping {
    let mut mapping = base.clone();
    for object in objects {
        let id = OdimSource::parse(object.source()).canonical_id();
        let idx = mapping.assign(&id);
        debug!("Radar index {} for {}", idx, id);
    }
    mapping
}

/// Date and time of the first object that has both
pub fn fallback_timestamp<'o>(
    objects: impl IntoIterator<Item = &'o PolarObject>,
) -> Option<(NaiveDate, NaiveTime)> {
    objects
        .into_iter()
        .find_map(|object| Some((object.date()?, object.time()?)))
}

/// Give tiles without inputs a nominal time so they still produce a result
pub fn ensure_date_time(
    tasks: &mut [TileTask],
    fallback: Option<(NaiveDate, NaiveTime)>,
) -> Result<()> {
    let needs_fallback = |task: &TileTask| {
        task.files.is_empty() && (task.date.is_none() || task.time.is_none())
    };
    if !tasks.iter().any(needs_fallback) {
        return Ok(());
    }

    let Some((date, time)) = fallback else {
        warn!("Could not determine any date and time for empty tiles");
        return Err(Error::indeterminate_timestamp(
            "could not ensure existing date and time for composite",
        ));
    };
    for task in tasks.iter_mut().filter(|t| needs_fallback(t)) {
        task.date.get_or_insert(date);
        task.time.get_or_insert(time);
    }
    Ok(())
}
