//! Registry of projections, named areas and tiled areas.
//!
//! Constructed once (usually from a YAML file) and handed to components by
//! reference; nothing in the crate keeps a process-wide registry.
//!
//! ```yaml
//! projections:
//!   gmaps: "+proj=merc +lat_ts=0 +lon_0=0 +k=1.0 +R=6378137.0 +nadgrids=@null +no_defs"
//! areas:
//!   swegmaps_2000:
//!     pcsid: gmaps
//!     xsize: 780
//!     ysize: 1200
//!     xscale: 2000.0
//!     yscale: 2000.0
//!     extent: [-243500.0, 7413500.0, 1316500.0, 9813500.0]
//! tiled_areas:
//!   swegmaps_2000:
//!     split: [2, 2]
//! ```

use crate::constants::{DEFAULT_PCSID, GMAPS_PROJECTION};
use crate::models::{AreaDefinition, Extent};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    projections: IndexMap<String, String>,
    #[serde(default)]
    areas: IndexMap<String, AreaEntry>,
    #[serde(default)]
    tiled_areas: IndexMap<String, TiledAreaEntry>,
}

#[derive(Debug, Deserialize)]
struct AreaEntry {
    #[serde(default)]
    pcsid: Option<String>,
    /// Inline proj-string, used when no pcsid is given
    #[serde(default)]
    projection: Option<String>,
    xsize: usize,
    ysize: usize,
    xscale: f64,
    yscale: f64,
    extent: [f64; 4],
}

#[derive(Debug, Deserialize)]
struct TiledAreaEntry {
    #[serde(default)]
    tiles: Vec<TileEntry>,
    /// Automatic split as [columns, rows]
    #[serde(default)]
    split: Option<[usize; 2]>,
}

#[derive(Debug, Deserialize)]
struct TileEntry {
    id: String,
    extent: [f64; 4],
}

fn extent_from(values: [f64; 4]) -> Extent {
    Extent {
        llx: values[0],
        lly: values[1],
        urx: values[2],
        ury: values[3],
    }
}

#[derive(Debug, Clone, Default)]
pub struct AreaRegistry {
    projections: IndexMap<String, String>,
    areas: IndexMap<String, AreaDefinition>,
    tiles: IndexMap<String, Vec<AreaDefinition>>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("Failed to read registry {}", path.display()), e))?;
        let registry = Self::from_yaml(&contents).map_err(|e| match e {
            Error::Yaml { source, .. } => Error::Yaml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            "Loaded area registry {} ({} areas, {} tiled)",
            path.display(),
            registry.areas.len(),
            registry.tiles.len()
        );
        Ok(registry)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(contents).map_err(|source| Error::Yaml {
            path: "<inline>".into(),
            source,
        })?;

        let mut registry = Self::new();
        for (id, definition) in file.projections {
            registry.add_projection(id, definition);
        }
        for (id, entry) in file.areas {
            let projection = match (&entry.projection, &entry.pcsid) {
                (Some(def), _) => def.clone(),
                (None, Some(pcsid)) => registry.projection(pcsid)?.to_string(),
                (None, None) => {
                    return Err(Error::configuration(format!(
                        "area '{}' names neither pcsid nor projection",
                        id
                    )));
                }
            };
            registry.add_area(AreaDefinition {
                id,
                pcsid: entry.pcsid,
                projection,
                xscale: entry.xscale,
                yscale: entry.yscale,
                xsize: entry.xsize,
                ysize: entry.ysize,
                extent: extent_from(entry.extent),
            })?;
        }
        for (id, entry) in file.tiled_areas {
            let area = registry.area(&id)?.clone();
            let tiles = match entry.split {
                Some([cols, rows]) => area.split(cols, rows)?,
                None => entry
                    .tiles
                    .into_iter()
                    .map(|t| area.subarea(t.id, extent_from(t.extent)))
                    .collect::<Result<Vec<_>>>()?,
            };
            registry.add_tiled_area(&id, tiles)?;
        }
        Ok(registry)
    }

    pub fn add_projection(&mut self, id: impl Into<String>, definition: impl Into<String>) {
        self.projections.insert(id.into(), definition.into());
    }

    /// Register an area after checking it is self-consistent
    pub fn add_area(&mut self, area: AreaDefinition) -> Result<()> {
        area.validate()?;
        debug!("Registered area {}", area.id);
        self.areas.insert(area.id.clone(), area);
        Ok(())
    }

    /// Register the tiles of an area; each must lie on the area's pixel grid
    pub fn add_tiled_area(&mut self, area_id: &str, tiles: Vec<AreaDefinition>) -> Result<()> {
        let area = self.area(area_id)?;
        if tiles.is_empty() {
            return Err(Error::configuration(format!(
                "tiled area '{}' has no tiles",
                area_id
            )));
        }
        for tile in &tiles {
            if tile.projection != area.projection {
                return Err(Error::configuration(format!(
                    "tile '{}' of '{}' uses projection '{}', expected '{}'",
                    tile.id, area_id, tile.projection, area.projection
                )));
            }
            area.pixel_offset(tile).map_err(|e| {
                Error::configuration(format!("invalid tile of '{}': {}", area_id, e))
            })?;
        }
        self.tiles.insert(area_id.to_string(), tiles);
        Ok(())
    }

    pub fn area(&self, id: &str) -> Result<&AreaDefinition> {
        self.areas.get(id).ok_or_else(|| Error::unknown_area(id))
    }

    /// Projection definition by id; `gmaps` is always known
    pub fn projection(&self, pcsid: &str) -> Result<&str> {
        self.projections
            .get(pcsid)
            .map(String::as_str)
            .or_else(|| (pcsid == DEFAULT_PCSID).then_some(GMAPS_PROJECTION))
            .ok_or_else(|| Error::configuration(format!("unknown projection id '{}'", pcsid)))
    }

    pub fn is_tiled(&self, id: &str) -> bool {
        self.tiles.contains_key(id)
    }

    /// Tile definitions of a tiled area
    pub fn tiles(&self, id: &str) -> Option<&[AreaDefinition]> {
        self.tiles.get(id).map(Vec::as_slice)
    }

    pub fn areas(&self) -> impl Iterator<Item = &AreaDefinition> {
        self.areas.values()
    }

    pub fn projections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.projections.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
