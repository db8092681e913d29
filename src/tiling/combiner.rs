//! Merging partial tile composites into the full area.

use super::task::PartialTileResult;
use crate::io::read_object;
use crate::models::{AreaDefinition, CartesianProduct, ProvenanceMetadata, QualityField};
use crate::{Error, Result};
use indexmap::IndexMap;
use ndarray::{Array2, s};
use tracing::{debug, info};

/// Pastes tile composites onto the pixel grid of the full area
pub struct TileCombiner<'a> {
    area: &'a AreaDefinition,
    center_id: &'a str,
    provenance: ProvenanceMetadata,
    context: String,
}

impl<'a> TileCombiner<'a> {
    pub fn new(area: &'a AreaDefinition, center_id: &'a str) -> Self {
        Self {
            area,
            center_id,
            provenance: ProvenanceMetadata::new(),
            context: String::new(),
        }
    }

    /// Provenance recorded before tiling; tile provenance is merged after it
    pub fn with_provenance(mut self, provenance: ProvenanceMetadata) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Read every rendered tile and merge them, `None` when no tile rendered
    pub fn combine(&self, results: &[PartialTileResult]) -> Result<Option<CartesianProduct>> {
        let mut tiles = Vec::with_capacity(results.len());
        for result in results {
            match result {
                PartialTileResult::Rendered { tile_id, path } => {
                    debug!("[{}] Reading tile {} from {}", self.context, tile_id, path.display());
                    let object = read_object(path)?;
                    let kind = object.kind();
                    let product = object.into_cartesian().ok_or_else(|| {
                        Error::tile_combination(format!(
                            "tile '{}' holds a {}, not a Cartesian product",
                            tile_id, kind
                        ))
                    })?;
                    tiles.push(product);
                }
                PartialTileResult::Empty { tile_id } => {
                    debug!(
                        "[{}] No partial composite for tile {}, not included",
                        self.context, tile_id
                    );
                }
            }
        }
        info!(
            "[{}] Combining {} tiles into one composite",
            self.context,
            tiles.len()
        );
        self.merge(tiles)
    }

    /// Merge tile products in the given order
    pub fn merge(&self, tiles: Vec<CartesianProduct>) -> Result<Option<CartesianProduct>> {
        let Some(first) = tiles.first() else {
            return Ok(None);
        };
        let (xsize, ysize) = (self.area.xsize, self.area.ysize);
        let mut combined = CartesianProduct {
            area: self.area.clone(),
            date: first.date,
            time: first.time,
            product: first.product,
            source: format!("{},CMT:{}", self.center_id, self.area.id),
            attributes: first.attributes.clone(),
            parameters: IndexMap::new(),
            quality_fields: Vec::new(),
        };
        let mut provenance = self.provenance.clone();

        for tile in &tiles {
            let (col, row) = self.area.pixel_offset(&tile.area)?;
            for (quantity, parameter) in &tile.parameters {
                let target = combined
                    .parameters
                    .entry(quantity.clone())
                    .or_insert_with(|| parameter.blank_like(xsize, ysize));
                paste(&mut target.data, &parameter.data, col, row, &tile.area)?;
            }
            for field in &tile.quality_fields {
                let Some(task) = field.task() else {
                    continue;
                };
                let idx = match combined
                    .quality_fields
                    .iter()
                    .position(|f| f.task() == Some(task))
                {
                    Some(idx) => idx,
                    None => {
                        combined.quality_fields.push(QualityField {
                            attributes: field.attributes.clone(),
                            gain: field.gain,
                            offset: field.offset,
                            data: Array2::zeros((ysize, xsize)),
                        });
                        combined.quality_fields.len() - 1
                    }
                };
                paste(
                    &mut combined.quality_fields[idx].data,
                    &field.data,
                    col,
                    row,
                    &tile.area,
                )?;
            }
            provenance.merge(&ProvenanceMetadata::from_attributes(&tile.attributes));
        }

        provenance.write_attributes(&mut combined.attributes);
        Ok(Some(combined))
    }
}

fn paste(
    target: &mut Array2<f64>,
    tile: &Array2<f64>,
    col: usize,
    row: usize,
    area: &AreaDefinition,
) -> Result<()> {
    if tile.dim() != (area.ysize, area.xsize) {
        return Err(Error::tile_combination(format!(
            "raster of tile '{}' is {:?}, expected {}x{}",
            area.id,
            tile.dim(),
            area.ysize,
            area.xsize
        )));
    }
    target
        .slice_mut(s![row..row + area.ysize, col..col + area.xsize])
        .assign(tile);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COMPOSITE_NODATA, attributes, quality_fields};
    use crate::io::write_temporary;
    use crate::models::{CartesianParameter, CartesianVolume, ProductType, RadarObject, fixtures};
    use tempfile::TempDir;

    fn full_area() -> AreaDefinition {
        fixtures::area("full", 14.0, 56.0, 12_000.0, 4000.0)
    }

    fn tile_product(tile: &AreaDefinition, value: f64, nodes: &str, tasks: &str) -> CartesianProduct {
        let mut parameter = CartesianParameter::empty(tile.xsize, tile.ysize, 0.4, -30.0);
        parameter.data.fill(value);
        let mut parameters = IndexMap::new();
        parameters.insert("DBZH".to_string(), parameter);
        let mut product = CartesianProduct {
            area: tile.clone(),
            date: fixtures::date(),
            time: fixtures::time(),
            product: ProductType::Pcappi,
            source: format!("ORG:82,CMT:{}", tile.id),
            attributes: Default::default(),
            parameters,
            quality_fields: vec![QualityField::new(
                quality_fields::DISTANCE,
                Array2::from_elem((tile.ysize, tile.xsize), value * 10.0),
            )],
        };
        product
            .attributes
            .insert(attributes::HOW_NODES.into(), nodes.into());
        product
            .attributes
            .insert(attributes::HOW_TASK.into(), tasks.into());
        product
    }

    #[test]
    fn test_paste_by_extent_and_nodata_elsewhere() {
        let area = full_area();
        let tiles = area.split(2, 2).unwrap();
        // tile 1_1 (south east) produced nothing
        let products = vec![
            tile_product(&tiles[0], 10.0, "seang", "distance"),
            tile_product(&tiles[1], 11.0, "sekkr", "distance"),
            tile_product(&tiles[2], 12.0, "seang,sekkr", "distance,radar-index"),
        ];
        let combined = TileCombiner::new(&area, "ORG:82")
            .merge(products)
            .unwrap()
            .unwrap();

        let data = &combined.parameter("DBZH").unwrap().data;
        assert_eq!(data.dim(), (6, 6));
        assert_eq!(data[[0, 0]], 10.0);
        assert_eq!(data[[0, 5]], 11.0);
        assert_eq!(data[[5, 0]], 12.0);
        assert_eq!(data[[5, 5]], COMPOSITE_NODATA);

        let distance = combined.quality_field(quality_fields::DISTANCE).unwrap();
        assert_eq!(distance.data[[0, 5]], 110.0);
        assert_eq!(distance.data[[5, 5]], 0.0);

        assert_eq!(combined.source, "ORG:82,CMT:full");
        assert_eq!(combined.attribute(attributes::HOW_NODES), Some("seang,sekkr"));
        assert_eq!(
            combined.attribute(attributes::HOW_TASK),
            Some("distance,radar-index")
        );
    }

    #[test]
    fn test_merge_is_independent_of_completion_order() {
        let area = full_area();
        let tiles = area.split(2, 1).unwrap();
        let combiner = TileCombiner::new(&area, "ORG:82");
        let a = combiner
            .merge(vec![
                tile_product(&tiles[0], 10.0, "a", "x"),
                tile_product(&tiles[1], 20.0, "b", "y"),
            ])
            .unwrap()
            .unwrap();
        let b = combiner
            .merge(vec![
                tile_product(&tiles[1], 20.0, "b", "y"),
                tile_product(&tiles[0], 10.0, "a", "x"),
            ])
            .unwrap()
            .unwrap();
        assert_eq!(a.parameters, b.parameters);
    }

    #[test]
    fn test_no_rendered_tiles() {
        let area = full_area();
        let results = vec![PartialTileResult::Empty {
            tile_id: "0_0".into(),
        }];
        assert!(
            TileCombiner::new(&area, "ORG:82")
                .combine(&results)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_combine_reads_tile_files() {
        let temp_dir = TempDir::new().unwrap();
        let area = full_area();
        let tiles = area.split(2, 1).unwrap();
        let path = write_temporary(
            temp_dir.path(),
            "tile_",
            &RadarObject::from(tile_product(&tiles[1], 15.0, "sekkr", "distance")),
        )
        .unwrap();
        let results = vec![
            PartialTileResult::Empty {
                tile_id: tiles[0].id.clone(),
            },
            PartialTileResult::Rendered {
                tile_id: tiles[1].id.clone(),
                path,
            },
        ];

        let mut base = ProvenanceMetadata::new();
        base.add_node("seang");
        base.add_node("sekkr");
        let combined = TileCombiner::new(&area, "ORG:82")
            .with_provenance(base)
            .combine(&results)
            .unwrap()
            .unwrap();
        let data = &combined.parameter("DBZH").unwrap().data;
        assert_eq!(data[[0, 0]], COMPOSITE_NODATA);
        assert_eq!(data[[0, 3]], 15.0);
        assert_eq!(combined.attribute(attributes::HOW_NODES), Some("seang,sekkr"));
    }

    #[test]
    fn test_volume_tile_contributes_its_first_image() {
        let temp_dir = TempDir::new().unwrap();
        let area = full_area();
        let tiles = area.split(2, 1).unwrap();
        let volume = |images: Vec<CartesianProduct>| {
            RadarObject::CartesianVolume(CartesianVolume {
                source: "ORG:82".into(),
                date: fixtures::date(),
                time: fixtures::time(),
                attributes: Default::default(),
                images,
            })
        };
        let path = write_temporary(
            temp_dir.path(),
            "tile_",
            &volume(vec![
                tile_product(&tiles[0], 15.0, "seang", "distance"),
                tile_product(&tiles[0], 99.0, "seang", "distance"),
            ]),
        )
        .unwrap();
        let results = vec![PartialTileResult::Rendered {
            tile_id: tiles[0].id.clone(),
            path,
        }];

        let combined = TileCombiner::new(&area, "ORG:82")
            .combine(&results)
            .unwrap()
            .unwrap();
        let data = &combined.parameter("DBZH").unwrap().data;
        assert_eq!(data[[0, 0]], 15.0);
        assert_eq!(data[[5, 2]], 15.0);
        assert_eq!(data[[0, 3]], COMPOSITE_NODATA);

        let empty = write_temporary(temp_dir.path(), "tile_", &volume(Vec::new())).unwrap();
        let results = vec![PartialTileResult::Rendered {
            tile_id: tiles[1].id.clone(),
            path: empty,
        }];
        match TileCombiner::new(&area, "ORG:82").combine(&results).unwrap_err() {
            Error::TileCombination { .. } => {}
            other => panic!("Expected TileCombination error, got {:?}", other),
        }
    }

    #[test]
    fn test_misaligned_tile_is_rejected() {
        let area = full_area();
        let mut tile = area.split(2, 1).unwrap().remove(0);
        tile.extent.llx += 1000.0;
        tile.extent.urx += 1000.0;
        match TileCombiner::new(&area, "ORG:82")
            .merge(vec![tile_product(&tile, 1.0, "a", "x")])
            .unwrap_err()
        {
            Error::TileCombination { .. } => {}
            other => panic!("Expected TileCombination error, got {:?}", other),
        }
    }
}
