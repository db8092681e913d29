//! Cartesian area definitions and tile geometry.

use crate::projection::Projection;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Relative tolerance when checking that tile edges fall on pixel boundaries
const ALIGNMENT_TOLERANCE: f64 = 1e-6;

/// Bounding box in projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl Extent {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.llx && x <= self.urx && y >= self.lly && y <= self.ury
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

/// Immutable description of a Cartesian grid. Also used for tiles.
///
/// The projection is kept as its definition string so the value can be
/// serialized into tile tasks; [`AreaDefinition::projection`] rehydrates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDefinition {
    pub id: String,
    /// Registry id of the projection, when known
    #[serde(default)]
    pub pcsid: Option<String>,
    /// proj-string of the projection
    pub projection: String,
    pub xscale: f64,
    pub yscale: f64,
    pub xsize: usize,
    pub ysize: usize,
    pub extent: Extent,
}

impl AreaDefinition {
    pub fn projection(&self) -> Result<Projection> {
        Projection::parse(&self.projection)
    }

    /// Projected coordinates of a pixel centre; row 0 is the northern edge
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.extent.llx + (col as f64 + 0.5) * self.xscale,
            self.extent.ury - (row as f64 + 0.5) * self.yscale,
        )
    }

    /// Check that size, scale and extent agree
    pub fn validate(&self) -> Result<()> {
        if self.xscale <= 0.0 || self.yscale <= 0.0 {
            return Err(Error::configuration(format!(
                "area '{}' has non-positive scale",
                self.id
            )));
        }
        if self.xsize == 0 || self.ysize == 0 {
            return Err(Error::configuration(format!("area '{}' is empty", self.id)));
        }
        let width = self.xsize as f64 * self.xscale;
        let height = self.ysize as f64 * self.yscale;
        if !close(width, self.extent.width()) || !close(height, self.extent.height()) {
            return Err(Error::configuration(format!(
                "area '{}' extent does not match {}x{} pixels at {}x{} m",
                self.id, self.xsize, self.ysize, self.xscale, self.yscale
            )));
        }
        self.projection()?;
        Ok(())
    }

    /// Sub-area sharing this area's projection and scale
    pub fn subarea(&self, id: impl Into<String>, extent: Extent) -> Result<AreaDefinition> {
        let id = id.into();
        let xsize = (extent.width() / self.xscale).round();
        let ysize = (extent.height() / self.yscale).round();
        if xsize < 1.0 || ysize < 1.0 {
            return Err(Error::configuration(format!(
                "tile '{}' of area '{}' is smaller than one pixel",
                id, self.id
            )));
        }
        let sub = AreaDefinition {
            id,
            pcsid: self.pcsid.clone(),
            projection: self.projection.clone(),
            xscale: self.xscale,
            yscale: self.yscale,
            xsize: xsize as usize,
            ysize: ysize as usize,
            extent,
        };
        self.pixel_offset(&sub)?;
        Ok(sub)
    }

    /// Split into `cols` × `rows` tiles along pixel boundaries, ids `<row>_<col>`
    pub fn split(&self, cols: usize, rows: usize) -> Result<Vec<AreaDefinition>> {
        if cols == 0 || rows == 0 || cols > self.xsize || rows > self.ysize {
            return Err(Error::configuration(format!(
                "cannot split {}x{} area '{}' into {}x{} tiles",
                self.xsize, self.ysize, self.id, cols, rows
            )));
        }
        let col_edges = edges(self.xsize, cols);
        let row_edges = edges(self.ysize, rows);

        let mut tiles = Vec::with_capacity(cols * rows);
        for r in 0..rows {
            for c in 0..cols {
                let extent = Extent {
                    llx: self.extent.llx + col_edges[c] as f64 * self.xscale,
                    urx: self.extent.llx + col_edges[c + 1] as f64 * self.xscale,
                    ury: self.extent.ury - row_edges[r] as f64 * self.yscale,
                    lly: self.extent.ury - row_edges[r + 1] as f64 * self.yscale,
                };
                tiles.push(AreaDefinition {
                    id: format!("{}_{}", r, c),
                    pcsid: self.pcsid.clone(),
                    projection: self.projection.clone(),
                    xscale: self.xscale,
                    yscale: self.yscale,
                    xsize: col_edges[c + 1] - col_edges[c],
                    ysize: row_edges[r + 1] - row_edges[r],
                    extent,
                });
            }
        }
        Ok(tiles)
    }

    /// Column and row of `other`'s upper-left pixel within this grid
    pub fn pixel_offset(&self, other: &AreaDefinition) -> Result<(usize, usize)> {
        if !close(self.xscale, other.xscale) || !close(self.yscale, other.yscale) {
            return Err(Error::tile_combination(format!(
                "scale of '{}' ({}x{}) differs from '{}' ({}x{})",
                other.id, other.xscale, other.yscale, self.id, self.xscale, self.yscale
            )));
        }
        let col = (other.extent.llx - self.extent.llx) / self.xscale;
        let row = (self.extent.ury - other.extent.ury) / self.yscale;
        if !aligned(col) || !aligned(row) {
            return Err(Error::tile_combination(format!(
                "'{}' is not aligned with the pixel grid of '{}'",
                other.id, self.id
            )));
        }
        let (col, row) = (col.round(), row.round());
        if col < 0.0
            || row < 0.0
            || col as usize + other.xsize > self.xsize
            || row as usize + other.ysize > self.ysize
        {
            return Err(Error::tile_combination(format!(
                "'{}' lies outside '{}'",
                other.id, self.id
            )));
        }
        Ok((col as usize, row as usize))
    }
}

fn edges(size: usize, parts: usize) -> Vec<usize> {
    (0..=parts).map(|i| i * size / parts).collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= ALIGNMENT_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn aligned(v: f64) -> bool {
    (v - v.round()).abs() <= 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn test_split_covers_area_exactly() {
        let area = fixtures::area("full", 14.0, 56.0, 100_000.0, 2000.0);
        let tiles = area.split(2, 1).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].id, "0_0");
        assert_eq!(tiles[0].xsize + tiles[1].xsize, area.xsize);
        assert_eq!(tiles[0].extent.urx, tiles[1].extent.llx);
        assert_eq!(area.pixel_offset(&tiles[1]).unwrap(), (50, 0));
        for tile in &tiles {
            tile.validate().unwrap();
        }
    }

    #[test]
    fn test_split_uneven_sizes() {
        let mut area = fixtures::area("full", 14.0, 56.0, 3000.0, 2000.0);
        area.xsize = 3;
        area.ysize = 3;
        let tiles = area.split(2, 2).unwrap();
        let widths: Vec<_> = tiles.iter().map(|t| t.xsize).collect();
        assert_eq!(widths, vec![1, 2, 1, 2]);
        assert!(area.split(4, 1).is_err());
    }

    #[test]
    fn test_subarea_must_align() {
        let area = fixtures::area("full", 14.0, 56.0, 100_000.0, 2000.0);
        let ok = area.subarea(
            "nw",
            Extent {
                llx: -100_000.0,
                lly: 0.0,
                urx: 0.0,
                ury: 100_000.0,
            },
        );
        assert_eq!(ok.unwrap().xsize, 50);

        let misaligned = area.subarea(
            "bad",
            Extent {
                llx: -99_000.0,
                lly: 0.0,
                urx: 0.0,
                ury: 100_000.0,
            },
        );
        assert!(misaligned.is_err());
    }

    #[test]
    fn test_validate_detects_inconsistent_extent() {
        let mut area = fixtures::area("full", 14.0, 56.0, 100_000.0, 2000.0);
        area.validate().unwrap();
        area.xsize += 1;
        assert!(area.validate().is_err());
    }

    #[test]
    fn test_pixel_center_orientation() {
        let area = fixtures::area("full", 14.0, 56.0, 10_000.0, 2000.0);
        assert_eq!(area.pixel_center(0, 0), (-9000.0, 9000.0));
        assert_eq!(area.pixel_center(9, 9), (9000.0, -9000.0));
    }
}
