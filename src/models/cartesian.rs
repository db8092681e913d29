//! Cartesian composite products.

use super::{
    AreaDefinition, Attributes, ProductType, QualityField, attribute_str, find_quality_field,
};
use crate::constants::{COMPOSITE_NODATA, COMPOSITE_UNDETECT};
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One quantity of a Cartesian product, raw values stored as rows × columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianParameter {
    pub gain: f64,
    pub offset: f64,
    pub nodata: f64,
    pub undetect: f64,
    pub data: Array2<f64>,
}

impl CartesianParameter {
    /// Raster filled with nodata
    pub fn empty(xsize: usize, ysize: usize, gain: f64, offset: f64) -> Self {
        Self {
            gain,
            offset,
            nodata: COMPOSITE_NODATA,
            undetect: COMPOSITE_UNDETECT,
            data: Array2::from_elem((ysize, xsize), COMPOSITE_NODATA),
        }
    }

    /// Physical value of a pixel; `None` for nodata and undetect
    pub fn physical(&self, row: usize, col: usize) -> Option<f64> {
        let raw = *self.data.get((row, col))?;
        if raw == self.nodata || raw == self.undetect {
            None
        } else {
            Some(raw * self.gain + self.offset)
        }
    }

    /// Encode a physical value with this parameter's gain and offset
    pub fn encode(&self, value: f64) -> f64 {
        ((value - self.offset) / self.gain).round()
    }

    /// Same layout with every pixel set to nodata
    pub fn blank_like(&self, xsize: usize, ysize: usize) -> Self {
        Self {
            gain: self.gain,
            offset: self.offset,
            nodata: self.nodata,
            undetect: self.undetect,
            data: Array2::from_elem((ysize, xsize), self.nodata),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianProduct {
    pub area: AreaDefinition,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub product: ProductType,
    pub source: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub parameters: IndexMap<String, CartesianParameter>,
    #[serde(default)]
    pub quality_fields: Vec<QualityField>,
}

impl CartesianProduct {
    pub fn parameter(&self, quantity: &str) -> Option<&CartesianParameter> {
        self.parameters.get(quantity)
    }

    pub fn quality_field(&self, task: &str) -> Option<&QualityField> {
        find_quality_field(&self.quality_fields, task)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        attribute_str(&self.attributes, name)
    }
}

/// Ordered collection of Cartesian images sharing one nominal time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianVolume {
    pub source: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub attributes: Attributes,
    pub images: Vec<CartesianProduct>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_skips_markers() {
        let mut param = CartesianParameter::empty(2, 1, 0.4, -30.0);
        param.data[(0, 1)] = param.encode(10.0);
        assert_eq!(param.physical(0, 0), None);
        assert_eq!(param.data[(0, 1)], 100.0);
        assert!((param.physical(0, 1).unwrap() - 10.0).abs() < 1e-9);
    }
}
