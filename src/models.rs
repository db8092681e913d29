//! Radar object model shared by every stage of the compositor.
//!
//! Polar observations (scans and volumes) come in, Cartesian products
//! (images and image volumes) go out. Both carry ODIM-style named attributes
//! and quality fields identified by their `how/task` attribute.

use crate::constants::attributes;
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub mod area;
pub mod cartesian;
pub mod options;
pub mod polar;
pub mod provenance;
pub mod radar_index;
pub mod source;

#[cfg(test)]
pub(crate) mod fixtures;

pub use area::{AreaDefinition, Extent};
pub use cartesian::{CartesianParameter, CartesianProduct, CartesianVolume};
pub use options::{InterpolationMethod, ProductType, QualityControlMode, SelectionMethod};
pub use polar::{BinValue, Parameter, PolarObject, PolarScan, PolarVolume};
pub use provenance::ProvenanceMetadata;
pub use radar_index::RadarIndexMapping;
pub use source::OdimSource;

/// ODIM attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Long(i64),
    Double(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

/// Insertion-ordered attribute table, keyed by `group/name`
pub type Attributes = IndexMap<String, AttributeValue>;

/// Look up a string attribute
pub fn attribute_str<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a str> {
    attrs.get(name).and_then(AttributeValue::as_str)
}

/// Secondary raster describing the quality of the primary quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityField {
    #[serde(default)]
    pub attributes: Attributes,
    pub gain: f64,
    pub offset: f64,
    pub data: Array2<f64>,
}

impl QualityField {
    /// Create a quality field tagged with a task name, stored unscaled
    pub fn new(task: &str, data: Array2<f64>) -> Self {
        let mut attrs = Attributes::new();
        attrs.insert(attributes::HOW_TASK.to_string(), task.into());
        Self {
            attributes: attrs,
            gain: 1.0,
            offset: 0.0,
            data,
        }
    }

    /// Task name identifying the field
    pub fn task(&self) -> Option<&str> {
        attribute_str(&self.attributes, attributes::HOW_TASK)
    }

    /// Task arguments recorded by the detector that produced the field
    pub fn task_args(&self) -> Option<&str> {
        attribute_str(&self.attributes, attributes::HOW_TASK_ARGS)
    }

    pub fn with_task_args(mut self, args: impl Into<String>) -> Self {
        self.attributes
            .insert(attributes::HOW_TASK_ARGS.to_string(), args.into().into());
        self
    }

    /// Physical value at a raster position
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.data
            .get((row, col))
            .map(|raw| raw * self.gain + self.offset)
    }
}

/// Find a quality field by task name
pub fn find_quality_field<'a>(fields: &'a [QualityField], task: &str) -> Option<&'a QualityField> {
    fields.iter().find(|f| f.task() == Some(task))
}

/// Add a quality field, replacing any field with the same task name
pub fn put_quality_field(fields: &mut Vec<QualityField>, field: QualityField) {
    match fields.iter().position(|f| f.task().is_some() && f.task() == field.task()) {
        Some(idx) => fields[idx] = field,
        None => fields.push(field),
    }
}

/// Any object a radar object file can hold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RadarObject {
    Scan(PolarScan),
    Volume(PolarVolume),
    Image(CartesianProduct),
    CartesianVolume(CartesianVolume),
}

impl RadarObject {
    /// Object kind name used in log messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scan(_) => "scan",
            Self::Volume(_) => "volume",
            Self::Image(_) => "image",
            Self::CartesianVolume(_) => "cartesian volume",
        }
    }

    /// Polar view of the object, `None` for Cartesian objects
    pub fn into_polar(self) -> Option<PolarObject> {
        match self {
            Self::Scan(scan) => Some(PolarObject::Scan(scan)),
            Self::Volume(volume) => Some(PolarObject::Volume(volume)),
            _ => None,
        }
    }

    /// Cartesian view of the object; a volume yields its first image
    pub fn into_cartesian(self) -> Option<CartesianProduct> {
        match self {
            Self::Image(image) => Some(image),
            Self::CartesianVolume(volume) => volume.images.into_iter().next(),
            _ => None,
        }
    }
}

impl From<PolarObject> for RadarObject {
    fn from(object: PolarObject) -> Self {
        match object {
            PolarObject::Scan(scan) => Self::Scan(scan),
            PolarObject::Volume(volume) => Self::Volume(volume),
        }
    }
}

impl From<CartesianProduct> for RadarObject {
    fn from(product: CartesianProduct) -> Self {
        Self::Image(product)
    }
}
