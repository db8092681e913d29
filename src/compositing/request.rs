//! Composite request: what to generate and how.

use crate::constants::{
    DEFAULT_CENTER_ID, DEFAULT_ELANGLE, DEFAULT_GAIN, DEFAULT_HEIGHT, DEFAULT_MINVALUE,
    DEFAULT_OFFSET, DEFAULT_PCSID, DEFAULT_QUANTITY, DEFAULT_RANGE, DEFAULT_SCALE, DEFAULT_ZR_A,
    DEFAULT_ZR_B,
};
use crate::io::ObjectStoreConfig;
use crate::models::{
    InterpolationMethod, ProductType, QualityControlMode, RadarIndexMapping, SelectionMethod,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Everything a single generation call needs besides its inputs and area.
///
/// Immutable once generation starts; the tiled coordinator hands each tile
/// its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeRequest {
    pub quantity: String,
    pub product: ProductType,
    /// Product parameter string overriding height, range or elevation
    pub prodpar: Option<String>,
    pub selection: SelectionMethod,
    pub interpolation: InterpolationMethod,

    /// Output encoding
    pub gain: f64,
    pub offset: f64,
    pub minvalue: f64,

    /// Height (m), elevation angle (radians) and PMAX range (m)
    pub height: f64,
    pub elangle: f64,
    pub range: f64,

    /// Quality-control detectors, in application order
    pub detectors: Vec<String>,
    pub qc_mode: QualityControlMode,
    pub reprocess_quality_fields: bool,
    /// Drop malfunctioning scans and volumes
    pub ignore_malfunc: bool,

    pub apply_gra: bool,
    pub zr_a: f64,
    pub zr_b: f64,
    pub apply_ctfilter: bool,
    pub apply_gap_filling: bool,
    /// Quality field deciding between overlapping radars
    pub qi_total_field: Option<String>,

    pub radar_index: RadarIndexMapping,

    /// Directory receiving a copy of every input after quality control
    pub dump_path: Option<PathBuf>,
    /// Use the site's source when exactly one radar contributes
    pub use_site_source: bool,

    /// Best-fit area projection and pixel size
    pub pcsid: String,
    pub xscale: f64,
    pub yscale: f64,

    pub center_id: String,
    pub store: ObjectStoreConfig,
}

impl Default for CompositeRequest {
    fn default() -> Self {
        Self {
            quantity: DEFAULT_QUANTITY.to_string(),
            product: ProductType::Pcappi,
            prodpar: None,
            selection: SelectionMethod::NearestRadar,
            interpolation: InterpolationMethod::NearestValue,
            gain: DEFAULT_GAIN,
            offset: DEFAULT_OFFSET,
            minvalue: DEFAULT_MINVALUE,
            height: DEFAULT_HEIGHT,
            elangle: DEFAULT_ELANGLE,
            range: DEFAULT_RANGE,
            detectors: Vec::new(),
            qc_mode: QualityControlMode::default(),
            reprocess_quality_fields: false,
            ignore_malfunc: false,
            apply_gra: false,
            zr_a: DEFAULT_ZR_A,
            zr_b: DEFAULT_ZR_B,
            apply_ctfilter: false,
            apply_gap_filling: false,
            qi_total_field: None,
            radar_index: RadarIndexMapping::new(),
            dump_path: None,
            use_site_source: false,
            pcsid: DEFAULT_PCSID.to_string(),
            xscale: DEFAULT_SCALE,
            yscale: DEFAULT_SCALE,
            center_id: DEFAULT_CENTER_ID.to_string(),
            store: ObjectStoreConfig::default(),
        }
    }
}

/// Height, elevation and range after applying `prodpar`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductParameters {
    pub height: f64,
    pub elangle: f64,
    pub range: f64,
}

impl CompositeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = quantity.into();
        self
    }

    pub fn with_product(mut self, product: ProductType) -> Self {
        self.product = product;
        self
    }

    pub fn with_prodpar(mut self, prodpar: impl Into<String>) -> Self {
        self.prodpar = Some(prodpar.into());
        self
    }

    pub fn with_selection(mut self, selection: SelectionMethod) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_interpolation(mut self, interpolation: InterpolationMethod) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_detectors<S: AsRef<str>>(mut self, detectors: &[S]) -> Self {
        self.detectors = detectors.iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn with_qc_mode(mut self, mode: QualityControlMode) -> Self {
        self.qc_mode = mode;
        self
    }

    pub fn with_ignore_malfunc(mut self, ignore: bool) -> Self {
        self.ignore_malfunc = ignore;
        self
    }

    pub fn with_gra(mut self, zr_a: f64, zr_b: f64) -> Self {
        self.apply_gra = true;
        self.zr_a = zr_a;
        self.zr_b = zr_b;
        self
    }

    pub fn with_gap_filling(mut self) -> Self {
        self.apply_gap_filling = true;
        self
    }

    pub fn with_ctfilter(mut self) -> Self {
        self.apply_ctfilter = true;
        self
    }

    pub fn with_radar_index(mut self, mapping: RadarIndexMapping) -> Self {
        self.radar_index = mapping;
        self
    }

    pub fn with_store(mut self, store: ObjectStoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    /// Reject option combinations the generator cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.quantity.trim().is_empty() {
            return Err(Error::configuration("quantity must not be empty"));
        }
        if self.gain == 0.0 {
            return Err(Error::configuration("gain must not be zero"));
        }
        if self.xscale <= 0.0 || self.yscale <= 0.0 {
            return Err(Error::configuration(format!(
                "scale must be positive, got {}x{}",
                self.xscale, self.yscale
            )));
        }
        self.interpolation.check_quantity(&self.quantity)
    }

    /// Height, elevation and range with `prodpar` applied.
    ///
    /// CAPPI and PCAPPI read a height, PMAX `height[,range]` and PPI an
    /// elevation in degrees. Values that do not parse leave the defaults.
    pub fn product_parameters(&self) -> ProductParameters {
        let mut params = ProductParameters {
            height: self.height,
            elangle: self.elangle,
            range: self.range,
        };
        let Some(prodpar) = self.prodpar.as_deref() else {
            return params;
        };

        match self.product {
            ProductType::Cappi | ProductType::Pcappi => {
                if let Some(height) = parse_number(prodpar) {
                    params.height = height;
                }
            }
            ProductType::Pmax => {
                let parts: Vec<&str> = prodpar.split(',').collect();
                match parts.as_slice() {
                    [height, range] => {
                        if let (Some(h), Some(r)) = (parse_number(height), parse_number(range)) {
                            params.height = h;
                            params.range = r;
                        }
                    }
                    [height] => {
                        if let Some(h) = parse_number(height) {
                            params.height = h;
                        }
                    }
                    _ => {}
                }
            }
            ProductType::Ppi => {
                if let Some(degrees) = parse_number(prodpar) {
                    params.elangle = degrees.to_radians();
                }
            }
            ProductType::Max => {}
        }

        if params.height != self.height || params.elangle != self.elangle {
            debug!("Product parameter '{}' applied: {:?}", prodpar, params);
        }
        params
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
