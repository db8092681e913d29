//! Composite generator contract and the reference nearest-radar generator.
//!
//! The generator turns a set of quality-controlled polar objects into one
//! Cartesian product over an area. Production kernels plug in through
//! [`GeneratorFactory`]; each tile worker asks the factory for its own
//! generator instance.

use super::request::{CompositeRequest, ProductParameters};
use crate::constants::{COMPOSITE_NODATA, COMPOSITE_UNDETECT, quality_fields};
use crate::models::{
    AreaDefinition, BinValue, CartesianParameter, CartesianProduct, InterpolationMethod,
    OdimSource, PolarObject, ProductType, QualityField, RadarIndexMapping, SelectionMethod,
    polar::{BinLocation, PolarScan},
};
use crate::quality::CompositeAlgorithm;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use ndarray::Array2;
use std::sync::Arc;
use tracing::debug;

/// Largest beam height deviation accepted by a CAPPI (m)
const CAPPI_HEIGHT_TOLERANCE: f64 = 500.0;

/// Everything one generation call reads
pub struct GenerationInput<'a> {
    pub area: &'a AreaDefinition,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub objects: &'a [PolarObject],
    pub request: &'a CompositeRequest,
    /// Quality fields to produce, by task name
    pub quality_fields: &'a [String],
    pub radar_index: &'a RadarIndexMapping,
    pub algorithm: Option<&'a Arc<dyn CompositeAlgorithm>>,
}

/// Builds a Cartesian product from polar objects
pub trait CompositeGenerator: Send {
    /// `Ok(None)` when nothing could be generated
    fn generate(&mut self, input: &GenerationInput<'_>) -> Result<Option<CartesianProduct>>;
}

/// Creates a generator per worker
pub trait GeneratorFactory: Send + Sync {
    fn create(&self) -> Box<dyn CompositeGenerator>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NearestRadarFactory;

impl GeneratorFactory for NearestRadarFactory {
    fn create(&self) -> Box<dyn CompositeGenerator> {
        Box::new(NearestRadarGenerator)
    }
}

/// Value found for one pixel in one object
#[derive(Debug, Clone, Copy)]
struct Sample {
    object: usize,
    scan: usize,
    location: BinLocation,
    value: BinValue,
    quality: Option<f64>,
}

/// Nearest-bin generator.
///
/// Every pixel takes the value of the bin it falls in, from the radar chosen
/// by the selection method: the closest one for `NEAREST_RADAR`, the one with
/// the lowest beam for `HEIGHT_ABOVE_SEALEVEL`. With a QI-total field the
/// highest quality wins first. Radars with data outrank radars without.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestRadarGenerator;

struct Pass<'a> {
    input: &'a GenerationInput<'a>,
    params: ProductParameters,
    /// Scan used by PPI products, per object
    ppi_scans: Vec<Option<usize>>,
}

impl Pass<'_> {
    fn quantity(&self) -> &str {
        &self.input.request.quantity
    }

    fn sample_scan(&self, object: usize, scan_idx: usize, lon: f64, lat: f64) -> Option<Sample> {
        let scan = &self.input.objects[object].scans()[scan_idx];
        let location = scan.locate(lon, lat)?;
        Some(Sample {
            object,
            scan: scan_idx,
            location,
            value: scan.value(self.quantity(), location.ray, location.bin),
            quality: self
                .input
                .request
                .qi_total_field
                .as_deref()
                .and_then(|name| scan.quality_field(name))
                .and_then(|field| field.value(location.ray, location.bin)),
        })
    }

    fn sample_object(&self, object: usize, lon: f64, lat: f64) -> Option<Sample> {
        let product = self.input.request.product;
        if product == ProductType::Ppi {
            return self.sample_scan(object, self.ppi_scans[object]?, lon, lat);
        }

        let samples: Vec<Sample> = self.input.objects[object]
            .scans()
            .iter()
            .enumerate()
            .filter(|(_, scan)| scan.has_parameter(self.quantity()))
            .filter_map(|(idx, _)| self.sample_scan(object, idx, lon, lat))
            .collect();

        match product {
            ProductType::Cappi => nearest_height(&samples, self.params.height)
                .filter(|s| (s.location.beam_height - self.params.height).abs() <= CAPPI_HEIGHT_TOLERANCE),
            ProductType::Pcappi => nearest_height(&samples, self.params.height),
            ProductType::Pmax => match nearest_height(&samples, self.params.height) {
                Some(s) if s.location.ground_distance <= self.params.range => Some(s),
                _ => maximum(&samples),
            },
            ProductType::Max => maximum(&samples),
            ProductType::Ppi => None,
        }
    }

    /// Whether `a` should replace the current choice `b`
    fn better(&self, a: &Sample, b: &Sample) -> bool {
        let (a_nodata, b_nodata) = (a.value == BinValue::Nodata, b.value == BinValue::Nodata);
        if a_nodata != b_nodata {
            return b_nodata;
        }
        if let (Some(qa), Some(qb)) = (a.quality, b.quality) {
            if qa != qb {
                return qa > qb;
            }
        }
        match self.input.request.selection {
            SelectionMethod::NearestRadar => {
                a.location.ground_distance < b.location.ground_distance
            }
            SelectionMethod::HeightAboveSealevel => {
                a.location.beam_height < b.location.beam_height
            }
        }
    }

    fn choose(&self, lon: f64, lat: f64) -> Option<Sample> {
        let mut chosen: Option<Sample> = None;
        for object in 0..self.input.objects.len() {
            if let Some(sample) = self.sample_object(object, lon, lat) {
                if chosen.as_ref().is_none_or(|current| self.better(&sample, current)) {
                    chosen = Some(sample);
                }
            }
        }
        chosen
    }

    fn scan(&self, sample: &Sample) -> &PolarScan {
        &self.input.objects[sample.object].scans()[sample.scan]
    }
}

fn nearest_height(samples: &[Sample], height: f64) -> Option<Sample> {
    samples.iter().copied().fold(None, |best: Option<Sample>, s| match best {
        Some(b)
            if (b.location.beam_height - height).abs() <= (s.location.beam_height - height).abs() =>
        {
            Some(b)
        }
        _ => Some(s),
    })
}

fn rank(value: BinValue) -> (u8, f64) {
    match value {
        BinValue::Data(v) => (2, v),
        BinValue::Undetect => (1, 0.0),
        BinValue::Nodata => (0, 0.0),
    }
}

fn maximum(samples: &[Sample]) -> Option<Sample> {
    samples.iter().copied().fold(None, |best: Option<Sample>, s| match best {
        Some(b) if rank(b.value) >= rank(s.value) => Some(b),
        _ => Some(s),
    })
}

/// Scan whose elevation is closest to the requested one
fn ppi_scan(object: &PolarObject, quantity: &str, elangle: f64) -> Option<usize> {
    object
        .scans()
        .iter()
        .enumerate()
        .filter(|(_, scan)| scan.has_parameter(quantity))
        .min_by(|(_, a), (_, b)| {
            (a.elangle - elangle)
                .abs()
                .total_cmp(&(b.elangle - elangle).abs())
        })
        .map(|(idx, _)| idx)
}

impl CompositeGenerator for NearestRadarGenerator {
    fn generate(&mut self, input: &GenerationInput<'_>) -> Result<Option<CartesianProduct>> {
        if input.objects.is_empty() {
            return Ok(None);
        }
        let request = input.request;
        if request.interpolation != InterpolationMethod::NearestValue {
            debug!(
                "Interpolation {} not available in the reference generator, using nearest value",
                request.interpolation
            );
        }

        let area = input.area;
        let projection = area.projection()?;
        let params = request.product_parameters();
        let pass = Pass {
            input,
            params,
            ppi_scans: input
                .objects
                .iter()
                .map(|o| ppi_scan(o, &request.quantity, params.elangle))
                .collect(),
        };
        let indices: Vec<f64> = input
            .objects
            .iter()
            .map(|o| {
                let id = OdimSource::parse(o.source()).canonical_id();
                input.radar_index.get(&id).unwrap_or(0) as f64
            })
            .collect();

        let mut parameter = CartesianParameter::empty(area.xsize, area.ysize, request.gain, request.offset);
        let mut fields: IndexMap<&str, Array2<f64>> = input
            .quality_fields
            .iter()
            .map(|name| (name.as_str(), Array2::zeros((area.ysize, area.xsize))))
            .collect();

        for row in 0..area.ysize {
            for col in 0..area.xsize {
                let (x, y) = area.pixel_center(col, row);
                let (lon, lat) = projection.inverse(x, y);
                let Some(sample) = pass.choose(lon, lat) else {
                    continue;
                };

                parameter.data[(row, col)] = match sample.value {
                    BinValue::Data(v) => parameter
                        .encode(v.max(request.minvalue))
                        .clamp(COMPOSITE_UNDETECT + 1.0, COMPOSITE_NODATA - 1.0),
                    BinValue::Undetect => parameter.undetect,
                    BinValue::Nodata => parameter.nodata,
                };

                for (name, data) in fields.iter_mut() {
                    data[(row, col)] = match *name {
                        quality_fields::DISTANCE => sample.location.ground_distance,
                        quality_fields::HEIGHT => sample.location.beam_height,
                        quality_fields::RADAR_INDEX => indices[sample.object],
                        other => pass
                            .scan(&sample)
                            .quality_field(other)
                            .and_then(|f| f.value(sample.location.ray, sample.location.bin))
                            .unwrap_or(0.0),
                    };
                }
            }
        }

        let mut parameters = IndexMap::new();
        parameters.insert(request.quantity.clone(), parameter);
        let mut product = CartesianProduct {
            area: area.clone(),
            date: input.date,
            time: input.time,
            product: request.product,
            source: area.id.clone(),
            attributes: Default::default(),
            parameters,
            quality_fields: fields
                .into_iter()
                .map(|(name, data)| QualityField::new(name, data))
                .collect(),
        };

        if let Some(algorithm) = input.algorithm {
            debug!("Applying composite algorithm {}", algorithm.name());
            algorithm
                .process(&mut product, &request.quantity)
                .map_err(|e| Error::generation(format!("algorithm {}: {}", algorithm.name(), e)))?;
        }
        Ok(Some(product))
    }
}
