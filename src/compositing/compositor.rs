//! Single-area compositing workflow.
//!
//! Fetch, quality control, area resolution, radar indexing, generation,
//! post-processing and provenance. Tile workers run exactly this for their
//! tile; untiled areas run it directly.

use super::fetch::ObjectSource;
use super::generator::{GenerationInput, GeneratorFactory, NearestRadarFactory};
use super::postprocess::{
    CloudTypeSource, GraCoefficientSource, add_border_parameter, apply_ctfilter, apply_gra,
    fill_gaps, gra_coefficients,
};
use super::request::CompositeRequest;
use crate::constants::{DATE_FORMAT, TIME_FORMAT, quality_fields};
use crate::io::{ObjectStore, write_temporary};
use crate::models::{
    AreaDefinition, CartesianProduct, Extent, OdimSource, PolarObject, RadarIndexMapping,
    RadarObject, source::remove_cmt,
};
use crate::projection::Projection;
use crate::quality::{QualityControlRunner, QualityRegistry};
use crate::registry::AreaRegistry;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id given to areas fitted around the input objects
pub const BEST_FIT_AREA_ID: &str = "auto-generated best-fit";

/// Target area of a generation call
#[derive(Debug, Clone, PartialEq)]
pub enum AreaTarget {
    /// Area id looked up in the registry
    Registered(String),
    Definition(AreaDefinition),
    /// Area covering every input object
    BestFit,
}

impl AreaTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Registered(id) => id,
            Self::Definition(area) => &area.id,
            Self::BestFit => BEST_FIT_AREA_ID,
        }
    }
}

impl From<Option<&str>> for AreaTarget {
    fn from(id: Option<&str>) -> Self {
        match id {
            Some(id) => Self::Registered(id.to_string()),
            None => Self::BestFit,
        }
    }
}

/// Read-only collaborators shared by every compositor and tile worker
#[derive(Clone)]
pub struct Toolbox {
    pub areas: Arc<AreaRegistry>,
    pub quality: Arc<QualityRegistry>,
    pub generators: Arc<dyn GeneratorFactory>,
    pub gra: Option<Arc<dyn GraCoefficientSource>>,
    pub cloud_types: Option<Arc<dyn CloudTypeSource>>,
}

impl Toolbox {
    pub fn new(areas: Arc<AreaRegistry>, quality: Arc<QualityRegistry>) -> Self {
        Self {
            areas,
            quality,
            generators: Arc::new(NearestRadarFactory),
            gra: None,
            cloud_types: None,
        }
    }

    pub fn with_generators(mut self, generators: Arc<dyn GeneratorFactory>) -> Self {
        self.generators = generators;
        self
    }

    pub fn with_gra_source(mut self, source: Arc<dyn GraCoefficientSource>) -> Self {
        self.gra = Some(source);
        self
    }

    pub fn with_cloud_types(mut self, source: Arc<dyn CloudTypeSource>) -> Self {
        self.cloud_types = Some(source);
        self
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("areas", &self.areas)
            .field("quality", &self.quality)
            .field("gra", &self.gra.is_some())
            .field("cloud_types", &self.cloud_types.is_some())
            .finish()
    }
}

/// `dt=<date>T<time>,area=<id>` prefix of log lines
pub fn log_context(date: Option<NaiveDate>, time: Option<NaiveTime>, area: &str) -> String {
    format!(
        "dt={}T{},area={}",
        date.map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".into()),
        time.map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".into()),
        area
    )
}

/// Runs one generation call over one area
pub struct Compositor<'a> {
    toolbox: &'a Toolbox,
    request: &'a CompositeRequest,
    store: Box<dyn ObjectStore>,
    radar_index: RadarIndexMapping,
}

impl<'a> Compositor<'a> {
    pub fn new(toolbox: &'a Toolbox, request: &'a CompositeRequest) -> Self {
        Self {
            toolbox,
            request,
            store: request.store.open(),
            radar_index: request.radar_index.clone(),
        }
    }

    /// Radar index mapping including sources first seen by this compositor
    pub fn radar_index(&self) -> &RadarIndexMapping {
        &self.radar_index
    }

    /// Generate a composite, `None` when no usable input remains
    pub fn generate(
        &mut self,
        files: &[PathBuf],
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        area: &AreaTarget,
    ) -> Result<Option<CartesianProduct>> {
        let request = self.request;
        request.validate()?;
        let context = log_context(date, time, area.id());
        debug!(
            "[{}] Generating {} {} from {} files (selection {}, detectors [{}])",
            context,
            request.product,
            request.quantity,
            files.len(),
            request.selection,
            request.detectors.join(",")
        );

        let mut fetched = ObjectSource::new(self.store.as_ref(), request.ignore_malfunc)
            .with_context(context.clone())
            .fetch(files);
        if fetched.objects.is_empty() {
            debug!("[{}] No objects provided, no composite generated", context);
            return Ok(None);
        }
        if fetched.all_malfunctioning {
            debug!(
                "[{}] All provided files are malfunctioning, no composite generated",
                context
            );
            return Ok(None);
        }

        info!(
            "[{}] Processing quality controls for {} objects",
            context,
            fetched.objects.len()
        );
        let qc = QualityControlRunner::new(&self.toolbox.quality)
            .with_context(context.clone())
            .apply(
                std::mem::take(&mut fetched.objects),
                &request.detectors,
                request.qc_mode,
                request.reprocess_quality_fields,
            )?;
        if qc.objects.is_empty() {
            debug!("[{}] No objects left after quality control", context);
            return Ok(None);
        }
        info!(
            "[{}] Finished quality controls: [{}]",
            context,
            qc.quality_fields.join(",")
        );

        let objects: Vec<PolarObject> = qc.objects.into_values().collect();
        if let Some(dir) = &request.dump_path {
            dump_objects(dir, &objects)?;
        }

        let area = match area {
            AreaTarget::Registered(id) => self.toolbox.areas.area(id)?.clone(),
            AreaTarget::Definition(definition) => definition.clone(),
            AreaTarget::BestFit => {
                debug!("[{}] Determining best fit for area", context);
                best_fit_area(
                    &objects,
                    &self.toolbox.areas,
                    &request.pcsid,
                    request.xscale,
                    request.yscale,
                )?
            }
        };

        for object in &objects {
            let id = OdimSource::parse(object.source()).canonical_id();
            self.radar_index.assign(&id);
        }

        let last = objects.last();
        let (Some(date), Some(time)) = (
            date.or_else(|| last.and_then(PolarObject::date)),
            time.or_else(|| last.and_then(PolarObject::time)),
        ) else {
            return Err(Error::indeterminate_timestamp(format!(
                "no nominal time given and none in the objects of {}",
                area.id
            )));
        };

        let input = GenerationInput {
            area: &area,
            date,
            time,
            objects: &objects,
            request,
            quality_fields: &qc.quality_fields,
            radar_index: &self.radar_index,
            algorithm: qc.algorithm.as_ref(),
        };
        let mut generator = self.toolbox.generators.create();
        let Some(mut product) = generator.generate(&input)? else {
            debug!("[{}] Generator produced nothing", context);
            return Ok(None);
        };

        self.post_process(&mut product, &qc.quality_fields, &context)?;

        let plc = std::mem::take(&mut product.source);
        product.source = format!("{},CMT:{}", request.center_id, plc);
        if request.use_site_source && objects.len() == 1 {
            product.source = site_source(&objects[0], &plc);
        }

        let mut provenance = qc.provenance;
        for node in &fetched.nodes {
            provenance.add_node(node.clone());
        }
        provenance.add_task_list(&fetched.qc_task_list());
        provenance.write_attributes(&mut product.attributes);

        debug!("[{}] Returning composite {}", context, product.source);
        Ok(Some(product))
    }

    fn post_process(
        &self,
        product: &mut CartesianProduct,
        qfields: &[String],
        context: &str,
    ) -> Result<()> {
        let request = self.request;
        let quantity = request.quantity.as_str();

        if request.apply_ctfilter {
            match &self.toolbox.cloud_types {
                Some(source) => {
                    apply_ctfilter(product, quantity, source.as_ref())?;
                }
                None => info!("[{}] No cloud-type product available, skipping ct filter", context),
            }
        }

        if request.apply_gra {
            if !qfields.iter().any(|f| f == quality_fields::DISTANCE) {
                info!(
                    "[{}] GRA needs the {} quality field, disabling",
                    context,
                    quality_fields::DISTANCE
                );
            } else {
                info!(
                    "[{}] Applying GRA analysis (ZR A = {}, ZR b = {})",
                    context, request.zr_a, request.zr_b
                );
                let coefficient =
                    gra_coefficients(self.toolbox.gra.as_deref(), product.date, product.time);
                if !apply_gra(product, quantity, request.zr_b, &coefficient) {
                    warn!("[{}] Failed to generate GRA field", context);
                }
            }
        }

        if qfields.iter().any(|f| f == quality_fields::RADAR_INDEX) {
            add_border_parameter(product, quantity);
        }

        if request.apply_gap_filling {
            debug!("[{}] Applying gap filling", context);
            fill_gaps(product, quantity);
        }
        Ok(())
    }
}

/// Source of a single-site composite: the site's own, with `NOD` and `CMT`
fn site_source(object: &PolarObject, plc: &str) -> String {
    let source = remove_cmt(object.source());
    if source.contains("NOD:") {
        format!("{},CMT:{}", source, plc)
    } else {
        format!("{},NOD:{},CMT:{}", source, object.node(), plc)
    }
}

/// Smallest area in `pcsid` covering the farthest-reaching ring of every object
pub fn best_fit_area(
    objects: &[PolarObject],
    registry: &AreaRegistry,
    pcsid: &str,
    xscale: f64,
    yscale: f64,
) -> Result<AreaDefinition> {
    let definition = registry.projection(pcsid)?.to_string();
    let projection = Projection::parse(&definition)?;

    let mut bounds: Option<Extent> = None;
    for scan in objects.iter().filter_map(PolarObject::max_distance_scan) {
        for (lon, lat) in scan.outermost_ring() {
            let (x, y) = projection.forward(lon, lat);
            bounds = Some(match bounds {
                None => Extent {
                    llx: x,
                    lly: y,
                    urx: x,
                    ury: y,
                },
                Some(b) => Extent {
                    llx: b.llx.min(x),
                    lly: b.lly.min(y),
                    urx: b.urx.max(x),
                    ury: b.ury.max(y),
                },
            });
        }
    }
    let bounds = bounds
        .ok_or_else(|| Error::configuration("cannot fit an area around objects without scans"))?;

    let xsize = (bounds.width() / xscale).ceil().max(1.0) as usize;
    let ysize = (bounds.height() / yscale).ceil().max(1.0) as usize;
    let id = match objects {
        [single] => format!("auto_{}_{}", pcsid, single.node()),
        _ => BEST_FIT_AREA_ID.to_string(),
    };

    Ok(AreaDefinition {
        id,
        pcsid: Some(pcsid.to_string()),
        projection: definition,
        xscale,
        yscale,
        xsize,
        ysize,
        extent: Extent {
            llx: bounds.llx,
            lly: bounds.lly,
            urx: bounds.llx + xsize as f64 * xscale,
            ury: bounds.lly + ysize as f64 * yscale,
        },
    })
}

/// Write each object to `dir` under a unique `<kind>_<node>_<date>_<time>_` name
pub fn dump_objects(dir: &Path, objects: &[PolarObject]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::io(format!("Failed to create dump directory {}", dir.display()), e))?;
    objects
        .iter()
        .map(|object| {
            let kind = match object {
                PolarObject::Scan(_) => "scan",
                PolarObject::Volume(_) => "pvol",
            };
            let prefix = format!(
                "{}_{}_{}_{}_",
                kind,
                object.node(),
                object
                    .date()
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| "19700101".into()),
                object
                    .time()
                    .map(|t| t.format(TIME_FORMAT).to_string())
                    .unwrap_or_else(|| "000000".into()),
            );
            write_temporary(dir, &prefix, &RadarObject::from(object.clone()))
        })
        .collect()
}
